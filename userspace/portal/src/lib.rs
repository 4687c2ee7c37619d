// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Point-to-point asynchronous bulk channel with admission control
//! OWNERS: @runtime
//! STATUS: Functional
//! TEST_COVERAGE: Unit tests (host fabric)
//!
//! PUBLIC API:
//!   - Portal::create_for_read(): receive-only, primes the first read immediately
//!   - Portal::create_for_write(): send-only, blocks on resources, picks an engine on I/O tiles
//!   - allow(): one transfer credit for a sender
//!   - write()/write_async()/poll_write()/wait_write(): sender side
//!   - wait_read()/read(): receiver side, rearming after each completion
//!   - close(): terminal; a second close fails
//!
//! STATES: Created -> Armed -> Completed -> Armed ... -> Closed
//!
//! ERROR CONDITIONS:
//!   - PortalError::ShortTransfer and PortalError::Transport are fatal (see `is_fatal`)
//!   - PortalError::Busy: another asynchronous write is still pending
//!   - PortalError::Closed / WrongMode / Idle: misuse, recoverable

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

use noc_abi::topology::NR_IOCLUSTER_DMA;
use noc_abi::TileId;
use noc_ipc::{AioStatus, AsyncOp, BulkNetwork, BulkRx, BulkTx, IpcError, Node, Wait};

pub use noc_ipc::ReadCompletion;

/// Errors produced by portal operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// The portal was already closed.
    #[error("portal closed")]
    Closed,
    /// The operation belongs to the other direction.
    #[error("operation not valid for this portal direction")]
    WrongMode,
    /// An asynchronous write is already in flight.
    #[error("asynchronous write already pending")]
    Busy,
    /// No asynchronous write to observe.
    #[error("no asynchronous write pending")]
    Idle,
    /// Fewer bytes moved than requested.
    #[error("short transfer: expected {expected} bytes, moved {actual}")]
    ShortTransfer {
        /// Bytes requested.
        expected: usize,
        /// Bytes moved.
        actual: usize,
    },
    /// The bulk transport failed.
    #[error("portal transport failure: {0}")]
    Transport(#[from] IpcError),
}

impl PortalError {
    /// Fatal errors leave the channel in an unknown state; the tile must stop using it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ShortTransfer { .. } | Self::Transport(_))
    }
}

/// Result alias for portal operations.
pub type Result<T> = core::result::Result<T, PortalError>;

/// Direction of a portal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Receive-only.
    Read,
    /// Send-only.
    Write,
}

/// Lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Opened, nothing submitted.
    Created,
    /// An asynchronous operation is submitted.
    Armed,
    /// The last operation completed.
    Completed,
    /// Terminal.
    Closed,
}

enum Channel<N: BulkNetwork> {
    Read { rx: N::Rx },
    Write { tx: N::Tx, pending: Option<Pending<N>> },
}

struct Pending<N: BulkNetwork> {
    op: <N::Tx as BulkTx>::Pending,
    len: usize,
}

/// One end of a bulk channel.
pub struct Portal<N: BulkNetwork> {
    path: String,
    mode: Mode,
    state: State,
    channel: Option<Channel<N>>,
}

impl<N: BulkNetwork> Portal<N> {
    /// Opens `path` for reading `size` bytes; completion needs `trigger` transfers (default 1).
    pub fn create_for_read(node: &N, path: &str, size: usize, trigger: Option<u32>) -> Result<Self> {
        let rx = node.portal_create(path)?;
        rx.arm(size, trigger.unwrap_or(1))?;
        log::debug!("portal: {path} armed for {size} bytes on tile {}", node.tile());
        Ok(Self {
            path: path.to_owned(),
            mode: Mode::Read,
            state: State::Armed,
            channel: Some(Channel::Read { rx }),
        })
    }

    /// Opens `path` for writing to `receiver`.
    pub fn create_for_write(node: &N, path: &str, receiver: TileId) -> Result<Self> {
        let mut tx = node.portal_open(path)?;
        tx.set_wait_resource(true);
        if node.tile().is_io() {
            let engine = usize::from(receiver.raw()) % NR_IOCLUSTER_DMA;
            tx.set_engine(engine as u8)?;
        }
        Ok(Self {
            path: path.to_owned(),
            mode: Mode::Write,
            state: State::Created,
            channel: Some(Channel::Write { tx, pending: None }),
        })
    }

    /// Channel path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Direction.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// DMA engine selected for writing, if any.
    pub fn engine(&self) -> Option<u8> {
        match &self.channel {
            Some(Channel::Write { tx, .. }) => tx.engine(),
            _ => None,
        }
    }

    /// Admits one transfer from `sender`.
    pub fn allow(&self, sender: TileId) -> Result<()> {
        self.rx()?.allow(sender)?;
        Ok(())
    }

    /// Writes `data` at `offset` and blocks until it has moved completely.
    pub fn write(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let (tx, pending) = self.tx()?;
        if pending.is_some() {
            return Err(PortalError::Busy);
        }
        let moved = tx.write(data, offset)?;
        if moved != data.len() {
            return Err(PortalError::ShortTransfer { expected: data.len(), actual: moved });
        }
        self.state = State::Completed;
        Ok(())
    }

    /// Submits a write without blocking; observe it with `poll_write` or `wait_write`.
    pub fn write_async(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let (tx, pending) = self.tx()?;
        if pending.is_some() {
            return Err(PortalError::Busy);
        }
        let op = tx.write_async(data.to_vec(), offset)?;
        *pending = Some(Pending { op, len: data.len() });
        self.state = State::Armed;
        Ok(())
    }

    /// Returns `true` once the pending write is no longer in progress.
    pub fn poll_write(&mut self) -> Result<bool> {
        let (_, pending) = self.tx()?;
        let pending = pending.as_ref().ok_or(PortalError::Idle)?;
        match pending.op.poll() {
            AioStatus::Idle | AioStatus::InProgress => Ok(false),
            AioStatus::Done(_) => Ok(true),
            AioStatus::Failed(err) => Err(err.into()),
        }
    }

    /// Waits for the pending write and finalizes it.
    pub fn wait_write(&mut self) -> Result<()> {
        let (_, pending) = self.tx()?;
        let Pending { op, len } = pending.take().ok_or(PortalError::Idle)?;
        let moved = op.wait(Wait::Blocking)?;
        if moved != len {
            return Err(PortalError::ShortTransfer { expected: len, actual: moved });
        }
        self.state = State::Completed;
        Ok(())
    }

    /// Returns `true` when the armed read has completed.
    pub fn poll_read(&self) -> Result<bool> {
        Ok(matches!(self.rx()?.poll(), AioStatus::Done(_)))
    }

    /// Waits for the armed read, returns what arrived and rearms.
    pub fn wait_read(&mut self) -> Result<ReadCompletion> {
        let completion = self.rx()?.rearm(Wait::Blocking)?;
        self.state = State::Armed;
        Ok(completion)
    }

    /// Waits for the armed read and copies it into `out`, which must match the
    /// number of bytes that arrived. Fewer is a short transfer; more would drop
    /// data and is reported as a size mismatch. Both are fatal.
    pub fn read(&mut self, out: &mut [u8]) -> Result<()> {
        let completion = self.wait_read()?;
        if completion.bytes < out.len() || completion.data.len() < out.len() {
            return Err(PortalError::ShortTransfer { expected: out.len(), actual: completion.bytes });
        }
        if completion.bytes > out.len() {
            return Err(IpcError::SizeMismatch { expected: out.len(), actual: completion.bytes }.into());
        }
        out.copy_from_slice(&completion.data[..out.len()]);
        Ok(())
    }

    /// Releases the channel. A second close fails with [`PortalError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        let channel = self.channel.take().ok_or(PortalError::Closed)?;
        if let Channel::Write { pending: Some(_), .. } = &channel {
            log::warn!("portal: {} closed with a write in flight", self.path);
        }
        drop(channel);
        self.state = State::Closed;
        Ok(())
    }

    fn rx(&self) -> Result<&N::Rx> {
        match &self.channel {
            None => Err(PortalError::Closed),
            Some(Channel::Read { rx }) => Ok(rx),
            Some(Channel::Write { .. }) => Err(PortalError::WrongMode),
        }
    }

    fn tx(&mut self) -> Result<(&N::Tx, &mut Option<Pending<N>>)> {
        match &mut self.channel {
            None => Err(PortalError::Closed),
            Some(Channel::Write { tx, pending }) => Ok((&*tx, pending)),
            Some(Channel::Read { .. }) => Err(PortalError::WrongMode),
        }
    }
}
