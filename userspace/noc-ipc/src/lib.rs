// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Transport abstractions consumed by the naming and rendezvous layer
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests (host backend) + tests/host_fabric.rs
//!
//! PUBLIC API:
//!   - MessageNetwork / Inbox / Outbox: fixed-size, ordered, blocking mailboxes
//!   - SyncNetwork / SyncRx / SyncTx: OR-accumulating rendezvous connectors
//!   - BulkNetwork / BulkRx / BulkTx / AsyncOp: admission-controlled DMA channels
//!   - Wait enum, IpcError
//!   - host::Noc: in-process fabric (feature `backend-host`)
//!
//! DEPENDENCIES:
//!   - noc-abi: tile ids and topology
//!   - parking_lot + crossbeam-channel: host backend

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

use core::fmt;
use core::time::Duration;

use noc_abi::TileId;

#[cfg(feature = "backend-host")]
pub mod host;
#[cfg(feature = "backend-host")]
pub use host::{HostNode, Noc, NocConfig};

/// Result type returned by transport operations.
pub type Result<T> = core::result::Result<T, IpcError>;

/// Behaviour of a blocking call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Block until the operation completes.
    Blocking,
    /// Return immediately if no progress can be made.
    NonBlocking,
    /// Block until either the operation completes or the timeout expires.
    Timeout(Duration),
}

impl Wait {
    /// Returns `true` when the caller requested a non-blocking attempt.
    pub const fn is_non_blocking(self) -> bool {
        matches!(self, Self::NonBlocking)
    }

    /// Converts a [`Wait::Timeout`] variant into its [`Duration`].
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Timeout(duration) => Some(duration),
            Self::Blocking | Self::NonBlocking => None,
        }
    }
}

/// Errors produced by the transports.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IpcError {
    /// Operation could not progress without blocking.
    #[error("operation would block")]
    WouldBlock,
    /// The caller exceeded the requested timeout.
    #[error("operation timed out")]
    Timeout,
    /// The opposite endpoint was closed or unlinked.
    #[error("peer disconnected")]
    Disconnected,
    /// No endpoint is registered under the requested address.
    #[error("no such endpoint")]
    NoSuchEndpoint,
    /// An endpoint already exists at the requested address.
    #[error("address already in use")]
    AddressInUse,
    /// A whole-message transfer used the wrong size.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size the endpoint was created with.
        expected: usize,
        /// Size supplied by the caller.
        actual: usize,
    },
    /// An asynchronous operation is already in flight on this descriptor.
    #[error("operation already in flight")]
    Busy,
    /// The local tile may not perform this operation.
    #[error("operation not permitted on this tile")]
    PermissionDenied,
    /// Argument out of range.
    #[error("invalid argument")]
    InvalidArgument,
}

/// Mailbox address: a port on a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MailboxAddr {
    /// Tile owning the inbox.
    pub tile: TileId,
    /// Port number on that tile.
    pub port: u8,
}

impl MailboxAddr {
    /// Creates a mailbox address.
    pub const fn new(tile: TileId, port: u8) -> Self {
        Self { tile, port }
    }
}

impl fmt::Display for MailboxAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tile, self.port)
    }
}

/// A handle bound to one tile of the NoC.
pub trait Node {
    /// The local tile.
    fn tile(&self) -> TileId;
}

/// Receiving end of a mailbox.
pub trait Inbox {
    /// Address this inbox was created at.
    fn addr(&self) -> MailboxAddr;

    /// Receives exactly one whole message into `frame`.
    fn read(&self, frame: &mut [u8], wait: Wait) -> Result<()>;

    /// Destroys the inbox; pending and future writes fail.
    fn unlink(self) -> Result<()>
    where
        Self: Sized;
}

/// Sending end of a mailbox.
pub trait Outbox {
    /// Sends exactly one whole message.
    fn write(&self, frame: &[u8], wait: Wait) -> Result<()>;

    /// Releases the sending descriptor.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Fixed-size synchronous message transport.
pub trait MessageNetwork: Node {
    /// Inbox type.
    type Inbox: Inbox + Send + 'static;
    /// Outbox type.
    type Outbox: Outbox + Send + 'static;

    /// Creates an inbox on `port` of the local tile.
    fn create(&self, port: u8) -> Result<Self::Inbox>;

    /// Opens a remote inbox for writing.
    fn open(&self, addr: MailboxAddr) -> Result<Self::Outbox>;
}

/// Receiving side of a rendezvous connector.
///
/// Incoming words are ORed into an accumulator initialised with the match word; a read
/// returns once every bit is set and resets the accumulator to the match word.
pub trait SyncRx {
    /// Waits for the accumulator to reach all ones.
    fn read(&self, wait: Wait) -> Result<u64>;
}

/// Sending side of a rendezvous connector.
pub trait SyncTx {
    /// Sets the tiles that receive each write (one or many for a broadcast).
    fn set_targets(&mut self, targets: &[TileId]) -> Result<()>;

    /// Sends `word` to every target.
    fn write(&self, word: u64) -> Result<()>;
}

/// Rendezvous connectors addressed by path.
pub trait SyncNetwork: Node {
    /// Receiver type.
    type Rx: SyncRx + Send + 'static;
    /// Sender type.
    type Tx: SyncTx + Send + 'static;

    /// Creates the local receiver at `path` armed with `match_word`.
    fn sync_create(&self, path: &str, match_word: u64) -> Result<Self::Rx>;

    /// Opens a sender on `path`.
    fn sync_open(&self, path: &str) -> Result<Self::Tx>;
}

/// State of an asynchronous control block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AioStatus {
    /// Nothing submitted.
    Idle,
    /// Submitted and not yet finished.
    InProgress,
    /// Finished, moving this many bytes.
    Done(usize),
    /// Finished with an error.
    Failed(IpcError),
}

/// Handle on one submitted asynchronous operation.
pub trait AsyncOp {
    /// Non-blocking status check.
    fn poll(&self) -> AioStatus;

    /// Waits for completion and returns the number of bytes moved.
    fn wait(&self, wait: Wait) -> Result<usize>;
}

/// Data delivered by a completed read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadCompletion {
    /// Bytes written into the buffer by all contributing transfers.
    pub bytes: usize,
    /// Buffer contents at completion.
    pub data: Vec<u8>,
}

/// Receiving side of a bulk channel.
pub trait BulkRx {
    /// Grants `sender` one transfer into this channel.
    fn allow(&self, sender: TileId) -> Result<()>;

    /// Submits an asynchronous read of `size` bytes completing after `trigger` transfers.
    fn arm(&self, size: usize, trigger: u32) -> Result<()>;

    /// Status of the submitted read.
    fn poll(&self) -> AioStatus;

    /// Waits for the submitted read, snapshots its buffer and submits it again.
    fn rearm(&self, wait: Wait) -> Result<ReadCompletion>;
}

/// Sending side of a bulk channel.
pub trait BulkTx {
    /// Handle returned by [`BulkTx::write_async`].
    type Pending: AsyncOp + Send + 'static;

    /// Block (instead of failing) while the receiver has no credit or armed read.
    fn set_wait_resource(&mut self, on: bool);

    /// Selects the outbound DMA engine. Only I/O tiles have several.
    fn set_engine(&mut self, engine: u8) -> Result<()>;

    /// Currently selected engine, if any.
    fn engine(&self) -> Option<u8>;

    /// Transfers `data` at `offset` of the receiver buffer; returns the bytes moved.
    fn write(&self, data: &[u8], offset: usize) -> Result<usize>;

    /// Submits a transfer without blocking.
    fn write_async(&self, data: Vec<u8>, offset: usize) -> Result<Self::Pending>;
}

/// Asynchronous DMA channels addressed by path.
pub trait BulkNetwork: Node {
    /// Receiver type.
    type Rx: BulkRx + Send + 'static;
    /// Sender type.
    type Tx: BulkTx + Send + 'static;

    /// Creates the receive-only channel at `path`.
    fn portal_create(&self, path: &str) -> Result<Self::Rx>;

    /// Opens `path` for sending.
    fn portal_open(&self, path: &str) -> Result<Self::Tx>;
}
