// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-tile Name Service client stub
//! OWNERS: @runtime
//! STATUS: Functional
//!
//! PUBLIC API:
//!   - NameClient::setup()/cleanup(): open/close the registry channel and reply inbox
//!   - lookup()/resolve()/reverse_lookup(): QUERY by name or by tile
//!   - link()/link_channel()/link_raw()/unlink(): ADD and REMOVE
//!   - heartbeat()/shutdown(): ALIVE and EXIT, never answered
//!
//! ERROR CONDITIONS:
//!   - Arguments are validated before anything is sent: name, then tile, then
//!     NotInitialized when setup() was not called
//!   - Transport failures surface as Error::Io, protocol misses as NotFound/Conflict/Capacity
//!
//! The session lock is held for a whole request/reply exchange, so concurrent
//! callers sharing one client never steal each other's replies.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use noc_abi::name;
use noc_abi::namesvc::{FixedStr, NameMessage, Opcode, FRAME_LEN};
use noc_abi::topology::dma_slot;
use noc_abi::TileId;
use noc_ipc::{Inbox, MessageNetwork, Node, Outbox, Wait};

use crate::config::{AckMode, NameServiceConfig};
use crate::{Error, Result};

/// Answer to a `QUERY`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Tile hosting the endpoint.
    pub tile: TileId,
    /// DMA channel bound to the name.
    pub dma: Option<u16>,
    /// Symbolic name.
    pub name: String,
    /// Owning process.
    pub process_name: String,
}

impl Resolution {
    fn from_reply(reply: &NameMessage) -> Result<Self> {
        let tile = reply.id.ok_or(Error::Protocol)?;
        Ok(Self {
            tile,
            dma: reply.dma,
            name: reply.name.as_str().to_owned(),
            process_name: reply.process_name.as_str().to_owned(),
        })
    }
}

struct Session<N: MessageNetwork> {
    server: N::Outbox,
    replies: N::Inbox,
}

/// Name Service client bound to one tile.
pub struct NameClient<N: MessageNetwork> {
    node: N,
    config: NameServiceConfig,
    process_name: FixedStr,
    session: Mutex<Option<Session<N>>>,
}

impl<N: MessageNetwork> NameClient<N> {
    /// Creates an uninitialized client; call [`NameClient::setup`] before use.
    pub fn new(node: N, config: NameServiceConfig) -> Self {
        Self { node, config, process_name: FixedStr::EMPTY, session: Mutex::new(None) }
    }

    /// Sets the process name attached to registrations.
    pub fn with_process_name(mut self, process_name: &str) -> Result<Self> {
        self.process_name = FixedStr::new(process_name)?;
        Ok(self)
    }

    /// Local tile.
    pub fn tile(&self) -> TileId {
        self.node.tile()
    }

    /// Returns `true` between `setup()` and `cleanup()`.
    pub fn is_initialized(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Creates the reply inbox and opens the registry channel. A second call is a no-op.
    pub fn setup(&self) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Ok(());
        }
        let replies = self.node.create(self.config.client_port)?;
        let server = self.node.open(self.config.server_addr())?;
        *session = Some(Session { server, replies });
        log::debug!("names: client on tile {} ready", self.node.tile());
        Ok(())
    }

    /// Closes the registry channel and unlinks the reply inbox. Idempotent.
    pub fn cleanup(&self) -> Result<()> {
        let Some(session) = self.session.lock().take() else {
            return Ok(());
        };
        session.server.close()?;
        session.replies.unlink()?;
        log::debug!("names: client on tile {} released", self.node.tile());
        Ok(())
    }

    /// Resolves `name` to the tile it is registered on.
    pub fn lookup(&self, name: &str) -> Result<TileId> {
        self.resolve(name).map(|resolution| resolution.tile)
    }

    /// Resolves `name` to its full record.
    pub fn resolve(&self, name: &str) -> Result<Resolution> {
        name::validate(name)?;
        let mut request = self.message(Opcode::Query);
        request.name = FixedStr::new(name)?;
        self.query(request)
    }

    /// Resolves a tile to the first name registered on it.
    pub fn reverse_lookup(&self, tile: TileId) -> Result<Resolution> {
        let mut request = self.message(Opcode::Query);
        request.id = Some(tile);
        self.query(request)
    }

    /// Registers `name` on the default DMA channel of `tile`.
    pub fn link(&self, tile: TileId, name: &str) -> Result<()> {
        self.link_channel(tile, tile.channel(), name)
    }

    /// Registers `name` for a raw node number, validating it like a wire field.
    pub fn link_raw(&self, node: i32, name: &str) -> Result<()> {
        name::validate(name)?;
        let tile = TileId::from_wire(node).ok_or(Error::InvalidArgument)?;
        self.link(tile, name)
    }

    /// Registers `name` on `tile` using the table slot of DMA channel `dma`.
    pub fn link_channel(&self, tile: TileId, dma: u16, name: &str) -> Result<()> {
        name::validate(name)?;
        dma_slot(dma).ok_or(Error::InvalidArgument)?;
        let mut request = self.message(Opcode::Add);
        request.id = Some(tile);
        request.dma = Some(dma);
        request.name = FixedStr::new(name)?;
        request.process_name = self.process_name;
        self.acknowledged(request)
    }

    /// Removes `name`. Removing an unknown name succeeds without effect.
    pub fn unlink(&self, name: &str) -> Result<()> {
        name::validate(name)?;
        let mut request = self.message(Opcode::Remove);
        request.name = FixedStr::new(name)?;
        self.acknowledged(request)
    }

    /// Tells the registry this tile is alive.
    pub fn heartbeat(&self) -> Result<()> {
        let mut request = self.message(Opcode::Alive);
        request.timestamp = now_micros();
        request.process_name = self.process_name;
        self.exchange(request, false).map(|_| ())
    }

    /// Asks the registry to stop.
    pub fn shutdown(&self) -> Result<()> {
        self.exchange(self.message(Opcode::Exit), false).map(|_| ())
    }

    fn message(&self, op: Opcode) -> NameMessage {
        NameMessage::new(self.node.tile(), op)
    }

    fn query(&self, request: NameMessage) -> Result<Resolution> {
        let reply = self.exchange(request, true)?.ok_or(Error::Protocol)?;
        match reply.op {
            Opcode::Success => Resolution::from_reply(&reply),
            _ => Err(Error::from_errno(reply.errcode)),
        }
    }

    fn acknowledged(&self, request: NameMessage) -> Result<()> {
        let expect_reply = self.config.ack == AckMode::Reply;
        match self.exchange(request, expect_reply)? {
            Some(reply) if reply.op == Opcode::Fail => Err(Error::from_errno(reply.errcode)),
            _ => Ok(()),
        }
    }

    fn exchange(&self, request: NameMessage, expect_reply: bool) -> Result<Option<NameMessage>> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(Error::NotInitialized)?;
        session.server.write(&request.encode(), Wait::Blocking)?;
        if !expect_reply {
            return Ok(None);
        }
        let mut frame = [0u8; FRAME_LEN];
        session.replies.read(&mut frame, Wait::Blocking)?;
        let reply = NameMessage::decode(&frame).map_err(|_| Error::Protocol)?;
        match reply.op {
            Opcode::Success | Opcode::Fail => Ok(Some(reply)),
            other => {
                log::warn!("names: unexpected {other:?} reply on tile {}", self.node.tile());
                Err(Error::Protocol)
            }
        }
    }
}

impl<N: MessageNetwork> Drop for NameClient<N> {
    fn drop(&mut self) {
        if let Err(err) = self.cleanup() {
            log::warn!("names: cleanup on drop failed: {err}");
        }
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
