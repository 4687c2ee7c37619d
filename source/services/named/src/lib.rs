// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Name Service daemon: single dispatch loop over the registry inbox
//! OWNERS: @runtime
//! STATUS: Functional
//! TEST_COVERAGE: Unit tests (scripted transport) + tests/dispatch.rs
//!
//! PUBLIC API:
//!   - Transport: frame source/sink the dispatch loop runs on
//!   - MailboxTransport: Transport over a NoC inbox
//!   - Server: per-request state machine (registry + liveness map)
//!   - serve()/serve_with_registry()/run_with_transport(): the dispatch loop
//!   - Daemon: bootstrap handoff, global barrier, join
//!   - cli: help/execute entry points of the `named` binary
//!
//! INVARIANTS:
//!   - Requests are handled strictly in receipt order by one thread
//!   - Protocol errors go back in replies; only receive failures stop the loop
//!   - EXIT stops the loop and returns the final table and liveness map to the caller

#![forbid(unsafe_code)]
#![deny(clippy::all)]

use std::collections::HashMap;

use names::{AckMode, Registry};
use noc_abi::namesvc::{NameMessage, Opcode};
use noc_abi::TileId;
use noc_barrier::BarrierError;
use noc_ipc::IpcError;

#[cfg(feature = "backend-host")]
pub mod cli;
mod daemon;
mod transport;

pub use daemon::Daemon;
pub use transport::MailboxTransport;

/// Trait implemented by transports capable of delivering request frames to the daemon.
pub trait Transport {
    /// Error type returned by the transport.
    type Error: Into<TransportError>;

    /// Receives the next request frame; `None` once the transport is closed.
    fn recv(&mut self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Sends a reply frame to the client inbox of `to`.
    fn send(&mut self, to: TileId, frame: &[u8]) -> Result<(), Self::Error>;
}

/// Errors originating from the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// NoC transport failure.
    #[error("transport ipc error: {0}")]
    Ipc(#[from] IpcError),
    /// Any other transport issue described via string message.
    #[error("transport error: {0}")]
    Other(String),
}

impl From<String> for TransportError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for TransportError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}

/// Errors returned by the name server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Bootstrap barrier failure.
    #[error("barrier error: {0}")]
    Barrier(#[from] BarrierError),
    /// The dispatch thread could not be spawned.
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The dispatch thread panicked.
    #[error("dispatch thread panicked")]
    Panicked,
}

impl From<IpcError> for ServerError {
    fn from(err: IpcError) -> Self {
        Self::Transport(err.into())
    }
}

/// Last heartbeat seen from a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Liveness {
    /// Sender clock carried by the last `ALIVE`.
    pub timestamp: u64,
    /// Number of heartbeats received.
    pub beats: u64,
}

/// What the dispatch loop does after one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Send `message` to the client inbox of `to`.
    Reply {
        /// Requesting tile.
        to: TileId,
        /// Reply frame.
        message: NameMessage,
    },
    /// Nothing to send.
    Silent,
    /// Stop serving.
    Exit,
}

/// Request handler owning the name table.
pub struct Server {
    registry: Registry,
    ack: AckMode,
    liveness: HashMap<TileId, Liveness>,
}

impl Server {
    /// Creates a server around `registry`.
    pub fn new(registry: Registry, ack: AckMode) -> Self {
        Self { registry, ack, liveness: HashMap::new() }
    }

    /// The name table.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Last heartbeat received from `tile`.
    pub fn liveness(&self, tile: TileId) -> Option<Liveness> {
        self.liveness.get(&tile).copied()
    }

    /// Hands the table back.
    pub fn into_registry(self) -> Registry {
        self.registry
    }

    /// Decodes and handles one frame. Malformed frames are dropped.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Outcome {
        match NameMessage::decode(frame) {
            Ok(request) => self.handle(request),
            Err(err) => {
                log::warn!("named: dropping frame ({} bytes): {err}", frame.len());
                Outcome::Silent
            }
        }
    }

    /// Handles one decoded request.
    pub fn handle(&mut self, request: NameMessage) -> Outcome {
        match request.op {
            Opcode::Query => {
                let message = self.registry.query(&request);
                log::trace!(
                    "named: query {:?}/{:?} from {} -> {:?}",
                    request.name,
                    request.id,
                    request.source,
                    message.op
                );
                Outcome::Reply { to: request.source, message }
            }
            Opcode::Add => {
                let result = self.registry.add(&request).map(|slot| {
                    log::debug!(
                        "named: linked {:?} -> tile {:?} (slot {slot})",
                        request.name,
                        request.id
                    );
                });
                self.acknowledge(request, result)
            }
            Opcode::Remove => {
                if self.registry.remove(&request) {
                    log::debug!("named: unlinked {:?}", request.name);
                }
                self.acknowledge(request, Ok(()))
            }
            Opcode::Alive => {
                let entry = self
                    .liveness
                    .entry(request.source)
                    .or_insert(Liveness { timestamp: 0, beats: 0 });
                entry.timestamp = request.timestamp;
                entry.beats += 1;
                Outcome::Silent
            }
            Opcode::Exit => {
                log::info!("named: exit requested by tile {}", request.source);
                Outcome::Exit
            }
            Opcode::Success | Opcode::Fail => {
                log::warn!("named: ignoring {:?} from tile {}", request.op, request.source);
                Outcome::Silent
            }
        }
    }

    fn acknowledge(&self, request: NameMessage, result: names::Result<()>) -> Outcome {
        if let Err(err) = &result {
            log::warn!("named: {:?} {:?} from {} failed: {err}", request.op, request.name, request.source);
        }
        if self.ack == AckMode::FireAndForget {
            return Outcome::Silent;
        }
        let mut message = request;
        match result {
            Ok(()) => {
                message.op = Opcode::Success;
                message.errcode = 0;
            }
            Err(err) => {
                message.op = Opcode::Fail;
                message.errcode = err.errno();
            }
        }
        Outcome::Reply { to: request.source, message }
    }
}

/// Runs the server using the provided transport and a fresh registry.
pub fn run_with_transport<T: Transport>(transport: &mut T, ack: AckMode) -> Result<Registry, ServerError> {
    serve_with_registry(transport, Registry::new(), ack)
}

/// Serves requests until EXIT or transport close; returns the final table.
pub fn serve_with_registry<T: Transport>(
    transport: &mut T,
    registry: Registry,
    ack: AckMode,
) -> Result<Registry, ServerError> {
    serve(transport, Server::new(registry, ack)).map(Server::into_registry)
}

/// Drives `server` until EXIT or transport close and hands it back with its
/// table and liveness map.
pub fn serve<T: Transport>(transport: &mut T, mut server: Server) -> Result<Server, ServerError> {
    loop {
        let frame = match transport.recv().map_err(|err| ServerError::Transport(err.into()))? {
            Some(frame) => frame,
            None => break,
        };
        match server.handle_frame(&frame) {
            Outcome::Reply { to, message } => {
                if let Err(err) = transport.send(to, &message.encode()) {
                    // The client may have released its inbox already.
                    let err: TransportError = err.into();
                    log::warn!("named: reply to tile {to} failed: {err}");
                }
            }
            Outcome::Silent => {}
            Outcome::Exit => break,
        }
    }
    Ok(server)
}
