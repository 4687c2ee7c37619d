// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-process NoC emulation for host-based testing
//!
//! OWNERS: @runtime
//!
//! PUBLIC API:
//!   - Noc: shared fabric holding every mailbox, rendezvous slot and bulk channel
//!   - Noc::node(): tile-bound handle implementing all transport traits
//!   - NocConfig: message size and mailbox depth
//!
//! INVARIANTS:
//!   - Mailbox frames are exactly `msg_size` bytes
//!   - At most one receiver per mailbox address, rendezvous (path, tile) and bulk path
//!   - Bulk transfers are all-or-nothing under the channel lock
//!
//! DEPENDENCIES:
//!   - crossbeam-channel: bounded mailbox queues
//!   - parking_lot: Mutex/Condvar for rendezvous and bulk slots

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex, MutexGuard};

use noc_abi::TileId;

use crate::{IpcError, MailboxAddr, Node, Result, Wait};

mod aio;
mod bulk;
mod mailbox;
mod rendezvous;

pub use aio::HostAio;
pub use bulk::{HostBulkRx, HostBulkTx};
pub use mailbox::{HostInbox, HostOutbox};
pub use rendezvous::{HostSyncRx, HostSyncTx};

/// Fabric parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NocConfig {
    /// Size of every mailbox message.
    pub msg_size: usize,
    /// Messages a mailbox buffers before writers block.
    pub mailbox_depth: usize,
}

impl Default for NocConfig {
    fn default() -> Self {
        Self { msg_size: noc_abi::namesvc::FRAME_LEN, mailbox_depth: 16 }
    }
}

/// The emulated interconnect.
#[derive(Clone, Default)]
pub struct Noc {
    fabric: Arc<Fabric>,
}

impl Noc {
    /// Creates a fabric with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fabric with `config`.
    pub fn with_config(config: NocConfig) -> Self {
        Self { fabric: Arc::new(Fabric::new(config)) }
    }

    /// Returns a handle bound to `tile`.
    pub fn node(&self, tile: TileId) -> HostNode {
        HostNode { tile, fabric: Arc::clone(&self.fabric) }
    }

    /// Fabric configuration.
    pub fn config(&self) -> NocConfig {
        self.fabric.config
    }
}

/// Tile-bound handle on the emulated fabric.
#[derive(Clone)]
pub struct HostNode {
    tile: TileId,
    fabric: Arc<Fabric>,
}

impl Node for HostNode {
    fn tile(&self) -> TileId {
        self.tile
    }
}

type SyncKey = (String, TileId);

struct Fabric {
    config: NocConfig,
    mailboxes: Mutex<HashMap<MailboxAddr, Sender<Vec<u8>>>>,
    sync: Mutex<HashMap<SyncKey, Arc<rendezvous::SyncSlot>>>,
    portals: Mutex<HashMap<String, Arc<bulk::PortalSlot>>>,
}

impl Default for Fabric {
    fn default() -> Self {
        Self::new(NocConfig::default())
    }
}

impl Fabric {
    fn new(config: NocConfig) -> Self {
        Self {
            config,
            mailboxes: Mutex::new(HashMap::new()),
            sync: Mutex::new(HashMap::new()),
            portals: Mutex::new(HashMap::new()),
        }
    }
}

/// Absolute deadline for `wait`, if it carries a timeout.
fn deadline(wait: Wait) -> Option<Instant> {
    wait.timeout().map(|timeout| Instant::now() + timeout)
}

/// Parks once on `cond` according to `wait`; callers loop on their own predicate.
fn park<T>(
    cond: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    wait: Wait,
    deadline: Option<Instant>,
) -> Result<()> {
    match (wait, deadline) {
        (Wait::NonBlocking, _) => Err(IpcError::WouldBlock),
        (Wait::Timeout(_), Some(deadline)) => {
            if Instant::now() >= deadline {
                return Err(IpcError::Timeout);
            }
            let _ = cond.wait_until(guard, deadline);
            Ok(())
        }
        _ => {
            cond.wait(guard);
            Ok(())
        }
    }
}
