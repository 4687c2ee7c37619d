// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! OR-accumulating rendezvous connectors.
//!
//! A slot is keyed by `(path, tile)`. Writers may reach a slot before its receiver
//! arms it; their bits are kept and merged with the match word on arming.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use noc_abi::TileId;

use super::{deadline, park, Fabric, HostNode};
use crate::{IpcError, Node, Result, SyncNetwork, SyncRx, SyncTx, Wait};

const ALL_ONES: u64 = u64::MAX;

#[derive(Default)]
struct SyncState {
    armed: bool,
    match_word: u64,
    acc: u64,
}

#[derive(Default)]
pub(super) struct SyncSlot {
    state: Mutex<SyncState>,
    cond: Condvar,
}

impl SyncSlot {
    fn deliver(&self, word: u64) {
        let mut state = self.state.lock();
        state.acc |= word;
        if state.acc == ALL_ONES {
            self.cond.notify_all();
        }
    }
}

/// Armed receiving end of a rendezvous connector.
pub struct HostSyncRx {
    key: (String, TileId),
    slot: Arc<SyncSlot>,
    fabric: Arc<Fabric>,
}

/// Sending end of a rendezvous connector.
pub struct HostSyncTx {
    path: String,
    targets: Vec<TileId>,
    fabric: Arc<Fabric>,
}

impl SyncNetwork for HostNode {
    type Rx = HostSyncRx;
    type Tx = HostSyncTx;

    fn sync_create(&self, path: &str, match_word: u64) -> Result<HostSyncRx> {
        let key = (path.to_owned(), self.tile());
        let slot = Arc::clone(self.fabric.sync.lock().entry(key.clone()).or_default());
        {
            let mut state = slot.state.lock();
            if state.armed {
                return Err(IpcError::AddressInUse);
            }
            state.armed = true;
            state.match_word = match_word;
            state.acc |= match_word;
        }
        log::trace!("sync: armed {path} on tile {} match={match_word:#x}", self.tile());
        Ok(HostSyncRx { key, slot, fabric: Arc::clone(&self.fabric) })
    }

    fn sync_open(&self, path: &str) -> Result<HostSyncTx> {
        Ok(HostSyncTx {
            path: path.to_owned(),
            targets: Vec::new(),
            fabric: Arc::clone(&self.fabric),
        })
    }
}

impl SyncRx for HostSyncRx {
    fn read(&self, wait: Wait) -> Result<u64> {
        let deadline = deadline(wait);
        let mut state = self.slot.state.lock();
        while state.acc != ALL_ONES {
            park(&self.slot.cond, &mut state, wait, deadline)?;
        }
        let word = state.acc;
        state.acc = state.match_word;
        Ok(word)
    }
}

impl Drop for HostSyncRx {
    fn drop(&mut self) {
        let mut slots = self.fabric.sync.lock();
        if slots.get(&self.key).is_some_and(|slot| Arc::ptr_eq(slot, &self.slot)) {
            slots.remove(&self.key);
        }
    }
}

impl SyncTx for HostSyncTx {
    fn set_targets(&mut self, targets: &[TileId]) -> Result<()> {
        if targets.is_empty() {
            return Err(IpcError::InvalidArgument);
        }
        self.targets = targets.to_vec();
        Ok(())
    }

    fn write(&self, word: u64) -> Result<()> {
        if self.targets.is_empty() {
            return Err(IpcError::NoSuchEndpoint);
        }
        for target in &self.targets {
            let slot = {
                let mut slots = self.fabric.sync.lock();
                Arc::clone(slots.entry((self.path.clone(), *target)).or_default())
            };
            slot.deliver(word);
        }
        Ok(())
    }
}
