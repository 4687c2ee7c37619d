// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Admission-controlled bulk channels.
//!
//! A transfer lands only while the receiver is open, holds a credit for the sender
//! and has an incomplete read armed. A transfer that does not fit the armed buffer
//! is refused before anything moves, and the copy happens under the channel lock,
//! so a reader never observes a partial transfer.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use noc_abi::topology::NR_IOCLUSTER_DMA;
use noc_abi::TileId;

use super::{deadline, park, Fabric, HostAio, HostNode};
use crate::{AioStatus, BulkNetwork, BulkRx, BulkTx, IpcError, Node, ReadCompletion, Result, Wait};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum RxState {
    #[default]
    Pending,
    Open,
    Closed,
}

struct ArmedRead {
    buf: Vec<u8>,
    trigger: u32,
    arrivals: u32,
    bytes: usize,
    complete: bool,
}

impl ArmedRead {
    fn new(size: usize, trigger: u32) -> Self {
        Self { buf: vec![0u8; size], trigger, arrivals: 0, bytes: 0, complete: false }
    }
}

#[derive(Default)]
struct PortalState {
    rx: RxState,
    receiver: Option<TileId>,
    credits: HashMap<TileId, u32>,
    read: Option<ArmedRead>,
}

impl PortalState {
    fn ready_for(&self, sender: TileId) -> bool {
        self.rx == RxState::Open
            && self.credits.get(&sender).copied().unwrap_or(0) > 0
            && self.read.as_ref().is_some_and(|read| !read.complete)
    }
}

#[derive(Default)]
pub(super) struct PortalSlot {
    state: Mutex<PortalState>,
    cond: Condvar,
}

impl PortalSlot {
    fn transfer(&self, sender: TileId, data: &[u8], offset: usize, block: bool) -> Result<usize> {
        let mut state = self.state.lock();
        loop {
            if state.rx == RxState::Closed {
                return Err(IpcError::Disconnected);
            }
            if state.ready_for(sender) {
                break;
            }
            if !block {
                return Err(IpcError::WouldBlock);
            }
            self.cond.wait(&mut state);
        }

        let Some(read) = state.read.as_mut() else {
            return Err(IpcError::Disconnected);
        };
        let end = match offset.checked_add(data.len()) {
            Some(end) if end <= read.buf.len() => end,
            _ => {
                return Err(IpcError::SizeMismatch {
                    expected: read.buf.len(),
                    actual: offset.saturating_add(data.len()),
                })
            }
        };
        let moved = data.len();
        read.buf[offset..end].copy_from_slice(data);
        read.arrivals += 1;
        read.bytes += moved;
        read.complete = read.arrivals >= read.trigger;

        if let Some(credit) = state.credits.get_mut(&sender) {
            *credit -= 1;
            if *credit == 0 {
                state.credits.remove(&sender);
            }
        }
        self.cond.notify_all();
        Ok(moved)
    }
}

/// Receiving end of a host bulk channel. Dropping it closes the channel.
pub struct HostBulkRx {
    path: String,
    slot: Arc<PortalSlot>,
    fabric: Arc<Fabric>,
}

/// Sending end of a host bulk channel.
pub struct HostBulkTx {
    tile: TileId,
    slot: Arc<PortalSlot>,
    wait_resource: bool,
    engine: Option<u8>,
}

impl BulkNetwork for HostNode {
    type Rx = HostBulkRx;
    type Tx = HostBulkTx;

    fn portal_create(&self, path: &str) -> Result<HostBulkRx> {
        let mut portals = self.fabric.portals.lock();
        let slot = Arc::clone(portals.entry(path.to_owned()).or_default());
        {
            let mut state = slot.state.lock();
            if state.rx != RxState::Pending {
                return Err(IpcError::AddressInUse);
            }
            state.rx = RxState::Open;
            state.receiver = Some(self.tile());
        }
        slot.cond.notify_all();
        log::trace!("portal: {path} opened for read on tile {}", self.tile());
        Ok(HostBulkRx { path: path.to_owned(), slot, fabric: Arc::clone(&self.fabric) })
    }

    fn portal_open(&self, path: &str) -> Result<HostBulkTx> {
        let slot = Arc::clone(self.fabric.portals.lock().entry(path.to_owned()).or_default());
        Ok(HostBulkTx { tile: self.tile(), slot, wait_resource: false, engine: None })
    }
}

impl BulkRx for HostBulkRx {
    fn allow(&self, sender: TileId) -> Result<()> {
        let mut state = self.slot.state.lock();
        *state.credits.entry(sender).or_insert(0) += 1;
        self.slot.cond.notify_all();
        Ok(())
    }

    fn arm(&self, size: usize, trigger: u32) -> Result<()> {
        if trigger == 0 {
            return Err(IpcError::InvalidArgument);
        }
        let mut state = self.slot.state.lock();
        if state.read.as_ref().is_some_and(|read| !read.complete) {
            return Err(IpcError::Busy);
        }
        state.read = Some(ArmedRead::new(size, trigger));
        self.slot.cond.notify_all();
        Ok(())
    }

    fn poll(&self) -> AioStatus {
        match self.slot.state.lock().read.as_ref() {
            None => AioStatus::Idle,
            Some(read) if read.complete => AioStatus::Done(read.bytes),
            Some(_) => AioStatus::InProgress,
        }
    }

    fn rearm(&self, wait: Wait) -> Result<ReadCompletion> {
        let deadline = deadline(wait);
        let mut state = self.slot.state.lock();
        loop {
            let complete = match state.read.as_ref() {
                None => return Err(IpcError::InvalidArgument),
                Some(read) => read.complete,
            };
            if complete {
                break;
            }
            park(&self.slot.cond, &mut state, wait, deadline)?;
        }
        let Some(read) = state.read.as_mut() else {
            return Err(IpcError::InvalidArgument);
        };
        let completion = ReadCompletion { bytes: read.bytes, data: read.buf.clone() };
        read.arrivals = 0;
        read.bytes = 0;
        read.complete = false;
        self.slot.cond.notify_all();
        Ok(completion)
    }
}

impl Drop for HostBulkRx {
    fn drop(&mut self) {
        self.slot.state.lock().rx = RxState::Closed;
        self.slot.cond.notify_all();
        let mut portals = self.fabric.portals.lock();
        if portals.get(&self.path).is_some_and(|slot| Arc::ptr_eq(slot, &self.slot)) {
            portals.remove(&self.path);
        }
    }
}

impl BulkTx for HostBulkTx {
    type Pending = HostAio;

    fn set_wait_resource(&mut self, on: bool) {
        self.wait_resource = on;
    }

    fn set_engine(&mut self, engine: u8) -> Result<()> {
        if self.tile.is_compute() {
            return Err(IpcError::PermissionDenied);
        }
        if usize::from(engine) >= NR_IOCLUSTER_DMA {
            return Err(IpcError::InvalidArgument);
        }
        self.engine = Some(engine);
        Ok(())
    }

    fn engine(&self) -> Option<u8> {
        self.engine
    }

    fn write(&self, data: &[u8], offset: usize) -> Result<usize> {
        self.slot.transfer(self.tile, data, offset, self.wait_resource)
    }

    fn write_async(&self, data: Vec<u8>, offset: usize) -> Result<HostAio> {
        let aio = HostAio::submitted();
        let completion = aio.clone();
        let slot = Arc::clone(&self.slot);
        let (tile, block) = (self.tile, self.wait_resource);
        thread::Builder::new()
            .name(format!("dma-{tile}"))
            .spawn(move || completion.complete(slot.transfer(tile, &data, offset, block)))
            .map_err(|_| IpcError::Busy)?;
        Ok(aio)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use crate::{AsyncOp, Noc};

    use super::*;

    fn tile(raw: u16) -> TileId {
        TileId::new(raw).unwrap()
    }

    #[test]
    fn transfer_needs_credit_and_armed_read() {
        let noc = Noc::new();
        let rx = noc.node(tile(1)).portal_create("/p/a").unwrap();
        let tx = noc.node(tile(2)).portal_open("/p/a").unwrap();

        assert_eq!(tx.write(b"data", 0), Err(IpcError::WouldBlock));
        rx.arm(4, 1).unwrap();
        assert_eq!(tx.write(b"data", 0), Err(IpcError::WouldBlock));
        rx.allow(tile(2)).unwrap();
        assert_eq!(tx.write(b"data", 0), Ok(4));

        let done = rx.rearm(Wait::NonBlocking).unwrap();
        assert_eq!(done, ReadCompletion { bytes: 4, data: b"data".to_vec() });
        // The credit was consumed by the first transfer.
        assert_eq!(tx.write(b"more", 0), Err(IpcError::WouldBlock));
    }

    #[test]
    fn trigger_aggregates_senders() {
        let noc = Noc::new();
        let rx = noc.node(tile(0)).portal_create("/p/b").unwrap();
        rx.arm(4, 2).unwrap();
        for sender in [3u16, 4] {
            rx.allow(tile(sender)).unwrap();
        }
        let left = noc.node(tile(3)).portal_open("/p/b").unwrap();
        let right = noc.node(tile(4)).portal_open("/p/b").unwrap();

        left.write(b"ab", 0).unwrap();
        assert_eq!(rx.poll(), AioStatus::InProgress);
        right.write(b"cd", 2).unwrap();
        assert_eq!(rx.poll(), AioStatus::Done(4));
        assert_eq!(rx.rearm(Wait::Blocking).unwrap().data, b"abcd".to_vec());
        assert_eq!(rx.poll(), AioStatus::InProgress);
    }

    #[test]
    fn blocking_sender_waits_for_admission() {
        let noc = Noc::new();
        let rx = noc.node(tile(1)).portal_create("/p/c").unwrap();
        let mut tx = noc.node(tile(2)).portal_open("/p/c").unwrap();
        tx.set_wait_resource(true);

        let sender = thread::spawn(move || tx.write(b"late", 0));
        thread::sleep(Duration::from_millis(10));
        rx.arm(4, 1).unwrap();
        rx.allow(tile(2)).unwrap();
        assert_eq!(sender.join().unwrap(), Ok(4));
        assert_eq!(rx.rearm(Wait::Blocking).unwrap().data, b"late".to_vec());
    }

    #[test]
    fn async_write_completes_through_control_block() {
        let noc = Noc::new();
        let rx = noc.node(tile(1)).portal_create("/p/d").unwrap();
        let mut tx = noc.node(tile(2)).portal_open("/p/d").unwrap();
        tx.set_wait_resource(true);
        let pending = tx.write_async(vec![7u8; 8], 0).unwrap();

        rx.arm(8, 1).unwrap();
        rx.allow(tile(2)).unwrap();
        assert_eq!(pending.wait(Wait::Blocking), Ok(8));
        assert_eq!(rx.rearm(Wait::Blocking).unwrap().bytes, 8);
    }

    #[test]
    fn arm_rules() {
        let noc = Noc::new();
        let rx = noc.node(tile(1)).portal_create("/p/e").unwrap();
        assert_eq!(rx.poll(), AioStatus::Idle);
        assert_eq!(rx.arm(4, 0), Err(IpcError::InvalidArgument));
        rx.arm(4, 1).unwrap();
        assert_eq!(rx.arm(4, 1), Err(IpcError::Busy));
        assert_eq!(rx.rearm(Wait::NonBlocking), Err(IpcError::WouldBlock));
        assert!(matches!(noc.node(tile(3)).portal_create("/p/e"), Err(IpcError::AddressInUse)));
    }

    #[test]
    fn engine_selection_is_io_only() {
        let noc = Noc::new();
        let mut compute = noc.node(tile(5)).portal_open("/p/f").unwrap();
        assert_eq!(compute.set_engine(1), Err(IpcError::PermissionDenied));

        let mut io = noc.node(TileId::IO1).portal_open("/p/f").unwrap();
        assert_eq!(io.set_engine(4), Err(IpcError::InvalidArgument));
        io.set_engine(3).unwrap();
        assert_eq!(io.engine(), Some(3));
    }

    #[test]
    fn oversized_transfer_leaves_read_untouched() {
        let noc = Noc::new();
        let rx = noc.node(tile(1)).portal_create("/p/h").unwrap();
        let tx = noc.node(tile(2)).portal_open("/p/h").unwrap();
        rx.arm(4, 1).unwrap();
        rx.allow(tile(2)).unwrap();

        assert_eq!(tx.write(b"too long", 0), Err(IpcError::SizeMismatch { expected: 4, actual: 8 }));
        assert_eq!(tx.write(b"ab", 3), Err(IpcError::SizeMismatch { expected: 4, actual: 5 }));
        assert_eq!(tx.write(b"x", usize::MAX), Err(IpcError::SizeMismatch { expected: 4, actual: usize::MAX }));
        assert_eq!(rx.poll(), AioStatus::InProgress);
        assert_eq!(rx.rearm(Wait::NonBlocking), Err(IpcError::WouldBlock));

        // The refused writes kept the credit.
        assert_eq!(tx.write(b"fits", 0), Ok(4));
        assert_eq!(rx.rearm(Wait::NonBlocking).unwrap(), ReadCompletion { bytes: 4, data: b"fits".to_vec() });
    }

    #[test]
    fn closed_receiver_disconnects_senders() {
        let noc = Noc::new();
        let rx = noc.node(tile(1)).portal_create("/p/g").unwrap();
        let mut tx = noc.node(tile(2)).portal_open("/p/g").unwrap();
        tx.set_wait_resource(true);
        let sender = thread::spawn(move || tx.write(b"lost", 0));
        thread::sleep(Duration::from_millis(10));
        drop(rx);
        assert_eq!(sender.join().unwrap(), Err(IpcError::Disconnected));
        assert!(noc.node(tile(1)).portal_create("/p/g").is_ok());
    }
}
