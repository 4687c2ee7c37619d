// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size mailboxes backed by bounded crossbeam queues.

use std::sync::Arc;

use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError,
};

use super::{Fabric, HostNode};
use crate::{Inbox, IpcError, MailboxAddr, MessageNetwork, Node, Outbox, Result, Wait};

/// Receiving end of a host mailbox. Dropping it unlinks the address.
pub struct HostInbox {
    addr: MailboxAddr,
    msg_size: usize,
    rx: Receiver<Vec<u8>>,
    fabric: Arc<Fabric>,
}

/// Sending end of a host mailbox.
pub struct HostOutbox {
    addr: MailboxAddr,
    msg_size: usize,
    tx: Sender<Vec<u8>>,
}

impl MessageNetwork for HostNode {
    type Inbox = HostInbox;
    type Outbox = HostOutbox;

    fn create(&self, port: u8) -> Result<HostInbox> {
        let addr = MailboxAddr::new(self.tile(), port);
        let mut boxes = self.fabric.mailboxes.lock();
        if boxes.contains_key(&addr) {
            return Err(IpcError::AddressInUse);
        }
        let (tx, rx) = bounded(self.fabric.config.mailbox_depth);
        boxes.insert(addr, tx);
        log::trace!("mailbox: created {addr}");
        Ok(HostInbox {
            addr,
            msg_size: self.fabric.config.msg_size,
            rx,
            fabric: Arc::clone(&self.fabric),
        })
    }

    fn open(&self, addr: MailboxAddr) -> Result<HostOutbox> {
        let tx = self.fabric.mailboxes.lock().get(&addr).cloned().ok_or(IpcError::NoSuchEndpoint)?;
        Ok(HostOutbox { addr, msg_size: self.fabric.config.msg_size, tx })
    }
}

impl Inbox for HostInbox {
    fn addr(&self) -> MailboxAddr {
        self.addr
    }

    fn read(&self, frame: &mut [u8], wait: Wait) -> Result<()> {
        if frame.len() != self.msg_size {
            return Err(IpcError::SizeMismatch { expected: self.msg_size, actual: frame.len() });
        }
        let msg = match wait {
            Wait::Blocking => self.rx.recv().map_err(|_| IpcError::Disconnected)?,
            Wait::NonBlocking => self.rx.try_recv().map_err(|err| match err {
                TryRecvError::Empty => IpcError::WouldBlock,
                TryRecvError::Disconnected => IpcError::Disconnected,
            })?,
            Wait::Timeout(timeout) => self.rx.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => IpcError::Timeout,
                RecvTimeoutError::Disconnected => IpcError::Disconnected,
            })?,
        };
        frame.copy_from_slice(&msg);
        Ok(())
    }

    fn unlink(self) -> Result<()> {
        // Drop removes the address from the fabric.
        Ok(())
    }
}

impl Drop for HostInbox {
    fn drop(&mut self) {
        self.fabric.mailboxes.lock().remove(&self.addr);
        log::trace!("mailbox: unlinked {}", self.addr);
    }
}

impl Outbox for HostOutbox {
    fn write(&self, frame: &[u8], wait: Wait) -> Result<()> {
        if frame.len() != self.msg_size {
            return Err(IpcError::SizeMismatch { expected: self.msg_size, actual: frame.len() });
        }
        let msg = frame.to_vec();
        match wait {
            Wait::Blocking => self.tx.send(msg).map_err(|_| IpcError::Disconnected),
            Wait::NonBlocking => self.tx.try_send(msg).map_err(|err| match err {
                TrySendError::Full(_) => IpcError::WouldBlock,
                TrySendError::Disconnected(_) => IpcError::Disconnected,
            }),
            Wait::Timeout(timeout) => self.tx.send_timeout(msg, timeout).map_err(|err| match err {
                SendTimeoutError::Timeout(_) => IpcError::Timeout,
                SendTimeoutError::Disconnected(_) => IpcError::Disconnected,
            }),
        }
    }

    fn close(self) -> Result<()> {
        log::trace!("mailbox: closed outbox to {}", self.addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use noc_abi::TileId;

    use crate::{Noc, NocConfig};

    use super::*;

    fn tile(raw: u16) -> TileId {
        TileId::new(raw).unwrap()
    }

    fn small_noc() -> Noc {
        Noc::with_config(NocConfig { msg_size: 4, mailbox_depth: 2 })
    }

    #[test]
    fn frames_arrive_in_order() {
        let noc = small_noc();
        let inbox = noc.node(tile(1)).create(7).unwrap();
        let outbox = noc.node(tile(2)).open(MailboxAddr::new(tile(1), 7)).unwrap();
        outbox.write(b"one!", Wait::Blocking).unwrap();
        outbox.write(b"two!", Wait::Blocking).unwrap();

        let mut frame = [0u8; 4];
        inbox.read(&mut frame, Wait::Blocking).unwrap();
        assert_eq!(&frame, b"one!");
        inbox.read(&mut frame, Wait::Blocking).unwrap();
        assert_eq!(&frame, b"two!");
        assert_eq!(inbox.read(&mut frame, Wait::NonBlocking), Err(IpcError::WouldBlock));
    }

    #[test]
    fn whole_frames_only() {
        let noc = small_noc();
        let inbox = noc.node(tile(1)).create(0).unwrap();
        let outbox = noc.node(tile(1)).open(inbox.addr()).unwrap();
        assert_eq!(
            outbox.write(b"toolong", Wait::Blocking),
            Err(IpcError::SizeMismatch { expected: 4, actual: 7 })
        );
        let mut short = [0u8; 3];
        assert_eq!(
            inbox.read(&mut short, Wait::NonBlocking),
            Err(IpcError::SizeMismatch { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn address_lifecycle() {
        let noc = small_noc();
        let node = noc.node(tile(5));
        let inbox = node.create(1).unwrap();
        assert!(matches!(node.create(1), Err(IpcError::AddressInUse)));

        let outbox = node.open(MailboxAddr::new(tile(5), 1)).unwrap();
        inbox.unlink().unwrap();
        assert_eq!(outbox.write(b"gone", Wait::Blocking), Err(IpcError::Disconnected));
        assert!(matches!(
            node.open(MailboxAddr::new(tile(5), 1)),
            Err(IpcError::NoSuchEndpoint)
        ));
        assert!(node.create(1).is_ok());
    }

    #[test]
    fn full_mailbox_applies_backpressure() {
        let noc = small_noc();
        let inbox = noc.node(tile(0)).create(3).unwrap();
        let outbox = noc.node(tile(4)).open(inbox.addr()).unwrap();
        outbox.write(b"aaaa", Wait::NonBlocking).unwrap();
        outbox.write(b"bbbb", Wait::NonBlocking).unwrap();
        assert_eq!(outbox.write(b"cccc", Wait::NonBlocking), Err(IpcError::WouldBlock));
        assert_eq!(
            outbox.write(b"cccc", Wait::Timeout(Duration::from_millis(10))),
            Err(IpcError::Timeout)
        );
    }
}
