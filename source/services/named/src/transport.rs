// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use noc_abi::namesvc::FRAME_LEN;
use noc_abi::TileId;
use noc_ipc::{Inbox, IpcError, MailboxAddr, MessageNetwork, Outbox, Wait};

use crate::{Transport, TransportError};

/// [`Transport`] reading the registry inbox and replying to client inboxes.
pub struct MailboxTransport<N: MessageNetwork> {
    node: N,
    inbox: N::Inbox,
    client_port: u8,
}

impl<N: MessageNetwork> MailboxTransport<N> {
    /// Serves `inbox`; replies go to `client_port` on the requesting tile.
    pub fn new(node: N, inbox: N::Inbox, client_port: u8) -> Self {
        Self { node, inbox, client_port }
    }

    /// Address requests are read from.
    pub fn addr(&self) -> MailboxAddr {
        self.inbox.addr()
    }

    /// Gives the inbox back so the caller can unlink it.
    pub fn into_inbox(self) -> N::Inbox {
        self.inbox
    }
}

impl<N: MessageNetwork> Transport for MailboxTransport<N> {
    type Error = TransportError;

    fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut frame = vec![0u8; FRAME_LEN];
        match self.inbox.read(&mut frame, Wait::Blocking) {
            Ok(()) => Ok(Some(frame)),
            Err(IpcError::Disconnected) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn send(&mut self, to: TileId, frame: &[u8]) -> Result<(), TransportError> {
        let outbox = self.node.open(MailboxAddr::new(to, self.client_port))?;
        outbox.write(frame, Wait::Blocking)?;
        outbox.close()?;
        Ok(())
    }
}
