// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bootstrap of the name server tile.
//!
//! The dispatch thread creates the registry inbox under the lifecycle lock and then
//! meets the starting thread on a two-party handoff, so `start()` only returns once
//! requests can be accepted. `boot()` additionally holds every compute tile in the
//! global barrier until that point.

use std::sync::{Arc, Barrier as Handoff};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use names::{NameServiceConfig, Registry};
use noc_barrier::{Barrier, BarrierPaths};
use noc_ipc::{Inbox, IpcError, MailboxAddr, MessageNetwork, SyncNetwork};

use crate::{serve, MailboxTransport, Server, ServerError};

#[derive(Clone, Debug, PartialEq, Eq)]
enum InboxState {
    Pending,
    Bound(MailboxAddr),
    Failed(IpcError),
    Unlinked,
}

/// Running name server.
pub struct Daemon {
    inbox: Arc<Mutex<InboxState>>,
    handle: JoinHandle<Result<Server, ServerError>>,
}

impl Daemon {
    /// Spawns the dispatch thread and waits until its inbox exists.
    pub fn start<N>(node: N, config: NameServiceConfig) -> Result<Self, ServerError>
    where
        N: MessageNetwork + Send + 'static,
    {
        let handoff = Arc::new(Handoff::new(2));
        let inbox = Arc::new(Mutex::new(InboxState::Pending));
        let handle = {
            let handoff = Arc::clone(&handoff);
            let inbox = Arc::clone(&inbox);
            thread::Builder::new()
                .name("named".into())
                .spawn(move || dispatch(node, config, &handoff, &inbox))
                .map_err(ServerError::Spawn)?
        };
        handoff.wait();

        let failed = matches!(*inbox.lock(), InboxState::Failed(_) | InboxState::Pending);
        if failed {
            return match handle.join() {
                Ok(Ok(_)) => Err(ServerError::Panicked),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(ServerError::Panicked),
            };
        }
        Ok(Self { inbox, handle })
    }

    /// Starts the server, then releases the first `participants` compute tiles
    /// waiting in the global barrier at `paths`.
    pub fn boot<N>(
        node: N,
        config: NameServiceConfig,
        paths: &BarrierPaths,
        participants: usize,
    ) -> Result<Self, ServerError>
    where
        N: MessageNetwork + SyncNetwork + Clone + Send + 'static,
    {
        let barrier = Barrier::master(&node, paths, participants)?;
        let daemon = Self::start(node, config)?;
        barrier.wait()?;
        barrier.close()?;
        log::info!("named: {participants} tiles released");
        Ok(daemon)
    }

    /// Registry inbox address while the server is accepting requests.
    pub fn inbox(&self) -> Option<MailboxAddr> {
        match &*self.inbox.lock() {
            InboxState::Bound(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Waits for EXIT and returns the final table.
    pub fn join(self) -> Result<Registry, ServerError> {
        self.join_server().map(Server::into_registry)
    }

    /// Waits for EXIT and returns the server with its table and heartbeat record.
    pub fn join_server(self) -> Result<Server, ServerError> {
        self.handle.join().map_err(|_| ServerError::Panicked)?
    }
}

fn dispatch<N: MessageNetwork>(
    node: N,
    config: NameServiceConfig,
    handoff: &Handoff,
    state: &Mutex<InboxState>,
) -> Result<Server, ServerError> {
    let created = {
        let mut state = state.lock();
        let created = node.create(config.server_port);
        *state = match &created {
            Ok(inbox) => InboxState::Bound(inbox.addr()),
            Err(err) => InboxState::Failed(err.clone()),
        };
        created
    };
    handoff.wait();
    let inbox = created?;
    log::info!("named: serving on {}", inbox.addr());

    let mut transport = MailboxTransport::new(node, inbox, config.client_port);
    let result = serve(&mut transport, Server::new(Registry::new(), config.ack));

    let mut state = state.lock();
    let inbox = transport.into_inbox();
    let addr = inbox.addr();
    if let Err(err) = inbox.unlink() {
        log::warn!("named: unlinking {addr} failed: {err}");
    }
    *state = InboxState::Unlinked;
    log::info!("named: {addr} unlinked");
    result
}

#[cfg(all(test, feature = "backend-host"))]
mod tests {
    use noc_abi::TileId;
    use noc_ipc::Noc;

    use super::*;

    #[test]
    fn start_binds_the_well_known_inbox() {
        let noc = Noc::new();
        let daemon = Daemon::start(noc.node(TileId::IO0), NameServiceConfig::default()).unwrap();
        assert_eq!(daemon.inbox(), Some(MailboxAddr::new(TileId::IO0, 2)));
        assert!(matches!(noc.node(TileId::IO0).create(2), Err(IpcError::AddressInUse)));
    }

    #[test]
    fn start_reports_a_taken_inbox() {
        let noc = Noc::new();
        let _squatter = noc.node(TileId::IO0).create(2).unwrap();
        let err = Daemon::start(noc.node(TileId::IO0), NameServiceConfig::default())
            .err()
            .expect("inbox already bound");
        assert!(matches!(err, ServerError::Transport(_)));
    }
}
