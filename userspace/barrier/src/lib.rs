// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Collective rendezvous over the NoC sync connectors
//! OWNERS: @runtime
//! STATUS: Functional
//! TEST_COVERAGE: Unit tests (host fabric, bounded-time harness)
//!
//! PUBLIC API:
//!   - Barrier::master()/master_with(): gather endpoint + release broadcast
//!   - Barrier::slave(): contribution sender + release receiver
//!   - Barrier::wait(): one round; repeatable without new setup
//!   - BarrierPaths::well_known(): default connector paths for N participants
//!
//! PROTOCOL:
//!   - Master arms its gather endpoint with all ones except the participant bits
//!   - Each slave sends `1 << tile` and blocks on the release endpoint (match 0)
//!   - Once every bit is set the master broadcasts all ones to the participants
//!
//! ERROR CONDITIONS:
//!   - BarrierError::Transport is fatal to the calling tile: peers cannot tell a
//!     partial rendezvous apart from a crashed tile, and nothing times out
//!   - BarrierError::InvalidParticipants: empty, duplicated or non-compute member set

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

use noc_abi::topology::{compute_tiles, NR_CCLUSTER};
use noc_abi::TileId;
use noc_ipc::{IpcError, Node, SyncNetwork, SyncRx, SyncTx, Wait};

/// Word broadcast by the master to release a round.
pub const RELEASE_WORD: u64 = u64::MAX;

/// Errors produced by barrier operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// The participant set cannot be expressed as contribution bits.
    #[error("invalid participant set")]
    InvalidParticipants,
    /// A connector failed; the calling tile must be treated as crashed.
    #[error("barrier transport failure: {0}")]
    Transport(#[from] IpcError),
}

/// Result alias for barrier operations.
pub type Result<T> = core::result::Result<T, BarrierError>;

/// Which side of the rendezvous a handle is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Gathers contributions and releases the round.
    Master,
    /// Contributes one bit and waits for release.
    Slave,
}

/// Connector paths used by one barrier instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarrierPaths {
    /// Gather connector on the master tile.
    pub master: String,
    /// Release connector on each participant.
    pub release: String,
}

impl BarrierPaths {
    /// Default paths for a barrier over the first `participants` compute tiles.
    pub fn well_known(participants: usize) -> Self {
        let last = participants.saturating_sub(1);
        Self {
            master: format!("/mppa/sync/128:{participants}"),
            release: format!("/mppa/sync/[0..{last}]:{}", participants + 1),
        }
    }
}

enum Endpoints<N: SyncNetwork> {
    Master { gather: N::Rx, release: N::Tx },
    Slave { contribute: N::Tx, release: N::Rx, bit: u64 },
}

/// One side of a barrier.
pub struct Barrier<N: SyncNetwork> {
    participants: usize,
    endpoints: Endpoints<N>,
}

impl<N: SyncNetwork> Barrier<N> {
    /// Creates the master side for the first `participants` compute tiles.
    pub fn master(node: &N, paths: &BarrierPaths, participants: usize) -> Result<Self> {
        if participants == 0 || participants > NR_CCLUSTER {
            return Err(BarrierError::InvalidParticipants);
        }
        let tiles: Vec<TileId> = compute_tiles().take(participants).collect();
        Self::master_with(node, paths, &tiles)
    }

    /// Creates the master side for an explicit participant set.
    pub fn master_with(node: &N, paths: &BarrierPaths, tiles: &[TileId]) -> Result<Self> {
        if tiles.is_empty() {
            return Err(BarrierError::InvalidParticipants);
        }
        let mut mask = 0u64;
        for tile in tiles {
            let bit = contribution(*tile)?;
            if mask & bit != 0 {
                return Err(BarrierError::InvalidParticipants);
            }
            mask |= bit;
        }
        let gather = node.sync_create(&paths.master, !mask)?;
        let mut release = node.sync_open(&paths.release)?;
        release.set_targets(tiles)?;
        log::debug!(
            "barrier: master on tile {} gathering {} participants at {}",
            node.tile(),
            tiles.len(),
            paths.master
        );
        Ok(Self { participants: tiles.len(), endpoints: Endpoints::Master { gather, release } })
    }

    /// Creates the slave side on the local tile, contributing to `master`.
    pub fn slave(node: &N, paths: &BarrierPaths, master: TileId) -> Result<Self> {
        let bit = contribution(node.tile())?;
        let release = node.sync_create(&paths.release, 0)?;
        let mut contribute = node.sync_open(&paths.master)?;
        contribute.set_targets(&[master])?;
        Ok(Self { participants: 1, endpoints: Endpoints::Slave { contribute, release, bit } })
    }

    /// Side of this handle.
    pub fn role(&self) -> Role {
        match self.endpoints {
            Endpoints::Master { .. } => Role::Master,
            Endpoints::Slave { .. } => Role::Slave,
        }
    }

    /// Participants gathered by the master; `1` on a slave.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Runs one round. Blocks until every participant has arrived.
    pub fn wait(&self) -> Result<()> {
        match &self.endpoints {
            Endpoints::Master { gather, release } => {
                gather.read(Wait::Blocking)?;
                release.write(RELEASE_WORD)?;
            }
            Endpoints::Slave { contribute, release, bit } => {
                contribute.write(*bit)?;
                release.read(Wait::Blocking)?;
            }
        }
        Ok(())
    }

    /// Releases both connectors.
    pub fn close(self) -> Result<()> {
        drop(self.endpoints);
        Ok(())
    }
}

fn contribution(tile: TileId) -> Result<u64> {
    if !tile.is_compute() {
        return Err(BarrierError::InvalidParticipants);
    }
    Ok(1u64 << tile.raw())
}

#[cfg(all(test, feature = "backend-host"))]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use noc_ipc::{HostNode, Noc};

    use super::*;

    fn tile(raw: u16) -> TileId {
        TileId::new(raw).unwrap()
    }

    fn spawn_slaves(
        noc: &Noc,
        paths: &BarrierPaths,
        tiles: impl Iterator<Item = u16>,
        rounds: usize,
    ) -> Vec<thread::JoinHandle<Result<()>>> {
        tiles
            .map(|raw| {
                let node = noc.node(tile(raw));
                let paths = paths.clone();
                thread::spawn(move || {
                    let barrier = Barrier::<HostNode>::slave(&node, &paths, TileId::IO0)?;
                    for _ in 0..rounds {
                        barrier.wait()?;
                    }
                    barrier.close()
                })
            })
            .collect()
    }

    #[test]
    fn master_returns_after_all_slaves() {
        let noc = Noc::new();
        let paths = BarrierPaths::well_known(4);
        let master = Barrier::master(&noc.node(TileId::IO0), &paths, 4).unwrap();
        assert_eq!(master.role(), Role::Master);
        assert_eq!(master.participants(), 4);

        let slaves = spawn_slaves(&noc, &paths, 0..4, 1);
        master.wait().unwrap();
        for slave in slaves {
            slave.join().unwrap().unwrap();
        }
    }

    #[test]
    fn rounds_repeat_without_setup() {
        let noc = Noc::new();
        let paths = BarrierPaths::well_known(3);
        let master = Barrier::master(&noc.node(TileId::IO0), &paths, 3).unwrap();
        let slaves = spawn_slaves(&noc, &paths, 0..3, 5);
        for _ in 0..5 {
            master.wait().unwrap();
        }
        for slave in slaves {
            slave.join().unwrap().unwrap();
        }
        master.close().unwrap();
    }

    #[test]
    fn missing_participant_keeps_master_blocked() {
        let noc = Noc::new();
        let paths = BarrierPaths::well_known(3);
        let master = Barrier::master(&noc.node(TileId::IO0), &paths, 3).unwrap();
        let _slaves = spawn_slaves(&noc, &paths, 0..2, 1);

        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = done_tx.send(master.wait());
        });
        assert_eq!(
            done_rx.recv_timeout(Duration::from_millis(100)),
            Err(mpsc::RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn explicit_member_set() {
        let noc = Noc::new();
        let paths = BarrierPaths { master: "/b/gather".into(), release: "/b/release".into() };
        let master = Barrier::master_with(&noc.node(TileId::IO1), &paths, &[tile(2), tile(9)]).unwrap();
        let slaves: Vec<_> = [2u16, 9]
            .into_iter()
            .map(|raw| {
                let node = noc.node(tile(raw));
                let paths = paths.clone();
                thread::spawn(move || {
                    Barrier::<HostNode>::slave(&node, &paths, TileId::IO1)?.wait()
                })
            })
            .collect();
        master.wait().unwrap();
        for slave in slaves {
            slave.join().unwrap().unwrap();
        }
    }

    #[test]
    fn invalid_member_sets() {
        let noc = Noc::new();
        let node = noc.node(TileId::IO0);
        let paths = BarrierPaths::well_known(2);
        assert!(matches!(
            Barrier::master(&node, &paths, 0),
            Err(BarrierError::InvalidParticipants)
        ));
        assert!(matches!(
            Barrier::master(&node, &paths, NR_CCLUSTER + 1),
            Err(BarrierError::InvalidParticipants)
        ));
        assert!(matches!(
            Barrier::master_with(&node, &paths, &[tile(1), tile(1)]),
            Err(BarrierError::InvalidParticipants)
        ));
        assert!(matches!(
            Barrier::<HostNode>::slave(&noc.node(TileId::IO1), &paths, TileId::IO0),
            Err(BarrierError::InvalidParticipants)
        ));
    }

    #[test]
    fn duplicate_master_is_a_transport_error() {
        let noc = Noc::new();
        let node = noc.node(TileId::IO0);
        let paths = BarrierPaths::well_known(2);
        let _first = Barrier::master(&node, &paths, 2).unwrap();
        assert!(matches!(
            Barrier::master(&node, &paths, 2),
            Err(BarrierError::Transport(IpcError::AddressInUse))
        ));
    }

    #[test]
    fn well_known_paths() {
        let paths = BarrierPaths::well_known(16);
        assert_eq!(paths.master, "/mppa/sync/128:16");
        assert_eq!(paths.release, "/mppa/sync/[0..15]:17");
    }
}
