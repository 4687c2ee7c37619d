// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Threads-as-tiles harness: boots the name server on the first I/O tile, holds
//! the compute tiles in the global barrier until it is ready, then runs one
//! closure per tile with a ready Name Service client.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use named::{Daemon, ServerError};
use names::{NameClient, NameServiceConfig, Registry};
use noc_abi::topology::compute_tiles;
use noc_abi::TileId;
use noc_barrier::{Barrier, BarrierPaths};
use noc_ipc::{HostNode, Noc};

/// What a tile closure receives.
pub struct TileContext {
    /// Local tile handle.
    pub node: HostNode,
    /// Client already set up against the registry.
    pub names: NameClient<HostNode>,
}

impl TileContext {
    /// Local tile.
    pub fn tile(&self) -> TileId {
        self.names.tile()
    }
}

/// A fabric with `participants` compute tiles and one name server.
pub struct Cluster {
    /// The emulated interconnect.
    pub noc: Noc,
    /// Name Service configuration used by server and clients.
    pub config: NameServiceConfig,
    /// Global barrier paths.
    pub paths: BarrierPaths,
    participants: usize,
}

impl Cluster {
    /// Creates a cluster over the first `participants` compute tiles.
    pub fn new(participants: usize) -> Self {
        Self::with_config(participants, NameServiceConfig::default())
    }

    /// Same as [`Cluster::new`] with an explicit configuration.
    pub fn with_config(participants: usize, config: NameServiceConfig) -> Self {
        Self {
            noc: Noc::new(),
            config,
            paths: BarrierPaths::well_known(participants),
            participants,
        }
    }

    /// Boots the server, runs `tile_main` on every compute tile, then shuts the
    /// server down and returns its final table with the per-tile results.
    pub fn run<F, T>(&self, tile_main: F) -> Result<(Registry, Vec<T>), ServerError>
    where
        F: Fn(TileContext) -> T + Send + Sync + 'static,
        T: Send + 'static,
    {
        let tile_main = Arc::new(tile_main);
        let master = self.config.server_tile();
        let tiles: Vec<_> = compute_tiles()
            .take(self.participants)
            .map(|tile| {
                let node = self.noc.node(tile);
                let paths = self.paths.clone();
                let config = self.config.clone();
                let tile_main = Arc::clone(&tile_main);
                thread::Builder::new()
                    .name(format!("tile-{tile}"))
                    .spawn(move || {
                        let barrier = Barrier::slave(&node, &paths, master)?;
                        barrier.wait()?;
                        barrier.close()?;
                        let names = NameClient::new(node.clone(), config);
                        names.setup().map_err(|err| ServerError::Transport(err.to_string().into()))?;
                        Ok::<T, ServerError>(tile_main(TileContext { node, names }))
                    })
                    .map_err(ServerError::Spawn)
            })
            .collect::<Result<_, _>>()?;

        let daemon = Daemon::boot(self.noc.node(master), self.config.clone(), &self.paths, self.participants)?;
        log::info!("e2e: {} tiles booted", self.participants);

        let mut results = Vec::with_capacity(tiles.len());
        for handle in tiles {
            results.push(handle.join().map_err(|_| ServerError::Panicked)??);
        }

        let admin = NameClient::new(self.noc.node(TileId::IO1), self.config.clone());
        admin.setup().map_err(|err| ServerError::Transport(err.to_string().into()))?;
        admin.shutdown().map_err(|err| ServerError::Transport(err.to_string().into()))?;
        Ok((daemon.join()?, results))
    }
}

/// Retries `lookup` until `name` appears or `timeout` passes.
pub fn await_name(names: &NameClient<HostNode>, name: &str, timeout: Duration) -> Option<TileId> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(tile) = names.lookup(name) {
            return Some(tile);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
