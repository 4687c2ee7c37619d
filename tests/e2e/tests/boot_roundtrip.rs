//! CONTEXT: Cross-crate boot scenarios on the host fabric
//! INTENT: Global barrier -> name server -> link/lookup -> portal transfer
//! DEPS: named, names, noc-barrier, noc-portal (host backend)
//! TESTS: every tile resolves every other tile; resolved addresses carry a portal
//!   transfer; leftover registrations come back with the final table
// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use names::{AckMode, Error, NameServiceConfig};
use noc_abi::TileId;
use noc_e2e::{await_name, Cluster};
use noc_portal::Portal;

const PARTICIPANTS: usize = 4;
const PATIENCE: Duration = Duration::from_secs(5);

fn tile(raw: u16) -> TileId {
    TileId::new(raw).unwrap()
}

#[test]
fn every_tile_resolves_every_peer() {
    let _ = env_logger::builder().is_test(true).try_init();
    let cluster = Cluster::new(PARTICIPANTS);
    let (registry, seen) = cluster
        .run(|ctx| {
            let me = ctx.tile();
            ctx.names.link(me, &format!("worker{me}")).unwrap();
            let peers: Vec<_> = (0..PARTICIPANTS as u16)
                .map(|raw| await_name(&ctx.names, &format!("worker{raw}"), PATIENCE))
                .collect();
            let reverse = ctx.names.reverse_lookup(me).unwrap();
            assert_eq!(reverse.name, format!("worker{me}"));
            peers
        })
        .unwrap();

    for peers in seen {
        let expected: Vec<_> = (0..PARTICIPANTS as u16).map(|raw| Some(tile(raw))).collect();
        assert_eq!(peers, expected);
    }
    assert_eq!(registry.occupancy(), PARTICIPANTS);
}

#[test]
fn resolved_address_carries_a_portal_transfer() {
    let cluster = Cluster::new(2);
    let (registry, results) = cluster
        .run(|ctx| {
            let me = ctx.tile();
            if me == tile(0) {
                let mut sink = Portal::create_for_read(&ctx.node, "/portal/sink", 32, None).unwrap();
                ctx.names.link(me, "sink").unwrap();
                sink.allow(tile(1)).unwrap();
                let mut out = [0u8; 32];
                sink.read(&mut out).unwrap();
                ctx.names.unlink("sink").unwrap();
                sink.close().unwrap();
                out.to_vec()
            } else {
                let receiver = await_name(&ctx.names, "sink", PATIENCE).expect("sink registered");
                let mut source = Portal::create_for_write(&ctx.node, "/portal/sink", receiver).unwrap();
                let payload: Vec<u8> = (0..32u8).map(|b| b.wrapping_mul(7)).collect();
                source.write_async(&payload, 0).unwrap();
                source.wait_write().unwrap();
                source.close().unwrap();
                payload
            }
        })
        .unwrap();

    assert_eq!(results[0], results[1]);
    assert_eq!(registry.occupancy(), 0);
}

#[test]
fn unacknowledged_registrations_settle_in_order() {
    let config = NameServiceConfig { ack: AckMode::FireAndForget, ..Default::default() };
    let cluster = Cluster::with_config(3, config);
    let (registry, _) = cluster
        .run(|ctx| {
            let me = ctx.tile();
            ctx.names.link(me, "leader").unwrap();
            // Requests from one tile are served in order, so the lookup sees the outcome.
            let leader = ctx.names.lookup("leader").unwrap();
            assert_eq!(ctx.names.unlink("nobody"), Ok(()));
            leader
        })
        .unwrap();
    assert_eq!(registry.occupancy(), 1);
    assert!(registry.tile_of("leader").is_some());
}

#[test]
fn client_errors_surface_per_tile() {
    let cluster = Cluster::new(1);
    let (_, errors) = cluster
        .run(|ctx| {
            let long = "n".repeat(noc_abi::name::NAME_MAX);
            (
                ctx.names.link(ctx.tile(), &long),
                ctx.names.lookup("missing"),
                ctx.names.link_raw(500, "bad"),
            )
        })
        .unwrap();
    let (too_long, missing, bad_tile) = &errors[0];
    assert_eq!(too_long, &Err(Error::NameTooLong));
    assert_eq!(missing, &Err(Error::NotFound));
    assert_eq!(bad_tile, &Err(Error::InvalidArgument));
}
