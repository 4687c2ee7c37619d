// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Authoritative name table of the Name Service
//! OWNERS: @runtime
//! STATUS: Functional
//! TEST_COVERAGE: Unit tests + proptest laws
//!
//! INVARIANTS:
//!   - One record per DMA channel slot; slot index comes only from `dma_slot`
//!   - `occupancy()` equals the number of filled slots
//!   - A symbolic name is bound at most once
//!   - Lookups are first-match linear scans in slot order

use noc_abi::errno;
use noc_abi::namesvc::{FixedStr, NameMessage, Opcode};
use noc_abi::topology::{dma_slot, NR_DMA};
use noc_abi::TileId;

use crate::{Error, Result};

/// One registered endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NameRecord {
    /// Tile hosting the endpoint.
    pub tile: TileId,
    /// DMA channel selecting the table slot.
    pub dma: u16,
    /// Symbolic name.
    pub name: FixedStr,
    /// Name of the owning process.
    pub process_name: FixedStr,
}

/// Fixed-capacity name table.
#[derive(Debug)]
pub struct Registry {
    slots: Vec<Option<NameRecord>>,
    occupancy: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self { slots: vec![None; NR_DMA], occupancy: 0 }
    }
}

impl Registry {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of filled slots.
    pub fn occupancy(&self) -> usize {
        self.occupancy
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates over filled slots in slot order.
    pub fn records(&self) -> impl Iterator<Item = &NameRecord> {
        self.slots.iter().flatten()
    }

    /// Stores `record` in the slot of its DMA channel. Never overwrites.
    pub fn link(&mut self, record: NameRecord) -> Result<usize> {
        if self.occupancy >= self.capacity() {
            return Err(Error::Capacity);
        }
        let slot = dma_slot(record.dma).ok_or(Error::InvalidArgument)?;
        if record.name.is_empty() {
            return Err(Error::InvalidArgument);
        }
        if self.slots[slot].is_some() || self.find(record.name.as_str()).is_some() {
            return Err(Error::Conflict);
        }
        self.slots[slot] = Some(record);
        self.occupancy += 1;
        Ok(slot)
    }

    /// Frees the slot bound to `name`. Returns `false` (and changes nothing) on a miss.
    pub fn unlink(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(slot) => {
                self.slots[slot] = None;
                self.occupancy -= 1;
                true
            }
            None => false,
        }
    }

    /// Tile bound to `name`.
    pub fn tile_of(&self, name: &str) -> Option<TileId> {
        self.record_by_name(name).map(|record| record.tile)
    }

    /// DMA channel bound to `name`.
    pub fn dma_of(&self, name: &str) -> Option<u16> {
        self.record_by_name(name).map(|record| record.dma)
    }

    /// First name registered on `tile`.
    pub fn name_of(&self, tile: TileId) -> Option<&str> {
        self.record_by_tile(tile).map(|record| record.name.as_str())
    }

    /// Owning process of the first record on `tile`.
    pub fn process_of(&self, tile: TileId) -> Option<&str> {
        self.record_by_tile(tile).map(|record| record.process_name.as_str())
    }

    /// Answers a `QUERY`: fills in whatever the request left absent.
    ///
    /// A request without `id` is keyed by name, otherwise by id. The reply is the
    /// augmented request with `SUCCESS`, or `FAIL` and `-ENOENT` when the key is unknown.
    pub fn query(&self, request: &NameMessage) -> NameMessage {
        let mut reply = *request;
        reply.errcode = 0;
        let record = match request.id {
            None => self.record_by_name(request.name.as_str()),
            Some(tile) => self.record_by_tile(tile),
        };
        match record {
            Some(record) => {
                reply.op = Opcode::Success;
                reply.id = Some(record.tile);
                reply.name = record.name;
                reply.dma = Some(record.dma);
                reply.process_name = record.process_name;
            }
            None => {
                reply.op = Opcode::Fail;
                reply.errcode = -errno::ENOENT;
                reply.dma = None;
            }
        }
        reply
    }

    /// Applies an `ADD` request.
    pub fn add(&mut self, request: &NameMessage) -> Result<usize> {
        let (Some(tile), Some(dma)) = (request.id, request.dma) else {
            return Err(Error::InvalidArgument);
        };
        self.link(NameRecord {
            tile,
            dma,
            name: request.name,
            process_name: request.process_name,
        })
    }

    /// Applies a `REMOVE` request.
    pub fn remove(&mut self, request: &NameMessage) -> bool {
        self.unlink(request.name.as_str())
    }

    fn find(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|record| record.name.as_str() == name))
    }

    fn record_by_name(&self, name: &str) -> Option<&NameRecord> {
        self.find(name).and_then(|slot| self.slots[slot].as_ref())
    }

    fn record_by_tile(&self, tile: TileId) -> Option<&NameRecord> {
        self.records().find(|record| record.tile == tile)
    }
}
