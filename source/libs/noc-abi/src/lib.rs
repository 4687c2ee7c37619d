// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: Shared ABI definitions for the NoC naming and rendezvous layer
//! OWNERS: @runtime
//! PUBLIC API: TileId, topology constants, errno codes, symbolic-name validation,
//!   Name Service frames (namesvc)
//! DEPENDS_ON: no_std
//! INVARIANTS: Name Service frames are 128 bytes LE; `-1` encodes "absent" for id/dma

pub mod namesvc;

pub use topology::TileId;

/// NoC topology of the target board (16 compute tiles, 2 I/O tiles with 4 DMA engines each).
pub mod topology {
    use core::fmt;

    /// Number of compute tiles.
    pub const NR_CCLUSTER: usize = 16;
    /// DMA channels per compute tile.
    pub const NR_CCLUSTER_DMA: usize = 1;
    /// Number of I/O tiles.
    pub const NR_IOCLUSTER: usize = 2;
    /// DMA engines (physical interfaces) per I/O tile.
    pub const NR_IOCLUSTER_DMA: usize = 4;
    /// Node number of the first I/O tile.
    pub const IOCLUSTER0: u16 = 128;
    /// Node number of the second I/O tile.
    pub const IOCLUSTER1: u16 = 192;
    /// Total number of DMA channels in the system; also the name table capacity.
    pub const NR_DMA: usize = NR_CCLUSTER * NR_CCLUSTER_DMA + NR_IOCLUSTER * NR_IOCLUSTER_DMA;

    /// Addressable NoC node (compute tile or one DMA node of an I/O tile).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct TileId(u16);

    impl TileId {
        /// First DMA node of I/O tile 0.
        pub const IO0: Self = Self(IOCLUSTER0);
        /// First DMA node of I/O tile 1.
        pub const IO1: Self = Self(IOCLUSTER1);

        /// Returns the tile for `raw` if it names an existing node.
        pub const fn new(raw: u16) -> Option<Self> {
            if is_valid(raw) {
                Some(Self(raw))
            } else {
                None
            }
        }

        /// Converts a wire integer (which may carry the `-1` sentinel) into a tile.
        pub fn from_wire(raw: i32) -> Option<Self> {
            u16::try_from(raw).ok().and_then(Self::new)
        }

        /// Returns the raw node number.
        pub const fn raw(self) -> u16 {
            self.0
        }

        /// Returns `true` for compute tiles.
        pub const fn is_compute(self) -> bool {
            (self.0 as usize) < NR_CCLUSTER
        }

        /// Returns `true` for the DMA nodes of an I/O tile.
        pub const fn is_io(self) -> bool {
            !self.is_compute()
        }

        /// Default DMA channel owned by this node.
        pub const fn channel(self) -> u16 {
            self.0
        }
    }

    impl fmt::Display for TileId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    /// Returns `true` when `raw` names a compute tile or an I/O DMA node.
    pub const fn is_valid(raw: u16) -> bool {
        let io = NR_IOCLUSTER_DMA as u16;
        (raw as usize) < NR_CCLUSTER
            || (raw >= IOCLUSTER0 && raw < IOCLUSTER0 + io)
            || (raw >= IOCLUSTER1 && raw < IOCLUSTER1 + io)
    }

    /// Maps a DMA channel to its name table slot.
    ///
    /// Compute channels come first, then the engines of I/O tile 0, then I/O tile 1.
    pub const fn dma_slot(dma: u16) -> Option<usize> {
        let io = NR_IOCLUSTER_DMA as u16;
        if (dma as usize) < NR_CCLUSTER * NR_CCLUSTER_DMA {
            Some(dma as usize)
        } else if dma >= IOCLUSTER0 && dma < IOCLUSTER0 + io {
            Some(NR_CCLUSTER + (dma - IOCLUSTER0) as usize)
        } else if dma >= IOCLUSTER1 && dma < IOCLUSTER1 + io {
            Some(NR_CCLUSTER + NR_IOCLUSTER_DMA + (dma - IOCLUSTER1) as usize)
        } else {
            None
        }
    }

    /// Iterates over all compute tiles in rank order.
    pub fn compute_tiles() -> impl Iterator<Item = TileId> {
        (0..NR_CCLUSTER as u16).map(TileId)
    }

}

/// Negative error codes carried in replies and returned by C-style entry points.
pub mod errno {
    /// No such name or tile.
    pub const ENOENT: i32 = 2;
    /// Transport failure.
    pub const EIO: i32 = 5;
    /// Resource not ready (client not initialized).
    pub const EAGAIN: i32 = 11;
    /// Slot already taken.
    pub const EEXIST: i32 = 17;
    /// Malformed argument.
    pub const EINVAL: i32 = 22;
    /// Name table full.
    pub const ENOSPC: i32 = 28;
    /// Symbolic name too long.
    pub const ENAMETOOLONG: i32 = 36;
}

/// Symbolic endpoint names.
pub mod name {
    use core::fmt;

    use crate::errno;

    /// Size of a name buffer on the wire, including the NUL terminator.
    pub const NAME_MAX: usize = 50;

    /// Reasons a symbolic name is refused.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum NameError {
        /// Name is empty or contains a NUL byte.
        Invalid,
        /// Name does not fit the wire buffer.
        TooLong,
    }

    impl NameError {
        /// Negative errno for this error.
        pub const fn errno(self) -> i32 {
            match self {
                Self::Invalid => -errno::EINVAL,
                Self::TooLong => -errno::ENAMETOOLONG,
            }
        }
    }

    impl fmt::Display for NameError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Invalid => write!(f, "invalid name"),
                Self::TooLong => write!(f, "name too long"),
            }
        }
    }

    /// Checks that `name` may be registered or looked up.
    pub fn validate(name: &str) -> Result<(), NameError> {
        if name.is_empty() || name.bytes().any(|b| b == 0) {
            return Err(NameError::Invalid);
        }
        if name.len() >= NAME_MAX - 1 {
            return Err(NameError::TooLong);
        }
        Ok(())
    }

}
