// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Name Service building blocks shared by the registry daemon and its clients.
//!
//! [`Registry`] is the authoritative table mapping symbolic names to tiles and DMA
//! channels. It is owned by exactly one dispatch task and carries no locks.
//! [`NameClient`] is the per-tile stub that talks to that task over mailboxes.
//! Both read the same [`NameServiceConfig`].

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

pub mod client;
pub mod config;
pub mod registry;

pub use client::{NameClient, Resolution};
pub use config::{AckMode, ConfigError, NameServiceConfig};
pub use registry::{NameRecord, Registry};

use noc_abi::errno;
use noc_abi::name::NameError;
use noc_ipc::IpcError;

/// Result alias for Name Service operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by the Name Service.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed name, unknown tile or unmapped DMA channel.
    #[error("invalid argument")]
    InvalidArgument,
    /// The symbolic name does not fit the wire buffer.
    #[error("name too long")]
    NameTooLong,
    /// Lookup or reverse lookup miss.
    #[error("name not found")]
    NotFound,
    /// The client was used before `setup()`.
    #[error("name client not initialized")]
    NotInitialized,
    /// The registry table is full.
    #[error("name table full")]
    Capacity,
    /// The slot or the name is already bound.
    #[error("name or channel already registered")]
    Conflict,
    /// The registry answered with something that is not a reply.
    #[error("unexpected reply from name server")]
    Protocol,
    /// Transport failure; distinct from protocol misses.
    #[error("transport error: {0}")]
    Io(#[from] IpcError),
}

impl Error {
    /// Negative errno carried in replies and returned by C-style entry points.
    pub fn errno(&self) -> i32 {
        -match self {
            Self::InvalidArgument => errno::EINVAL,
            Self::NameTooLong => errno::ENAMETOOLONG,
            Self::NotFound => errno::ENOENT,
            Self::NotInitialized => errno::EAGAIN,
            Self::Capacity => errno::ENOSPC,
            Self::Conflict => errno::EEXIST,
            Self::Protocol | Self::Io(_) => errno::EIO,
        }
    }

    /// Maps a negative errno from a `FAIL` reply back to an error.
    pub fn from_errno(code: i32) -> Self {
        match -code {
            errno::EINVAL => Self::InvalidArgument,
            errno::ENAMETOOLONG => Self::NameTooLong,
            errno::ENOENT => Self::NotFound,
            errno::EAGAIN => Self::NotInitialized,
            errno::ENOSPC => Self::Capacity,
            errno::EEXIST => Self::Conflict,
            _ => Self::Protocol,
        }
    }
}

impl From<NameError> for Error {
    fn from(err: NameError) -> Self {
        match err {
            NameError::Invalid => Self::InvalidArgument,
            NameError::TooLong => Self::NameTooLong,
        }
    }
}

/// Converts an operation result to `0` or a negative errno.
pub fn status<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => err.errno(),
    }
}
