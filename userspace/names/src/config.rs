// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Name Service configuration shared by the daemon and its clients.
//!
//! ```toml
//! server_tile = 128
//! server_port = 2
//! client_port = 1
//! ack = "reply"          # or "fire-and-forget"
//! mailbox_depth = 16
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use noc_abi::namesvc::{NAME_CLIENT_PORT, NAME_SERVER_PORT, NAME_SERVER_TILE};
use noc_abi::TileId;
use noc_ipc::MailboxAddr;

/// Whether `ADD` and `REMOVE` are acknowledged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckMode {
    /// Every request gets a `SUCCESS` or `FAIL` reply.
    #[default]
    Reply,
    /// Only `QUERY` is answered; registrations are not confirmed.
    FireAndForget,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {origin}: {source}")]
    Parse {
        /// File name or `<inline>`.
        origin: String,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
    /// Parsed values are out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where the registry lives and how it acknowledges.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NameServiceConfig {
    /// Tile hosting the registry.
    pub server_tile: u16,
    /// Registry inbox port.
    pub server_port: u8,
    /// Port clients receive replies on.
    pub client_port: u8,
    /// Acknowledgement policy for `ADD`/`REMOVE`.
    pub ack: AckMode,
    /// Requests buffered by the registry inbox.
    pub mailbox_depth: usize,
}

impl Default for NameServiceConfig {
    fn default() -> Self {
        Self {
            server_tile: NAME_SERVER_TILE.raw(),
            server_port: NAME_SERVER_PORT,
            client_port: NAME_CLIENT_PORT,
            ack: AckMode::Reply,
            mailbox_depth: 16,
        }
    }
}

impl NameServiceConfig {
    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::parse_named(&text, &path.display().to_string())
    }

    /// Parses and validates TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Self::parse_named(text, "<inline>")
    }

    fn parse_named(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)
            .map_err(|source| ConfigError::Parse { origin: origin.to_owned(), source })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if TileId::new(self.server_tile).is_none() {
            return Err(ConfigError::Invalid(format!("server_tile {} is not a tile", self.server_tile)));
        }
        if self.server_port == self.client_port {
            return Err(ConfigError::Invalid("server_port and client_port must differ".into()));
        }
        if self.mailbox_depth == 0 {
            return Err(ConfigError::Invalid("mailbox_depth must be positive".into()));
        }
        Ok(())
    }

    /// Registry tile; falls back to the well-known tile if the value was never validated.
    pub fn server_tile(&self) -> TileId {
        TileId::new(self.server_tile).unwrap_or(NAME_SERVER_TILE)
    }

    /// Registry inbox address.
    pub fn server_addr(&self) -> MailboxAddr {
        MailboxAddr::new(self.server_tile(), self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn defaults_match_well_known_addresses() {
        let config = NameServiceConfig::default();
        assert_eq!(config.server_addr(), MailboxAddr::new(TileId::IO0, 2));
        assert_eq!(config.ack, AckMode::Reply);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = NameServiceConfig::parse("ack = \"fire-and-forget\"\n").unwrap();
        assert_eq!(config.ack, AckMode::FireAndForget);
        assert_eq!(config.server_port, NAME_SERVER_PORT);
    }

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "server_tile = 192\nclient_port = 5\nmailbox_depth = 4").unwrap();
        let config = NameServiceConfig::load(file.path()).unwrap();
        assert_eq!(config.server_tile(), TileId::IO1);
        assert_eq!(config.client_port, 5);
        assert_eq!(config.mailbox_depth, 4);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            NameServiceConfig::parse("server_tile = 64"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NameServiceConfig::parse("client_port = 2"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NameServiceConfig::parse("bogus = true"),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            NameServiceConfig::load(Path::new("/nonexistent/names.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
