// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! User-facing CLI of the `named` binary.
//!
//! Without `--check` the binary boots the registry on an in-process fabric, runs one
//! link/lookup/unlink cycle from a compute tile and shuts it down again.

use std::path::PathBuf;

use names::{ConfigError, NameClient, NameServiceConfig};
use noc_abi::namesvc::FRAME_LEN;
use noc_abi::TileId;
use noc_ipc::{Noc, NocConfig};

use crate::{Daemon, ServerError};

/// Returns the CLI usage string.
pub fn help() -> &'static str {
    "named runs the NoC name service. Usage: named [--help] [--check] [--config <path>]"
}

/// Errors reported by the CLI.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad command line.
    #[error("usage: {0}")]
    Usage(String),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The server failed.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// The self-check client failed.
    #[error("self-check: {0}")]
    Client(#[from] names::Error),
}

/// Parsed command line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// `--help` was given.
    pub help: bool,
    /// `--check`: validate the configuration only.
    pub check: bool,
    /// `--config <path>`.
    pub config: Option<PathBuf>,
}

/// Parses arguments (without the program name).
pub fn parse(args: &[&str]) -> Result<Options, CliError> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match *arg {
            "--help" | "-h" => options.help = true,
            "--check" => options.check = true,
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| CliError::Usage("--config needs a path".into()))?;
                options.config = Some(PathBuf::from(path));
            }
            other => return Err(CliError::Usage(format!("unknown argument {other}"))),
        }
    }
    Ok(options)
}

/// Executes the CLI and returns the text to print.
pub fn try_execute(args: &[&str]) -> Result<String, CliError> {
    let options = parse(args)?;
    if options.help {
        return Ok(help().to_string());
    }
    let config = match &options.config {
        Some(path) => NameServiceConfig::load(path)?,
        None => NameServiceConfig::default(),
    };
    if options.check {
        return Ok(format!(
            "config ok: server {} ack {:?}",
            config.server_addr(),
            config.ack
        ));
    }
    self_check(config)
}

/// Executes the CLI using provided arguments; errors are rendered as text.
pub fn execute(args: &[&str]) -> String {
    match try_execute(args) {
        Ok(out) => out,
        Err(err) => format!("named: {err}"),
    }
}

/// Parses `std::env::args`, prints the result and exits non-zero on failure.
pub fn run() {
    let owned: Vec<String> = std::env::args().skip(1).collect();
    let refs: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
    match try_execute(&refs) {
        Ok(out) => println!("{out}"),
        Err(err) => {
            log::error!("named: {err}");
            eprintln!("named: {err}");
            std::process::exit(1);
        }
    }
}

fn self_check(config: NameServiceConfig) -> Result<String, CliError> {
    let noc = Noc::with_config(NocConfig { msg_size: FRAME_LEN, mailbox_depth: config.mailbox_depth });
    let daemon = Daemon::start(noc.node(config.server_tile()), config.clone())?;

    let tile = TileId::new(0).ok_or_else(|| CliError::Usage("no compute tile".into()))?;
    let client = NameClient::new(noc.node(tile), config).with_process_name("named-check")?;
    client.setup()?;
    client.link(tile, "named-check")?;
    let resolved = client.lookup("named-check")?;
    client.unlink("named-check")?;
    client.shutdown()?;
    client.cleanup()?;

    let registry = daemon.join()?;
    Ok(format!(
        "name service ready: resolved named-check to tile {resolved}, occupancy {}/{}",
        registry.occupancy(),
        registry.capacity()
    ))
}
