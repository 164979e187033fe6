use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process;

use bdk::bitcoin::Network;
use clap::{CommandFactory, Parser};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The networks a wallet can be launched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkId {
    Main,
    Test,
    Regtest,
}

impl NetworkId {
    pub const ALL: [NetworkId; 3] = [NetworkId::Main, NetworkId::Test, NetworkId::Regtest];

    pub fn name(self) -> &'static str {
        match self {
            NetworkId::Main => "MAIN",
            NetworkId::Test => "TEST",
            NetworkId::Regtest => "REGTEST",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|network| network.name()).collect()
    }

    /// Case-insensitive lookup; the value is uppercased before matching.
    pub fn from_name(value: &str) -> Option<Self> {
        let normalized = value.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|network| network.name() == normalized)
    }

    pub fn bitcoin_network(self) -> Network {
        match self {
            NetworkId::Main => Network::Bitcoin,
            NetworkId::Test => Network::Testnet,
            NetworkId::Regtest => Network::Regtest,
        }
    }

    pub fn default_electrum_url(self) -> &'static str {
        match self {
            NetworkId::Main => "ssl://electrum.blockstream.info:50002",
            NetworkId::Test => "ssl://electrum.blockstream.info:60002",
            NetworkId::Regtest => "tcp://127.0.0.1:50001",
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LaunchError {
    #[error("Help requested")]
    HelpRequested,
    #[error("Failed to parse command line properties: {0}")]
    Unparsable(String),
    #[error("Network value required")]
    MissingNetwork,
    #[error("Data directory value required")]
    MissingDataDir,
    #[error("Network value {value} invalid. Select one of the following {valid:?}")]
    InvalidNetwork {
        value: String,
        valid: Vec<&'static str>,
    },
    #[error("Data directory value {} invalid. The directory must exist.", .path.display())]
    InvalidDataDir { path: PathBuf },
}

#[derive(Parser, Debug)]
#[command(
    name = "wallet_template",
    about = "Desktop Bitcoin wallet",
    disable_help_flag = true
)]
struct CliArgs {
    /// print this message.
    #[arg(short = 'h', long = "help")]
    help: bool,

    /// required arg; use environment name eg. main, test or regtest.
    #[arg(long = "network", visible_alias = "net", value_name = "Network Type")]
    network: Option<String>,

    /// required arg; state the data directory to be used.
    #[arg(short = 'd', long = "datadir", value_name = "Data Directory")]
    datadir: Option<OsString>,

    /// Electrum server to sync against, defaults to a public server for the network.
    #[arg(long = "electrum", value_name = "URL")]
    electrum: Option<String>,
}

/// Validated startup parameters. Built once in `main` and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchConfig {
    pub network: NetworkId,
    pub data_dir: PathBuf,
    pub electrum_url: Option<String>,
}

impl LaunchConfig {
    /// Validates the arguments (including the program name in first position).
    ///
    /// Checks run in a fixed order and stop at the first failure: help flag,
    /// presence of network then data directory, network membership, then
    /// directory existence.
    pub fn parse<I, T>(args: I) -> Result<Self, LaunchError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let cli = CliArgs::try_parse_from(normalize_args(args)).map_err(|e| {
            let message = e.to_string();
            LaunchError::Unparsable(message.lines().next().unwrap_or_default().to_string())
        })?;

        if cli.help {
            return Err(LaunchError::HelpRequested);
        }

        let network = cli.network.ok_or(LaunchError::MissingNetwork)?;
        let data_dir = cli
            .datadir
            .map(PathBuf::from)
            .ok_or(LaunchError::MissingDataDir)?;

        let network = NetworkId::from_name(&network).ok_or_else(|| LaunchError::InvalidNetwork {
            value: network.to_uppercase(),
            valid: NetworkId::names(),
        })?;

        if !is_existing_dir(&data_dir) {
            return Err(LaunchError::InvalidDataDir { path: data_dir });
        }

        Ok(Self {
            network,
            data_dir,
            electrum_url: cli.electrum,
        })
    }

    /// Prints usage and terminates the process unless `parsed` is a config.
    /// Exit code 0 for an explicit help request, 1 otherwise.
    pub fn exit_on_error(parsed: Result<Self, LaunchError>) -> Self {
        match parsed {
            Ok(config) => {
                info!("Value of the environment argument {}", config.network);
                info!(
                    "Value of the data directory argument {}",
                    config.data_dir.display()
                );
                config
            }
            Err(err) => {
                if err != LaunchError::HelpRequested {
                    warn!("{err}");
                }
                println!("{}", usage());
                process::exit(exit_code(&err));
            }
        }
    }

    pub fn electrum_url(&self) -> &str {
        self.electrum_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_electrum_url())
    }
}

/// Process exit status for a launch that did not produce a config.
pub fn exit_code(err: &LaunchError) -> i32 {
    match err {
        LaunchError::HelpRequested => 0,
        _ => 1,
    }
}

pub fn usage() -> String {
    let mut command = CliArgs::command();
    format!(
        "{}\nValid networks: {}",
        command.render_help(),
        NetworkId::names().join(", ")
    )
}

// clap only knows single-character short flags, so `-net` becomes `--network`.
fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg: OsString| {
            let rewritten = match arg.to_str() {
                Some("-net") => Some(OsString::from("--network")),
                Some(s) => s
                    .strip_prefix("-net=")
                    .map(|value| OsString::from(format!("--network={value}"))),
                None => None,
            };
            rewritten.unwrap_or(arg)
        })
        .collect()
}

fn is_existing_dir(path: &Path) -> bool {
    path.exists() && path.is_dir()
}
