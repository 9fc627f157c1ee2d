//! syncctl
//!
//! Operator CLI for the offline sync engine: inspect and drain the queue,
//! resolve conflicts, manage cache preferences and the draft vault.

#![allow(clippy::print_stdout)]

mod commands;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use application::EventNotifier;
use clap::{Parser, Subcommand, ValueEnum};
use domain::{Connectivity, ResolutionChoice, SyncOperation};
use infrastructure::{AppConfig, build_runtime, init_logging};

use crate::commands::Output;

/// Offline sync engine CLI
#[derive(Debug, Parser)]
#[command(name = "syncctl")]
#[command(author, version, about = "Offline sync engine control", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: ./config.toml if present)
    #[arg(short, long, env = "SYNCCTL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Queue, conflict and vault overview
    Status,

    /// Queue a local mutation
    ///
    /// Example: syncctl enqueue create notes --payload '{"title":"hi"}'
    /// Example: syncctl enqueue update notes --id srv-42 --payload '{"title":"hello"}'
    Enqueue {
        /// create, update or delete
        #[arg(value_parser = parse_operation)]
        operation: SyncOperation,

        /// Entity type, e.g. notes
        entity_type: String,

        /// Entity id (required for update and delete)
        #[arg(long)]
        id: Option<String>,

        /// JSON payload
        #[arg(long, default_value = "null")]
        payload: String,
    },

    /// Send due queue items to the remote service
    Drain {
        /// Network to report as connected
        #[arg(long, value_enum, default_value_t = Network::Wifi)]
        network: Network,
    },

    /// Reset failed items to pending
    RetryFailed,

    /// Remove synced items left in the queue
    ClearSynced,

    /// List conflicts
    Conflicts {
        /// Include resolved conflicts
        #[arg(long)]
        all: bool,
    },

    /// Resolve a conflict by keeping one side
    Resolve {
        /// Conflict id
        conflict_id: String,

        /// local or remote
        #[arg(value_parser = parse_choice)]
        choice: ResolutionChoice,
    },

    /// Cache preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsCommand,
    },

    /// Cached entities
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Storage usage, quota and cache figures
    Storage,

    /// Ask for persistent storage
    Persist,

    /// Draft encryption
    Vault {
        #[command(subcommand)]
        action: VaultCommand,
    },

    /// Drafts
    Drafts {
        /// Vault passphrase, needed while encryption is enabled
        #[arg(long, env = "SYNCCTL_PASSPHRASE", hide_env_values = true, global = true)]
        passphrase: Option<String>,

        #[command(subcommand)]
        action: DraftsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum PrefsCommand {
    /// Show current preferences
    Show,

    /// Change the cache ceiling or the WiFi-only flag
    Set {
        /// Cache ceiling in megabytes
        #[arg(long)]
        max_cache_mb: Option<u64>,

        /// Only sync over WiFi (true/false)
        #[arg(long)]
        wifi_only: Option<bool>,
    },

    /// Turn caching on or off for an entity type
    Toggle {
        /// Entity type
        entity_type: String,

        /// true to cache, false to stop caching and drop cached entities
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// List cached entities
    List {
        /// Only this entity type
        #[arg(long = "type")]
        entity_type: Option<String>,
    },

    /// Drop every cached entity
    Clear,
}

#[derive(Debug, Subcommand)]
enum VaultCommand {
    /// Show whether encryption is enabled
    Status,

    /// Turn on draft encryption
    Enable {
        /// New passphrase
        #[arg(long, env = "SYNCCTL_PASSPHRASE", hide_env_values = true)]
        passphrase: String,

        /// Passphrase confirmation (defaults to the passphrase)
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Encrypt every plaintext draft
    EncryptAll {
        /// Vault passphrase
        #[arg(long, env = "SYNCCTL_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },

    /// Decrypt every encrypted draft
    DecryptAll {
        /// Vault passphrase
        #[arg(long, env = "SYNCCTL_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },

    /// Stop encrypting new drafts
    Disable,
}

#[derive(Debug, Subcommand)]
enum DraftsCommand {
    /// Create or overwrite a draft
    Save {
        /// Label shown in listings
        label: String,

        /// Draft text
        text: String,

        /// Existing draft to overwrite
        #[arg(long)]
        id: Option<String>,
    },

    /// Print a draft's text
    Show {
        /// Draft id
        id: String,
    },

    /// List drafts
    List,

    /// Delete a draft
    Delete {
        /// Draft id
        id: String,
    },
}

/// Networks the operator can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Network {
    Wifi,
    Cellular,
}

impl From<Network> for Connectivity {
    fn from(network: Network) -> Self {
        match network {
            Network::Wifi => Self::Wifi,
            Network::Cellular => Self::Cellular,
        }
    }
}

fn parse_operation(value: &str) -> Result<SyncOperation, String> {
    value.parse()
}

fn parse_choice(value: &str) -> Result<ResolutionChoice, String> {
    value.parse()
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };
    config.logging.filter = log_filter_from_verbosity(cli.verbose).to_string();
    init_logging(&config.logging)?;

    let runtime = build_runtime(&config, Arc::new(EventNotifier::new())).await?;
    let recovered = runtime.engine.start().await?;
    if recovered > 0 {
        tracing::warn!(recovered, "Returned abandoned items to the queue");
    }

    let out = Output::new(cli.json);
    let result = commands::run(&runtime.engine, cli.command, &out).await;
    runtime.shutdown().await;
    result
}
