//! CLI definitions for PulseGuard.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// PulseGuard CLI.
#[derive(Parser)]
#[command(name = "pulseguard")]
#[command(about = "Liveness monitor and offline notifier for chat-bot sessions")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "PULSEGUARD_CONFIG",
        default_value = "pulseguard.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Monitor in the foreground, reading inbound events from stdin (default)
    Run,

    /// Echo a bot's log stream from stdin to stderr and record heartbeat failures
    /// and forced logouts
    Tap {
        /// Evidence file (default: evidence.path from the config)
        #[arg(long)]
        evidence: Option<PathBuf>,
    },

    /// Load and validate the configuration
    Check,

    /// Send one test notification
    NotifyTest {
        /// Entity to name in the message (default: primary or first configured)
        entity: Option<String>,
    },
}
