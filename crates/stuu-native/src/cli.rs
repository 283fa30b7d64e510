//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// stuu-native - audio engine control socket
#[derive(Debug, Parser)]
#[command(name = "stuu-native")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "STUU_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log layout: pretty, compact or json
    #[arg(long, env = "STUU_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Path to the engine socket
    #[arg(long, env = "STUU_NATIVE_SOCKET")]
    pub socket: Option<PathBuf>,

    // Kept as text so a bad value falls back instead of aborting startup.
    /// Audio sample rate in Hz
    #[arg(long, env = "STUU_SAMPLE_RATE")]
    pub sample_rate: Option<String>,

    /// Audio buffer size in frames
    #[arg(long, env = "STUU_BUFFER_SIZE")]
    pub buffer_size: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the engine socket in the foreground (default)
    Serve,

    /// Send one request to a running engine and print the response
    Request {
        /// Command name, e.g. transport.get_state
        cmd: String,

        /// Request payload as a JSON object
        #[arg(long)]
        payload: Option<String>,

        /// Request id
        #[arg(long, default_value_t = 1)]
        id: i64,

        /// Seconds to wait for the response
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective file configuration
    Dump,

    /// Show configuration file path
    Path,
}
