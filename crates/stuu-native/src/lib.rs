//! Engine binary support: CLI, file configuration and subcommands.
//!
//! This crate provides the `stuu-native` executable.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use config::NativeConfig;
pub use error::{EngineError, EngineResult};
