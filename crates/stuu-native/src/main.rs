//! stuu-native entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use stuu_core::{LogFormat, TracingConfig, init_tracing};
use stuu_native::cli::{Cli, Command, ConfigAction};
use stuu_native::commands;
use stuu_native::config::NativeConfig;
use stuu_native::error::{EngineError, EngineResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn setup_tracing(cli: &Cli) -> EngineResult<()> {
    let mut config = if cli.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::engine()
    };
    if let Some(ref format) = cli.log_format {
        config = config.with_format(format.parse::<LogFormat>()?);
    }
    init_tracing(config)?;
    Ok(())
}

async fn run(cli: Cli) -> EngineResult<()> {
    let config = match cli.config {
        Some(ref path) => NativeConfig::load_from(path)?,
        None => NativeConfig::load()?,
    };

    match cli.command {
        None | Some(Command::Serve) => commands::serve::run(&cli, &config).await,
        Some(Command::Request {
            ref cmd,
            ref payload,
            id,
            timeout,
        }) => {
            let socket_path = config.socket_path(&cli);
            let cmd = cmd.clone();
            let payload = payload.clone();
            tokio::task::spawn_blocking(move || {
                commands::request::run(
                    &socket_path,
                    &cmd,
                    payload.as_deref(),
                    id,
                    Duration::from_secs(timeout),
                )
            })
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
        }
        Some(Command::Config { ref action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
