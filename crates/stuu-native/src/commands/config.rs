//! Configuration commands.

use crate::config::NativeConfig;
use crate::error::{EngineError, EngineResult};

/// Dump the file configuration to stdout.
pub fn dump(config: &NativeConfig) -> EngineResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| EngineError::config(format!("failed to serialize config: {}", e)))?;
    println!("# native.toml ({})", NativeConfig::default_path().display());
    println!("{}", toml_str);
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> EngineResult<()> {
    println!("config: {}", NativeConfig::default_path().display());
    Ok(())
}
