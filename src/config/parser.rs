use super::Config;
use anyhow::{Context, Result};
use std::path::Path;

/// Read, parse and validate a config file
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, or holds
/// out-of-range values
pub fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
}

/// Parse and validate config text
///
/// # Errors
///
/// Returns an error if the text is not valid TOML or holds out-of-range values
pub fn parse_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse TOML config")?;

    // Validate and return validation errors directly without wrapping
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if !(1..=22).contains(&config.core.compression_level) {
        anyhow::bail!("core.compression_level must be between 1 and 22");
    }

    if config.performance.parallel_threads == 0 {
        anyhow::bail!("performance.parallel_threads must be at least 1");
    }

    if config.core.store_path.as_os_str().is_empty() {
        anyhow::bail!("core.store_path cannot be empty");
    }

    Ok(())
}
