//! Shared CLI helpers for workspace tools.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

pub fn setup_cli_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))?;

    debug!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunConfig;
    use tempfile::TempDir;

    #[test]
    fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.toml");
        fs::write(&path, "[training]\nepochs = 3\n").unwrap();

        let config: RunConfig = load_toml_config(&path).unwrap();
        assert_eq!(config.training.epochs, 3);
    }

    #[test]
    fn test_load_missing_config() {
        let result: Result<RunConfig> = load_toml_config(Path::new("/nonexistent/run.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_malformed_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.toml");
        fs::write(&path, "[training\nepochs = ").unwrap();

        let result: Result<RunConfig> = load_toml_config(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
