//! CLI configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `TESSERA__*` environment variables
//! (e.g. `TESSERA__CHUNKING__BYTE_PATTERN_BITS=13`).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tessera_core::ChunkConfig;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "tessera.toml";

/// Tool configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Chunk boundary and store parameters
    pub chunking: ChunkConfig,
    /// Print machine-readable JSON instead of text
    pub json: bool,
}

impl CliConfig {
    /// Load configuration, reading `path` if given (it must then exist)
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: CliConfig = Config::builder()
            .add_source(Config::try_from(&CliConfig::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("TESSERA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.chunking.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "json = true\n[chunking]\nbyte_pattern_bits = 10").unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();
        assert!(config.json);
        assert_eq!(config.chunking.byte_pattern_bits, 10);
        assert_eq!(config.chunking.item_window, ChunkConfig::default().item_window);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(CliConfig::load(Some(Path::new("/nonexistent/tessera.toml"))).is_err());
    }

    #[test]
    fn test_invalid_chunking_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[chunking]\nbyte_window = 0").unwrap();

        assert!(CliConfig::load(Some(file.path())).is_err());
    }
}
