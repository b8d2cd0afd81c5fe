// config.rs - TOML run configuration, overridden from the command line

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use conway::Params;
use conway_distributor::ClientConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub params: ParamsConfig,
    pub workers: WorkersConfig,
    pub io: IoConfig,
    pub client: ClientSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParamsConfig {
    pub turns: u32,
    pub threads: usize,
    pub image_width: usize,
    pub image_height: usize,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            turns: 100,
            threads: 8,
            image_width: 16,
            image_height: 16,
        }
    }
}

/// In-process workers, or the addresses of remote ones. Remote wins when both are given.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub local: usize,
    pub remote: Vec<String>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            local: 4,
            remote: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("images"),
            output: PathBuf::from("out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub ticker_ms: u64,
    pub final_turn_timeout_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            ticker_ms: 2000,
            final_turn_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Reads `path`, or returns the defaults when no file was given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn params(&self) -> Params {
        Params {
            turns: self.params.turns,
            threads: self.params.threads,
            image_width: self.params.image_width,
            image_height: self.params.image_height,
        }
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            ticker_period: Duration::from_millis(self.client.ticker_ms),
            final_turn_timeout: Duration::from_millis(self.client.final_turn_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.params(),
            Params {
                turns: 100,
                threads: 8,
                image_width: 16,
                image_height: 16
            }
        );
        assert_eq!(config.client().ticker_period, Duration::from_secs(2));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [params]
            turns = 10
            image_width = 64
            image_height = 64

            [workers]
            remote = ["10.0.0.1:8030", "10.0.0.2:8030"]
            "#,
        )
        .unwrap();
        assert_eq!(config.params.turns, 10);
        assert_eq!(config.params.threads, 8);
        assert_eq!(config.params().input_name(), "64x64");
        assert_eq!(config.workers.remote.len(), 2);
        assert_eq!(config.workers.local, 4);
        assert_eq!(config.io, IoConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nticker_ms = 250").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.client().ticker_period, Duration::from_millis(250));

        assert_eq!(Config::load(None).unwrap(), Config::default());
        assert!(Config::load(Some(Path::new("/nonexistent/conway.toml"))).is_err());
    }

    #[test]
    fn test_unknown_types_are_rejected() {
        assert!(toml::from_str::<Config>("[params]\nturns = \"many\"").is_err());
    }
}
