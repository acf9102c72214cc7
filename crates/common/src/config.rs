use crate::error::ConfigurationError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: General,
    pub subgraph: Subgraph,
    pub input: Input,
    pub scoring: Scoring,
    pub database: Database,
    pub observability: Observability,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct General {
    pub log_level: String,
    /// `json` or `pretty`.
    pub log_format: String,
}

impl Default for General {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Subgraph {
    pub url: String,
    /// Name of the environment variable holding the gateway API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_concurrent_requests: usize,
}

impl Default for Subgraph {
    fn default() -> Self {
        Self {
            url: "https://gateway.thegraph.com/api/subgraphs/id/4TbqVA8p2DoBd5qDbPMwmDZv3CsJjWtxo8nVSqF2tA9a"
                .to_string(),
            api_key_env: "Compound_V2_API".to_string(),
            timeout_secs: 60,
            max_concurrent_requests: 1,
        }
    }
}

impl Subgraph {
    /// Read the API key named by `api_key_env`. Call once at startup and hand the
    /// value to the client constructor.
    pub fn api_key_from_env(&self) -> Result<String, ConfigurationError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigurationError::MissingCredential {
                env_var: self.api_key_env.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Input {
    pub wallet_column: String,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            wallet_column: "wallet_id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Scoring {
    pub model_path: String,
}

impl Default for Scoring {
    fn default() -> Self {
        Self {
            model_path: "model/random_forest_model.json".to_string(),
        }
    }
}

/// Optional SQLite archive of raw subgraph responses and extracted features.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Database {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Observability {
    pub prometheus_port: Option<u16>,
}

impl Config {
    /// Load `path`. The default path may be absent, in which case built-in defaults apply.
    pub fn load(path: &str) -> Result<Self> {
        if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.subgraph.url.trim().is_empty(),
            "subgraph.url must not be empty"
        );
        anyhow::ensure!(
            self.subgraph.timeout_secs > 0,
            "subgraph.timeout_secs must be > 0"
        );
        anyhow::ensure!(
            self.subgraph.max_concurrent_requests >= 1,
            "subgraph.max_concurrent_requests must be >= 1"
        );
        anyhow::ensure!(
            !self.input.wallet_column.trim().is_empty(),
            "input.wallet_column must not be empty"
        );
        anyhow::ensure!(
            matches!(self.general.log_format.as_str(), "json" | "pretty"),
            "general.log_format must be \"json\" or \"pretty\""
        );
        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
