//! Configuration
//!
//! Layered, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. `esohost.toml` in the working directory, or the file named by
//!    `--config` / `ESOHOST_CONFIG_PATH` (which must then exist)
//! 3. `ESOHOST_<SECTION>__<KEY>` environment variables, e.g.
//!    `ESOHOST_HOST__STEP_LIMIT=100000`
//!
//! A `.env` file is read into the environment first.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::types::LangOptions;

pub const CONFIG_PATH_VAR: &str = "ESOHOST_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "esohost";
const DEFAULT_LOG_FILTER: &str = "esohost_core=info";
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive; `RUST_LOG` wins when set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Language selected at start-up, before any command arrives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Instruction allowance for a single run; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_limit: Option<u64>,

    /// Bound of the command and event channels of a spawned host
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Options for the start-up language
    #[serde(default)]
    pub options: LangOptions,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            language: None,
            step_limit: None,
            channel_capacity: default_channel_capacity(),
            options: LangOptions::default(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load using the process environment only.
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }

    fn validate(&self) -> Result<()> {
        if self.host.channel_capacity == 0 {
            bail!("host.channel_capacity must be at least 1");
        }
        if self.host.step_limit == Some(0) {
            bail!("host.step_limit must be at least 1 when set");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    skip_dotenv: bool,
}

impl ConfigBuilder {
    /// Read this file instead of searching for `esohost.toml`.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Do not read `.env`.
    pub fn skip_dotenv(mut self) -> Self {
        self.skip_dotenv = true;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_dotenv {
            dotenvy::dotenv().ok();
        }

        let path = self
            .config_path
            .or_else(|| env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from));

        let mut builder = config::Config::builder()
            .set_default("log.filter", DEFAULT_LOG_FILTER)?
            .set_default("host.channel_capacity", DEFAULT_CHANNEL_CAPACITY as i64)?;

        builder = match &path {
            Some(path) => builder.add_source(file_source(path)?),
            None => builder
                .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        builder = builder.add_source(
            config::Environment::with_prefix("ESOHOST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }
}

fn file_source(path: &Path) -> Result<config::File<config::FileSourceFile, config::FileFormat>> {
    if !path.exists() {
        bail!("Config file not found: {}", path.display());
    }
    Ok(config::File::from(path).required(true))
}
