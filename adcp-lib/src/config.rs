//! Acquisition configuration, loadable from JSON.
//!
//! ```json
//! {
//!   "sources": [
//!     {
//!       "name": "kn0101",
//!       "channel": "adcp",
//!       "endpoint": {"type": "tcp", "host": "192.168.100.136", "port": 2101}
//!     }
//!   ]
//! }
//! ```
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::framing::{ModularSum, SyncConfig};
use crate::prelude::*;

/// Where an acquisition loop reads bytes from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    /// A captured stream. Read once to the end.
    File { path: PathBuf },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Endpoint::File { path } => write!(f, "file://{}", path.display()),
        }
    }
}

fn default_channel() -> String {
    SourceConfig::DEFAULT_CHANNEL.to_string()
}

fn default_buffer_size() -> usize {
    SourceConfig::DEFAULT_BUFFER_SIZE
}

fn default_max_frame_len() -> usize {
    SyncConfig::DEFAULT_MAX_FRAME_LEN
}

fn default_retry_delay_secs() -> u64 {
    SourceConfig::DEFAULT_RETRY_DELAY_SECS
}

fn default_read_timeout_ms() -> u64 {
    SourceConfig::DEFAULT_READ_TIMEOUT_MS
}

/// Configuration for a single instrument connection.
#[derive(Serialize, Deserialize, TypedBuilder, Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    #[builder(setter(into))]
    pub name: String,
    /// Sink channel records are pushed to.
    #[serde(default = "default_channel")]
    #[builder(default = default_channel(), setter(into))]
    pub channel: String,
    pub endpoint: Endpoint,
    /// Bytes requested per read.
    #[serde(default = "default_buffer_size")]
    #[builder(default = default_buffer_size())]
    pub buffer_size: usize,
    #[serde(default = "default_max_frame_len")]
    #[builder(default = default_max_frame_len())]
    pub max_frame_len: usize,
    /// Delay before reconnecting after a failure.
    #[serde(default = "default_retry_delay_secs")]
    #[builder(default = default_retry_delay_secs())]
    pub retry_delay_secs: u64,
    /// Socket read timeout, used only so a blocked read notices shutdown.
    #[serde(default = "default_read_timeout_ms")]
    #[builder(default = default_read_timeout_ms())]
    pub read_timeout_ms: u64,
}

impl SourceConfig {
    pub const DEFAULT_CHANNEL: &'static str = "ensembles";
    pub const DEFAULT_BUFFER_SIZE: usize = 8192;
    pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Synchronizer configuration for PD0 ensembles bounded by `max_frame_len`.
    #[must_use]
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::builder()
            .max_frame_len(self.max_frame_len)
            .checksum(Arc::new(ModularSum::PD0))
            .build()
    }

    /// # Errors
    /// [Error::Config] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("source name is empty".to_string()));
        }
        if self.channel.is_empty() {
            return Err(Error::Config(format!("{}: channel is empty", self.name)));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config(format!("{}: buffer_size must be > 0", self.name)));
        }
        if self.max_frame_len < 64 {
            return Err(Error::Config(format!(
                "{}: max_frame_len {} is too small to hold an ensemble",
                self.name, self.max_frame_len
            )));
        }
        if self.read_timeout_ms == 0 {
            return Err(Error::Config(format!(
                "{}: read_timeout_ms must be > 0",
                self.name
            )));
        }
        if let Endpoint::Tcp { host, .. } = &self.endpoint {
            if host.is_empty() {
                return Err(Error::Config(format!("{}: host is empty", self.name)));
            }
        }
        self.sync_config()
            .validate()
            .map_err(|err| Error::Config(format!("{}: {err}", self.name)))
    }
}

/// Top level configuration: one entry per instrument connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct GatewayConfig {
    pub sources: Vec<SourceConfig>,
}

impl GatewayConfig {
    /// Parse and validate JSON configuration.
    ///
    /// # Errors
    /// [Error::Json] if the JSON is malformed or [Error::Config] if it is invalid.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let config: GatewayConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// [Error::Io] if the file cannot be opened, otherwise as [GatewayConfig::from_reader].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// # Errors
    /// [Error::Config] if there are no sources, names are not unique, or a source is
    /// invalid.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::Config("no sources configured".to_string()));
        }
        for (idx, source) in self.sources.iter().enumerate() {
            source.validate()?;
            if self.sources[..idx].iter().any(|s| s.name == source.name) {
                return Err(Error::Config(format!(
                    "duplicate source name {}",
                    source.name
                )));
            }
        }
        Ok(())
    }
}
