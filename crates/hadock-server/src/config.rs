// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Listener configuration.

use hadock::ReaderMode;
use hadock_notify::{AcceptRules, LogNotifier, Notifier, Pool, UdpNotifier};
use hadock_storage::{MultiStore, Options, StoreError};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value: {0}")]
    Invalid(String),
}

/// Decoded `listen` configuration (JSON).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listen address.
    pub address: String,
    /// Depth of the pipeline channels.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// Transport encoding: `binary`, `gzip` or `binary+gzip`.
    #[serde(default)]
    pub mode: String,
    /// Instance allow-list; empty accepts everything.
    #[serde(default)]
    pub instances: Vec<u8>,
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Metrics listen address.
    #[serde(default)]
    pub monitor: Option<String>,
    #[serde(default)]
    pub storage: Vec<Options>,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    /// Upstream peer; empty disables the tee.
    #[serde(default)]
    pub address: String,
    /// Gzip level: `no`, `speed`, `best`, `default` or empty for none.
    #[serde(default)]
    pub level: String,
    /// Connection pool capacity.
    #[serde(default)]
    pub size: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolConfig {
    /// Tick interval in seconds; zero disables notifications.
    #[serde(default)]
    pub interval: u64,
    /// Maximum record age in seconds at enqueue; zero disables the gate.
    #[serde(default)]
    pub age: u64,
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// `udp` or `logger`.
    #[serde(rename = "type")]
    pub scheme: String,
    #[serde(default)]
    pub location: String,
    /// `realtime`, `playback` or empty for both.
    #[serde(default)]
    pub source: String,
    #[serde(default = "default_instance")]
    pub instance: i32,
    #[serde(default)]
    pub channels: Vec<i32>,
}

fn default_buffer() -> usize {
    64
}

fn default_instance() -> i32 {
    -1
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::Invalid("address cannot be empty".into()));
        }
        self.reader_mode()?;
        if self.storage.is_empty() {
            return Err(ConfigError::Invalid("no storage defined".into()));
        }
        Ok(())
    }

    pub fn reader_mode(&self) -> Result<ReaderMode, ConfigError> {
        self.mode
            .parse()
            .map_err(|e: hadock::frame::UnknownMode| ConfigError::Invalid(e.to_string()))
    }

    /// Open every configured sink. Any initialization failure aborts.
    pub fn build_storage(&self) -> Result<MultiStore, StoreError> {
        let sinks = self
            .storage
            .iter()
            .map(hadock_storage::open)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MultiStore::new(sinks))
    }

    pub fn build_pool(&self) -> io::Result<Pool> {
        let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
        for n in &self.pool.notifiers {
            let rules = AcceptRules {
                source: n.source.clone(),
                instance: n.instance,
                channels: n.channels.clone(),
            };
            match n.scheme.as_str() {
                "udp" => notifiers.push(Box::new(UdpNotifier::dial(&n.location, rules)?)),
                "logger" => {
                    let out: Box<dyn io::Write + Send> = match n.location.as_str() {
                        "" => Box::new(io::stdout()),
                        "/dev/null" => Box::new(io::sink()),
                        path => Box::new(fs::File::create(path)?),
                    };
                    notifiers.push(Box::new(LogNotifier::new(out, rules)));
                }
                other => {
                    tracing::warn!("{}: unrecognized notifier type, skipping", other);
                }
            }
        }
        Pool::new(
            notifiers,
            Duration::from_secs(self.pool.age),
            Duration::from_secs(self.pool.interval),
        )
    }
}
