//! Configuration system for sawp.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SAWP_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/sawp/config.toml
//!   3. ~/.config/sawp/config.toml

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::MAX_CHUNK_SIZE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SawpConfig {
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Fixed retransmission timeout. No backoff is applied.
    pub retransmit_timeout_ms: u64,
    /// Payload bytes per Data packet, at most MAX_CHUNK_SIZE.
    pub chunk_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Local address to bind. Port 0 = OS-assigned.
    pub bind_addr: String,
    /// Stop after this many seconds without any datagram. 0 = never.
    pub idle_timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            retransmit_timeout_ms: 500,
            chunk_size: MAX_CHUNK_SIZE,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            idle_timeout_secs: 0,
        }
    }
}

impl SenderConfig {
    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.retransmit_timeout_ms)
    }
}

impl ReceiverConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("receiver.bind_addr '{}'", self.bind_addr)))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("sawp")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SawpConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            SawpConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file, filling unspecified keys with defaults.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SAWP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply SAWP_* overrides. `lookup` is `std::env::var` outside of tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SAWP_SENDER__RETRANSMIT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.sender.retransmit_timeout_ms = ms;
            }
        }
        if let Some(v) = lookup("SAWP_SENDER__CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.sender.chunk_size = n;
            }
        }
        if let Some(v) = lookup("SAWP_RECEIVER__BIND_ADDR") {
            self.receiver.bind_addr = v;
        }
        if let Some(v) = lookup("SAWP_RECEIVER__IDLE_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.receiver.idle_timeout_secs = secs;
            }
        }
    }

    /// Reject values the protocol cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sender.chunk_size == 0 || self.sender.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "sender.chunk_size {} (must be 1..={MAX_CHUNK_SIZE})",
                self.sender.chunk_size
            )));
        }
        if self.sender.retransmit_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sender.retransmit_timeout_ms must be positive".to_string(),
            ));
        }
        self.receiver.bind_addr()?;
        Ok(())
    }
}
