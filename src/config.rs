//! Configuration loading and persistence.
//!
//! Settings live in `config.json` under the platform config directory and
//! can be overridden per run through `DRAWLINK_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::brush::Brush;
use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_FLUSH_THRESHOLD, DEFAULT_LINE_MAX_LEN,
    DEFAULT_MAX_CANVAS_BYTES, DEFAULT_MAX_REFRESH_BYTES, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
    DEFAULT_TICK_INTERVAL,
};

const CONFIG_FILE: &str = "config.json";

/// Client configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Canvas server host name or address.
    pub server_host: String,
    /// Canvas server TCP port.
    pub server_port: u16,
    /// Points per outgoing batch.
    pub flush_threshold: usize,
    /// Largest compressed snapshot accepted, in bytes.
    pub max_refresh_bytes: usize,
    /// Largest decoded canvas accepted from a handshake, in bytes.
    pub max_canvas_bytes: usize,
    /// Longest header line accepted, terminator included.
    pub line_max_len: usize,
    /// Milliseconds between session ticks in `watch`.
    pub tick_interval_ms: u64,
    /// Per-address connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Brush used by `draw` when no flag overrides it.
    pub brush: Brush,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_refresh_bytes: DEFAULT_MAX_REFRESH_BYTES,
            max_canvas_bytes: DEFAULT_MAX_CANVAS_BYTES,
            line_max_len: DEFAULT_LINE_MAX_LEN,
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            brush: Brush::default(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `DRAWLINK_CONFIG_DIR` wins over the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = match std::env::var("DRAWLINK_CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::config_dir()
                .context("Could not determine config directory")?
                .join("drawlink"),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir()?;
        let mut config = match Self::load_from(&dir) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config: {e:#}");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read `config.json` from `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Persists the configuration to the config directory.
    pub fn save(&self) -> Result<PathBuf> {
        self.save_to(&Self::config_dir()?)
    }

    /// Write `config.json` into `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Apply `DRAWLINK_*` overrides. Values that do not parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DRAWLINK_SERVER_HOST") {
            self.server_host = host;
        }

        if let Some(port) = lookup("DRAWLINK_SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server_port = port,
                Err(_) => log::warn!("Ignoring DRAWLINK_SERVER_PORT={port}"),
            }
        }

        if let Some(threshold) = lookup("DRAWLINK_FLUSH_THRESHOLD") {
            match threshold.parse::<usize>() {
                Ok(threshold) => self.flush_threshold = threshold,
                Err(_) => log::warn!("Ignoring DRAWLINK_FLUSH_THRESHOLD={threshold}"),
            }
        }
    }

    /// Interval between session ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Connect timeout per resolved address.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }
}
