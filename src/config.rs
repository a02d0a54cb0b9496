//! Configuration management for tbar-web
//!
//! Handles loading, validating and atomically persisting the YAML settings
//! file. The HTTP surface only ever touches `enabled` and `port`; the rest
//! picks the host mixer backend and tunes the host task queue.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Port used when none is configured or the configured one is out of range
pub const DEFAULT_PORT: u16 = 4455;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub mixer: MixerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs: Option<ObsConfig>,
    /// Maximum number of T-bar updates waiting for the host context
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Host mixer backend selection
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MixerKind {
    /// OBS Studio through obs-websocket
    Obs,
    /// In-process simulated mixer that logs every operation
    #[default]
    Console,
}

/// OBS WebSocket configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ObsConfig {
    #[serde(default = "default_obs_host")]
    pub host: String,
    #[serde(default = "default_obs_port")]
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Manual transition length when OBS reports none for the current
    /// transition (fixed-length transitions such as cuts)
    #[serde(default = "default_transition_duration_ms")]
    pub transition_duration_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_PORT,
            mixer: MixerKind::default(),
            obs: None,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: default_obs_host(),
            port: default_obs_port(),
            password: None,
            transition_duration_ms: default_transition_duration_ms(),
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from YAML text and normalize out-of-range values
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let mut config: ServiceConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.normalize();
        Ok(config)
    }

    /// Replace values the service cannot run with by their defaults
    pub fn normalize(&mut self) {
        if self.port == 0 {
            warn!("Configured port 0 is invalid, using {}", DEFAULT_PORT);
            self.port = DEFAULT_PORT;
        }
        if self.queue_capacity == 0 {
            self.queue_capacity = default_queue_capacity();
        }
    }

    /// OBS settings, falling back to defaults when the section is missing
    pub fn obs_or_default(&self) -> ObsConfig {
        self.obs.clone().unwrap_or_default()
    }
}

/// Validate a port received over the wire (`1..=65535`)
pub fn valid_port(value: i64) -> Option<u16> {
    if (1..=i64::from(u16::MAX)).contains(&value) {
        u16::try_from(value).ok()
    } else {
        None
    }
}

/// Settings file on disk
///
/// Saves go through a temporary file and keep the previous version as
/// `<file>.bak`, so a crash mid-write never leaves a truncated config.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, never failing
    ///
    /// A missing file yields defaults. An unreadable or invalid file is
    /// logged and also yields defaults so the service still comes up.
    pub fn load(&self) -> ServiceConfig {
        if !self.path.exists() {
            info!(
                "No config at {}, using defaults (enabled, port {})",
                self.path.display(),
                DEFAULT_PORT
            );
            return ServiceConfig::default();
        }

        match self.read() {
            Ok(config) => {
                debug!("Loaded config from {}", self.path.display());
                config
            }
            Err(e) => {
                warn!("{:#}; using defaults", e);
                ServiceConfig::default()
            }
        }
    }

    fn read(&self) -> Result<ServiceConfig> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config file: {}", self.path.display()))?;
        ServiceConfig::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", self.path.display()))
    }

    /// Persist the configuration atomically
    pub fn save(&self, config: &ServiceConfig) -> Result<()> {
        let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        let tmp = self.sibling("tmp");
        fs::write(&tmp, yaml)
            .with_context(|| format!("Failed to write config file: {}", tmp.display()))?;

        if self.path.exists() {
            let bak = self.sibling("bak");
            if let Err(e) = fs::copy(&self.path, &bak) {
                warn!("Failed to keep config backup {}: {}", bak.display(), e);
            }
        }

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace config file: {}", self.path.display()))?;

        debug!("Saved config to {}", self.path.display());
        Ok(())
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_obs_host() -> String { "localhost".to_string() }
fn default_obs_port() -> u16 { 4455 }
fn default_transition_duration_ms() -> u64 { 300 }
fn default_queue_capacity() -> usize { 256 }
