// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! BMC connection details and control-loop tuning live in TOML.
//! Default path: `/etc/ipmi-fanctl/config.toml`

use crate::curve::EasingCurve;
use crate::error::{FanctlError, Result};
use crate::window::DEFAULT_SAMPLE_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ipmi-fanctl/config.toml";

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub ipmi: IpmiConfig,

    #[serde(default)]
    pub control: ControlConfig,
}

/// Identity of this controller and where its state lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Logical controller name; the state file is named after it.
    /// Falls back to the IPMI host.
    #[serde(default)]
    pub name: Option<String>,

    /// Directory holding the state file. Falls back to `$TMP` or `/tmp`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

/// How to reach the BMC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpmiConfig {
    /// BMC address. `None` talks to the local BMC.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// ipmitool interface used for remote hosts.
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Path or name of the ipmitool binary.
    #[serde(default = "default_tool")]
    pub tool: String,
}

impl Default for IpmiConfig {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            password: None,
            interface: default_interface(),
            tool: default_tool(),
        }
    }
}

/// Control-loop tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Samples averaged before the fans are driven.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Fans get 0% at or below this temperature (C).
    #[serde(default = "default_ideal_temp")]
    pub ideal_temp: f64,

    /// Fans get `max_duty_cycle` at or above this temperature (C).
    #[serde(default = "default_max_temp")]
    pub max_temp: f64,

    #[serde(default = "default_max_duty_cycle")]
    pub max_duty_cycle: u8,

    /// `linear` or `parabolic`.
    #[serde(default = "default_easing")]
    pub easing: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Compute and log the duty cycle without sending it.
    #[serde(default)]
    pub dry_run: bool,

    /// Stop after this many polls; 0 runs until interrupted.
    #[serde(default)]
    pub max_iterations: u64,

    /// Hand fan control back to the BMC on shutdown.
    #[serde(default = "default_true")]
    pub restore_on_exit: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            ideal_temp: default_ideal_temp(),
            max_temp: default_max_temp(),
            max_duty_cycle: default_max_duty_cycle(),
            easing: default_easing(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            dry_run: false,
            max_iterations: 0,
            restore_on_exit: true,
        }
    }
}

impl ControlConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reject loop settings the controller cannot run with. Curve
    /// parameters are checked when the curve is built.
    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(FanctlError::Configuration(
                "sample_size must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(FanctlError::Configuration(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Logical identity of this controller.
    pub fn identity(&self) -> String {
        self.controller
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.ipmi.host.clone())
            .unwrap_or_else(|| "local".to_string())
    }

    pub fn state_dir(&self) -> PathBuf {
        self.controller
            .state_dir
            .clone()
            .unwrap_or_else(default_state_dir)
    }
}

// ---------------------------------------------------------------------------
// Load / Save
// ---------------------------------------------------------------------------

/// Load config from a TOML file, or return the default if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| FanctlError::io(path, e))?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        FanctlError::Configuration(format!("Failed to parse {}: {e}", path.display()))
    })?;

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Save config to a TOML file, creating parent directories if needed.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FanctlError::io(parent, e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(|e| {
        FanctlError::Configuration(format!("Failed to serialize config: {e}"))
    })?;

    fs::write(path, contents).map_err(|e| FanctlError::io(path, e))?;
    log::info!("Saved config to {}", path.display());
    Ok(())
}

/// Resolve the config file path from CLI arg or default.
pub fn resolve_config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_state_dir() -> PathBuf {
    std::env::var_os("TMP")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

fn default_interface() -> String {
    "lanplus".to_string()
}

fn default_tool() -> String {
    "ipmitool".to_string()
}

fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}

fn default_ideal_temp() -> f64 {
    40.0
}

fn default_max_temp() -> f64 {
    75.0
}

fn default_max_duty_cycle() -> u8 {
    100
}

fn default_easing() -> String {
    EasingCurve::default().to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}
