//! Configuration loading and persistence.
//!
//! Handles reading and writing the knobd configuration file. Defaults
//! match the values the bridge historically had compiled in; a config
//! file and `KNOBD_*` environment variables layer on top, and CLI flags
//! override both (applied in `main`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::Path, path::PathBuf};

use crate::constants::{DEFAULT_BOOTSTRAP_RETRY_DELAY, DEFAULT_POLL_INTERVAL};

/// Configuration for the knobd daemon.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// URL of the UI service (`ws://` or `http://` scheme; http is rewritten).
    pub server_url: String,
    /// I2C bus number the controller is attached to (`/dev/i2c-<n>`).
    pub i2c_bus: u32,
    /// 7-bit I2C address of the controller device.
    pub device_addr: u16,
    /// Interval in milliseconds between bus polls.
    pub poll_interval_ms: u64,
    /// Delay in milliseconds before retrying a failed bootstrap.
    pub bootstrap_retry_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:54545".to_string(),
            i2c_bus: 1,
            device_addr: 0x45,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            bootstrap_retry_ms: DEFAULT_BOOTSTRAP_RETRY_DELAY.as_millis() as u64,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `KNOBD_CONFIG_DIR` overrides the platform config dir (useful for
    /// tests and for running several bridges against different services).
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("KNOBD_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("knobd")
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir()?;
        let mut config = Self::load_from_dir(&dir).unwrap_or_default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from `<dir>/config.json`.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server_url) = std::env::var("KNOBD_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Ok(bus) = std::env::var("KNOBD_I2C_BUS") {
            if let Ok(bus) = bus.parse::<u32>() {
                self.i2c_bus = bus;
            }
        }

        // Device addresses are conventionally written in hex (0x45).
        if let Ok(addr) = std::env::var("KNOBD_DEVICE_ADDR") {
            if let Ok(addr) = parse_device_addr(&addr) {
                self.device_addr = addr;
            }
        }

        if let Ok(poll_interval) = std::env::var("KNOBD_POLL_INTERVAL_MS") {
            if let Ok(interval) = poll_interval.parse::<u64>() {
                self.poll_interval_ms = interval;
            }
        }

        if let Ok(retry) = std::env::var("KNOBD_BOOTSTRAP_RETRY_MS") {
            if let Ok(retry) = retry.parse::<u64>() {
                self.bootstrap_retry_ms = retry;
            }
        }
    }

    /// Persists the current configuration to `<dir>/config.json`.
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        let config_path = dir.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Persists the current configuration to the default config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to_dir(&Self::config_dir()?)
    }

    /// Device node path for the configured bus.
    pub fn bus_path(&self) -> String {
        format!("/dev/i2c-{}", self.i2c_bus)
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bootstrap retry delay as a `Duration`.
    pub fn bootstrap_retry(&self) -> Duration {
        Duration::from_millis(self.bootstrap_retry_ms)
    }
}

/// Parse a device address in decimal or `0x`-prefixed hex form.
pub fn parse_device_addr(value: &str) -> Result<u16> {
    let value = value.trim();
    let addr = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        value.parse::<u16>()
    }
    .with_context(|| format!("invalid device address: {value}"))?;
    Ok(addr)
}
