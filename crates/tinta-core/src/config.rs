// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TintaError};
use crate::types::PrinterProfile;

/// Persistent application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target printer class (resolution, width, characters per line).
    pub profile: PrinterProfile,
    /// Whole-job retry policy for transient link failures.
    pub retry: RetryConfig,
    /// Per-attempt timeouts on the serial channel.
    pub timeouts: TimeoutConfig,
    /// ESC/POS encoder options.
    pub encoder: EncoderOptions,
    /// Serial devices already bound to printer addresses (RFCOMM bridge).
    pub devices: Vec<DeviceBinding>,
}

impl AppConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(TintaError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.profile.dpi == 0 || self.profile.width_mm <= 0.0 {
            return Err(TintaError::Config(
                "profile.dpi and profile.width_mm must be positive".into(),
            ));
        }
        if self.encoder.band_height == 0 {
            return Err(TintaError::Config("encoder.band_height must be at least 1".into()));
        }
        Ok(())
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per job, including the first.
    pub max_attempts: u32,
    /// Backoff unit; the wait before attempt `n + 1` is `n * base_delay`.
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

/// Per-attempt timeouts. Zero disables the timeout for that step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub open_ms: u64,
    pub write_ms: u64,
    pub close_ms: u64,
}

impl TimeoutConfig {
    pub fn open(&self) -> Option<Duration> {
        non_zero(self.open_ms)
    }

    pub fn write(&self) -> Option<Duration> {
        non_zero(self.write_ms)
    }

    pub fn close(&self) -> Option<Duration> {
        non_zero(self.close_ms)
    }
}

fn non_zero(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            open_ms: 10_000,
            write_ms: 30_000,
            close_ms: 2_000,
        }
    }
}

/// ESC/POS encoder options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderOptions {
    /// Send `ESC @` before each job.
    pub reset_on_start: bool,
    /// Character code table selected with `ESC t` (16 = Windows-1252).
    pub code_table: u8,
    /// Blank lines fed after the body. Values below 2 are raised to 2.
    pub feed_lines: u8,
    /// Append a paper cut after the trailing feed.
    pub cut: bool,
    /// Luma below this value prints as ink.
    pub threshold: u8,
    /// Maximum rows per raster command.
    pub band_height: u16,
    /// Hard-wrap text lines at the profile's characters per line.
    pub wrap_text: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            reset_on_start: true,
            code_table: 16,
            feed_lines: 3,
            cut: true,
            threshold: 128,
            band_height: 256,
            wrap_text: false,
        }
    }
}

/// A printer address bound to a local serial device node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    pub path: PathBuf,
}
