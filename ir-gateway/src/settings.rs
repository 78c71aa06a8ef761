//! Gateway settings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ir_tx::{ChannelConfig, QueueOrder, WorkerConfig, DEFAULT_PIGPIO_PORT};
use ir_wave::{CarrierParams, TimingSequence, WaveError};
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Pulse generator backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// pigpio daemon over TCP
    #[default]
    Pigpio,
    /// In-process simulated device, for running without a Pi
    Simulated,
}

/// Where the pulse generator lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Backend type
    pub kind: DeviceKind,
    /// pigpio daemon host
    pub host: String,
    /// pigpio daemon port
    pub port: u16,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Pigpio,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PIGPIO_PORT,
        }
    }
}

/// Gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// GPIO driving the IR LED
    pub gpio: u32,
    /// Carrier frequency in kHz
    pub frequency_khz: f64,
    /// Fraction of each carrier period the LED is on
    pub duty_cycle: f64,
    /// Log at debug level
    pub verbose: bool,
    /// Pulse generator
    pub device: DeviceSettings,
    /// Order pending requests are played in
    pub queue_order: QueueOrder,
    /// Busy poll interval while a code plays
    pub poll_interval_ms: u64,
    /// Give up on a playback after this long; `null` waits forever
    pub playback_timeout_ms: Option<u64>,
    /// Button name to timing code
    pub buttons: BTreeMap<String, TimingSequence>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            gpio: 17,
            frequency_khz: 38.0,
            duty_cycle: ir_wave::DEFAULT_DUTY_CYCLE,
            verbose: false,
            device: DeviceSettings::default(),
            queue_order: QueueOrder::default(),
            poll_interval_ms: ir_tx::DEFAULT_POLL_INTERVAL_MS,
            playback_timeout_ms: Some(ir_tx::DEFAULT_PLAYBACK_TIMEOUT_MS),
            buttons: roblin_buttons(),
        }
    }
}

/// Codes for the Roblin cooker hood remote
pub fn roblin_buttons() -> BTreeMap<String, TimingSequence> {
    let codes: [(&str, &[u32]); 5] = [
        (
            "light",
            &[762, 689, 762, 689, 1506, 1378, 762, 689, 762, 689, 1506, 2784, 762, 689, 762, 689, 2238],
        ),
        (
            "max",
            &[766, 704, 1494, 1378, 766, 704, 766, 704, 1494, 1378, 766, 2082, 1494, 2082, 1494],
        ),
        (
            "moins",
            &[744, 1403, 1492, 707, 744, 707, 744, 1403, 1492, 707, 744, 2790, 1492, 1403, 1492],
        ),
        (
            "plus",
            &[734, 718, 2247, 718, 734, 718, 734, 718, 2247, 718, 734, 2095, 2247, 1398, 1462],
        ),
        (
            "power",
            &[728, 718, 728, 1420, 1492, 718, 728, 718, 728, 1420, 1492, 2088, 728, 1420, 728, 718, 1492],
        ),
    ];

    codes
        .into_iter()
        .filter_map(|(name, code)| {
            TimingSequence::new(code.to_vec())
                .ok()
                .map(|seq| (name.to_string(), seq))
        })
        .collect()
}

impl Settings {
    /// Get the XDG config directory for irgate
    /// Uses $XDG_CONFIG_HOME/irgate, falls back to ~/.config/irgate
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("irgate"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("irgate"))
    }

    /// Default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location
    ///
    /// A missing file is created with the defaults so it can be edited.
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;

        if !path.exists() {
            let settings = Self::default();
            settings.save_to(&path)?;
            return Ok(settings);
        }

        Self::load_from(&path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save settings to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        std::fs::write(path, json).map_err(io_error)
    }

    /// HTTP listen address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validated carrier parameters
    pub fn carrier(&self) -> Result<CarrierParams, WaveError> {
        CarrierParams::with_duty_cycle(self.gpio, self.frequency_khz, self.duty_cycle)
    }

    /// Hardware channel timing
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            playback_timeout: self.playback_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Everything the transmit worker needs
    pub fn worker_config(&self) -> Result<WorkerConfig, WaveError> {
        let mut config = WorkerConfig::new(self.carrier()?);
        config.channel = self.channel_config();
        config.order = self.queue_order;
        Ok(config)
    }

    /// Default tracing filter covering every workspace crate
    pub fn log_filter(&self) -> String {
        let level = if self.verbose { "debug" } else { "info" };
        ["irgate", "ir_gateway", "ir_wave", "ir_tx", "ir_sim"]
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect::<Vec<_>>()
            .join(",")
    }
}
