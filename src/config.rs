//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values take the defaults
//! below. The keypad, joystick and link sections are converted into the
//! parameter structs the core components take, so nothing in the core reads
//! global settings.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{RcLinkError, Result};
use crate::joystick::{MAX_DEADZONE, MAX_EXPO};
use crate::keypad::KeypadTiming;
use crate::link::protocol::{parse_address, DEFAULT_ADDRESS};
use crate::link::{LinkTiming, RadioConfig};
use crate::ui::StartScreen;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub keypad: KeypadConfig,
    #[serde(default)]
    pub joystick: JoystickConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Keypad timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct KeypadConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,

    #[serde(default = "default_keypad_adc_samples")]
    pub adc_samples: u8,

    #[serde(default = "default_short_click_ms")]
    pub short_click_ms: u32,

    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u32,

    #[serde(default = "default_repeat_ms")]
    pub repeat_ms: u32,
}

/// Joystick defaults and sampling
#[derive(Debug, Deserialize, Clone)]
pub struct JoystickConfig {
    /// Deadzone written by `force_defaults` and used when no record is stored
    #[serde(default = "default_deadzone")]
    pub deadzone: u16,

    #[serde(default = "default_expo")]
    pub expo: f32,

    #[serde(default = "default_invert_x")]
    pub invert_x: bool,

    #[serde(default)]
    pub invert_y: bool,

    #[serde(default = "default_joystick_adc_samples")]
    pub adc_samples: u8,
}

/// Radio transport selection
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// In-process controller/receiver pair
    #[default]
    Loopback,
    /// Radio bridge on a serial port
    Serial,
}

/// Radio link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default)]
    pub transport: Transport,

    /// Bridge device; empty means auto-detect
    #[serde(default)]
    pub serial_port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_channel")]
    pub channel: u8,

    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default)]
    pub pa_level: u8,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: u8,

    #[serde(default = "default_retry_count")]
    pub retry_count: u8,

    #[serde(default = "default_tx_interval_ms")]
    pub tx_interval_ms: u32,

    #[serde(default = "default_indicator_interval_ms")]
    pub indicator_interval_ms: u32,

    #[serde(default = "default_failsafe_timeout_ms")]
    pub failsafe_timeout_ms: u32,
}

/// Parameter store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// EEPROM image file
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Write default calibration, deadzone, expo and thresholds at boot
    #[serde(default)]
    pub force_defaults: bool,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// UI collaborator configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct UiConfig {
    #[serde(default)]
    pub start_screen: StartScreen,
}

/// Diagnostic log output
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub file_dir: Option<String>,
}

// Default value functions
fn default_debounce_ms() -> u32 { 30 }
fn default_keypad_adc_samples() -> u8 { 8 }
fn default_short_click_ms() -> u32 { 800 }
fn default_long_press_ms() -> u32 { 800 }
fn default_repeat_ms() -> u32 { 300 }

fn default_deadzone() -> u16 { 40 }
fn default_expo() -> f32 { 1.8 }
fn default_invert_x() -> bool { true }
fn default_joystick_adc_samples() -> u8 { 1 }

fn default_baud_rate() -> u32 { 115_200 }
fn default_channel() -> u8 { 76 }
fn default_address() -> String { "RC001".to_string() }
fn default_retry_delay() -> u8 { 3 }
fn default_retry_count() -> u8 { 5 }
fn default_tx_interval_ms() -> u32 { 20 }
fn default_indicator_interval_ms() -> u32 { 10 }
fn default_failsafe_timeout_ms() -> u32 { 120 }

fn default_store_path() -> String { "./rc-link.eeprom".to_string() }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 500 }
fn default_log_format() -> String { "jsonl".to_string() }

/// Supported bridge baud rates
const BAUD_RATES: [u32; 6] = [9600, 57_600, 115_200, 230_400, 460_800, 921_600];

fn invalid(message: impl std::fmt::Display) -> RcLinkError {
    RcLinkError::Config(toml::de::Error::custom(message))
}

impl Default for KeypadConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            adc_samples: default_keypad_adc_samples(),
            short_click_ms: default_short_click_ms(),
            long_press_ms: default_long_press_ms(),
            repeat_ms: default_repeat_ms(),
        }
    }
}

impl KeypadConfig {
    #[must_use]
    pub fn timing(&self) -> KeypadTiming {
        KeypadTiming {
            debounce_ms: self.debounce_ms,
            adc_samples: self.adc_samples,
            short_click_ms: self.short_click_ms,
            long_press_ms: self.long_press_ms,
            repeat_ms: self.repeat_ms,
        }
    }
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            deadzone: default_deadzone(),
            expo: default_expo(),
            invert_x: default_invert_x(),
            invert_y: false,
            adc_samples: default_joystick_adc_samples(),
        }
    }
}

impl JoystickConfig {
    /// Inversion flags as `[x, y]`.
    #[must_use]
    pub fn inversion(&self) -> [bool; 2] {
        [self.invert_x, self.invert_y]
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            serial_port: String::new(),
            baud_rate: default_baud_rate(),
            channel: default_channel(),
            address: default_address(),
            pa_level: 0,
            retry_delay: default_retry_delay(),
            retry_count: default_retry_count(),
            tx_interval_ms: default_tx_interval_ms(),
            indicator_interval_ms: default_indicator_interval_ms(),
            failsafe_timeout_ms: default_failsafe_timeout_ms(),
        }
    }
}

impl LinkConfig {
    /// Radio parameters. The address is validated at load time.
    #[must_use]
    pub fn radio(&self) -> RadioConfig {
        RadioConfig {
            channel: self.channel,
            address: parse_address(&self.address).unwrap_or(DEFAULT_ADDRESS),
            pa_level: self.pa_level,
            retry_delay: self.retry_delay,
            retry_count: self.retry_count,
        }
    }

    #[must_use]
    pub fn timing(&self) -> LinkTiming {
        LinkTiming {
            tx_interval_ms: self.tx_interval_ms,
            indicator_interval_ms: self.indicator_interval_ms,
            failsafe_timeout_ms: self.failsafe_timeout_ms,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            force_defaults: false,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rc_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Keypad
        if self.keypad.debounce_ms == 0 || self.keypad.debounce_ms > 1000 {
            return Err(invalid("debounce_ms must be between 1 and 1000"));
        }

        for (name, value) in [
            ("keypad adc_samples", self.keypad.adc_samples),
            ("joystick adc_samples", self.joystick.adc_samples),
        ] {
            if value == 0 || value > 64 {
                return Err(invalid(format!("{} must be between 1 and 64", name)));
            }
        }

        for (name, value) in [
            ("short_click_ms", self.keypad.short_click_ms),
            ("long_press_ms", self.keypad.long_press_ms),
            ("repeat_ms", self.keypad.repeat_ms),
        ] {
            if value == 0 || value > 10_000 {
                return Err(invalid(format!("{} must be between 1 and 10000", name)));
            }
        }

        // Joystick
        if self.joystick.deadzone > MAX_DEADZONE {
            return Err(invalid(format!("deadzone must be between 0 and {}", MAX_DEADZONE)));
        }

        if !(0.0..=MAX_EXPO).contains(&self.joystick.expo) {
            return Err(invalid(format!("expo must be between 0.0 and {:.1}", MAX_EXPO)));
        }

        // Link
        if self.link.channel > 125 {
            return Err(invalid("channel must be between 0 and 125"));
        }

        if parse_address(&self.link.address).is_none() {
            return Err(invalid("address must be exactly 5 bytes"));
        }

        if self.link.pa_level > 3 {
            return Err(invalid("pa_level must be between 0 and 3"));
        }

        if self.link.retry_delay > 15 || self.link.retry_count > 15 {
            return Err(invalid("retry_delay and retry_count must be between 0 and 15"));
        }

        if !BAUD_RATES.contains(&self.link.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 9600, 57600, 115200, 230400, 460800, 921600",
            ));
        }

        for (name, value) in [
            ("tx_interval_ms", self.link.tx_interval_ms),
            ("indicator_interval_ms", self.link.indicator_interval_ms),
        ] {
            if value == 0 || value > 1000 {
                return Err(invalid(format!("{} must be between 1 and 1000", name)));
            }
        }

        if self.link.failsafe_timeout_ms == 0 || self.link.failsafe_timeout_ms > 60_000 {
            return Err(invalid("failsafe_timeout_ms must be between 1 and 60000"));
        }

        // Store
        if self.store.path.is_empty() {
            return Err(invalid("store path cannot be empty"));
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.log_interval_ms == 0 || self.telemetry.log_interval_ms > 60_000 {
            return Err(invalid("log_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        if matches!(&self.logging.file_dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("logging file_dir cannot be empty when set"));
        }

        Ok(())
    }
}
