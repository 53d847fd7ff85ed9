use std::ops::RangeInclusive;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{Error, Result};

pub const DEFAULT_DISPLAY_NAME: &str = "Air Conditioner";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_COMMAND_DEBOUNCE_MS: u64 = 450;
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 5_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 60_000;

const COMMAND_DEBOUNCE_RANGE: RangeInclusive<u64> = 100..=5_000;
const ACK_TIMEOUT_RANGE: RangeInclusive<u64> = 500..=15_000;
const COMMAND_TIMEOUT_RANGE: RangeInclusive<u64> = 1_000..=30_000;
const RECONNECT_INITIAL_RANGE: RangeInclusive<u64> = 100..=60_000;
const RECONNECT_MAX_LIMIT_MS: u64 = 3_600_000;
const POLL_INTERVAL_RANGE: RangeInclusive<u64> = 1..=86_400;
const RECONNECT_RESET_AFTER_RANGE: RangeInclusive<u64> = 1..=86_400;

/// Accessory configuration as found in the host platform's JSON config.
///
/// Keys are camelCase; the older key names (`ip`, `mock`, `enableFanOnly`, ...)
/// are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    #[serde(alias = "ip")]
    pub device_host: Option<String>,
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(alias = "mock")]
    pub simulation: bool,
    /// Simulation tick interval.
    #[serde(alias = "pollInterval")]
    pub poll_interval_seconds: u64,
    pub command_debounce_ms: u64,
    pub ack_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// When set, a stream that stayed connected at least this long restarts
    /// the reconnect backoff from its floor. Unset, the backoff never shrinks.
    pub reconnect_reset_after_secs: Option<u64>,
    #[serde(alias = "enableFanOnly")]
    pub enable_fan_only_switch: bool,
    #[serde(alias = "enableDryMode")]
    pub enable_dry_mode_switch: bool,
    #[serde(alias = "enablePresets")]
    pub enable_preset_switches: bool,
    #[serde(alias = "enableSwing")]
    pub enable_swing_switch: bool,
    #[serde(alias = "autoDisableBeeper")]
    pub auto_disable_beeper_on_discovery: bool,
    #[serde(alias = "debug")]
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_host: None,
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            simulation: false,
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            command_debounce_ms: DEFAULT_COMMAND_DEBOUNCE_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            reconnect_initial_ms: DEFAULT_RECONNECT_INITIAL_MS,
            reconnect_max_ms: DEFAULT_RECONNECT_MAX_MS,
            reconnect_reset_after_secs: None,
            enable_fan_only_switch: false,
            enable_dry_mode_switch: false,
            enable_preset_switches: false,
            enable_swing_switch: false,
            auto_disable_beeper_on_discovery: false,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn new(device_host: impl Into<String>) -> Self {
        Self {
            device_host: Some(device_host.into()),
            ..Default::default()
        }
    }

    /// A configuration with no physical device behind it.
    pub fn simulated() -> Self {
        Self {
            simulation: true,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_command_debounce_ms(mut self, ms: u64) -> Self {
        self.command_debounce_ms = ms;
        self
    }

    pub fn with_ack_timeout_ms(mut self, ms: u64) -> Self {
        self.ack_timeout_ms = ms;
        self
    }

    pub fn with_command_timeout_ms(mut self, ms: u64) -> Self {
        self.command_timeout_ms = ms;
        self
    }

    pub fn with_reconnect_backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.reconnect_initial_ms = initial;
        self.reconnect_max_ms = max;
        self
    }

    pub fn with_reconnect_reset_after_secs(mut self, secs: u64) -> Self {
        self.reconnect_reset_after_secs = Some(secs);
        self
    }

    pub fn with_poll_interval_seconds(mut self, secs: u64) -> Self {
        self.poll_interval_seconds = secs;
        self
    }

    pub fn with_auto_disable_beeper(mut self, enabled: bool) -> Self {
        self.auto_disable_beeper_on_discovery = enabled;
        self
    }

    pub fn with_verbose_logging(mut self, enabled: bool) -> Self {
        self.verbose_logging = enabled;
        self
    }

    /// Host to talk to, if any. Blank strings count as missing.
    pub fn host(&self) -> Option<&str> {
        self.device_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    /// Rejects a configuration the engine cannot run with and replaces
    /// out-of-range tuning values with their defaults.
    pub fn validated(mut self) -> Result<Self> {
        if !self.simulation && self.host().is_none() {
            return Err(Error::Config(
                "deviceHost is required unless simulation is enabled".to_string(),
            ));
        }

        self.command_debounce_ms = in_range_or_default(
            "commandDebounceMs",
            self.command_debounce_ms,
            COMMAND_DEBOUNCE_RANGE,
            DEFAULT_COMMAND_DEBOUNCE_MS,
        );
        self.ack_timeout_ms = in_range_or_default(
            "ackTimeoutMs",
            self.ack_timeout_ms,
            ACK_TIMEOUT_RANGE,
            DEFAULT_ACK_TIMEOUT_MS,
        );
        self.command_timeout_ms = in_range_or_default(
            "commandTimeoutMs",
            self.command_timeout_ms,
            COMMAND_TIMEOUT_RANGE,
            DEFAULT_COMMAND_TIMEOUT_MS,
        );
        self.reconnect_initial_ms = in_range_or_default(
            "reconnectInitialMs",
            self.reconnect_initial_ms,
            RECONNECT_INITIAL_RANGE,
            DEFAULT_RECONNECT_INITIAL_MS,
        );
        if self.reconnect_max_ms > RECONNECT_MAX_LIMIT_MS {
            warn!(
                value = self.reconnect_max_ms,
                max = RECONNECT_MAX_LIMIT_MS,
                default = DEFAULT_RECONNECT_MAX_MS,
                "reconnectMaxMs out of range, using default"
            );
            self.reconnect_max_ms = DEFAULT_RECONNECT_MAX_MS;
        }
        if self.reconnect_max_ms < self.reconnect_initial_ms {
            warn!(
                value = self.reconnect_max_ms,
                floor = self.reconnect_initial_ms,
                "reconnectMaxMs below reconnectInitialMs, using the floor"
            );
            self.reconnect_max_ms = self.reconnect_initial_ms;
        }
        self.poll_interval_seconds = in_range_or_default(
            "pollIntervalSeconds",
            self.poll_interval_seconds,
            POLL_INTERVAL_RANGE,
            DEFAULT_POLL_INTERVAL_SECS,
        );
        if let Some(secs) = self.reconnect_reset_after_secs
            && !RECONNECT_RESET_AFTER_RANGE.contains(&secs)
        {
            warn!(value = secs, "reconnectResetAfterSecs out of range, backoff will not reset");
            self.reconnect_reset_after_secs = None;
        }

        Ok(self)
    }

    pub fn command_debounce(&self) -> Duration {
        Duration::from_millis(self.command_debounce_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn reconnect_reset_after(&self) -> Option<Duration> {
        self.reconnect_reset_after_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

fn in_range_or_default(key: &str, value: u64, range: RangeInclusive<u64>, default: u64) -> u64 {
    if range.contains(&value) {
        value
    } else {
        warn!(
            key,
            value,
            min = *range.start(),
            max = *range.end(),
            default,
            "configuration value out of range, using default"
        );
        default
    }
}
