//! Monitor configuration loaded from environment variables.
//!
//! Everything is read once at startup into an immutable [`MonitorConfig`]
//! which is then passed down by reference. Missing or malformed values abort
//! startup before any device is contacted.
//!
//! | Variable                         | Required | Default                    |
//! |----------------------------------|----------|----------------------------|
//! | `MONITOR_DEVICES`                | no       | `washer,dryer`             |
//! | `<KEY>_IP`                       | yes      | --                         |
//! | `<KEY>_LABEL`                    | no       | capitalised key            |
//! | `<KEY>_HIGH_THRESHOLD_WATTS`     | no       | `HIGH_THRESHOLD_WATTS`, `100` |
//! | `<KEY>_LOW_THRESHOLD_WATTS`      | no       | `LOW_THRESHOLD_WATTS`, `10` |
//! | `<KEY>_ARM_DEBOUNCE`             | no       | `ARM_DEBOUNCE`, `10`       |
//! | `<KEY>_FINISH_DEBOUNCE`          | no       | `FINISH_DEBOUNCE`, `60`    |
//! | `<KEY>_SAMPLE_INTERVAL_SECS`     | no       | `SAMPLE_INTERVAL_SECS`, `3` |
//! | `MAX_CONSECUTIVE_READ_FAILURES`  | no       | unset (never give up)      |
//! | `TAPO_USERNAME`                  | yes      | --                         |
//! | `TAPO_PASSWORD`                  | yes      | --                         |
//! | `TAPO_TIMEOUT_SECS`              | no       | `10`                       |
//! | `PUSHOVER_TOKEN`                 | yes      | --                         |
//! | `PUSHOVER_USER`                  | yes      | --                         |
//! | `PUSHOVER_SOUND`                 | no       | `echo`                     |
//! | `PUSHOVER_API_URL`               | no       | Pushover messages endpoint |
//!
//! `<KEY>` is the upper-cased device key from `MONITOR_DEVICES`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use laundry_core::thresholds::{
    DEFAULT_ARM_DEBOUNCE, DEFAULT_FINISH_DEBOUNCE, DEFAULT_HIGH_THRESHOLD_WATTS,
    DEFAULT_LOW_THRESHOLD_WATTS, DEFAULT_SAMPLE_INTERVAL,
};
use laundry_core::{CoreError, DetectorConfig};

const DEFAULT_DEVICES: &str = "washer,dryer";
const DEFAULT_TAPO_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PUSHOVER_SOUND: &str = "echo";
pub const DEFAULT_PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(String),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },

    #[error("MONITOR_DEVICES must name at least one device")]
    NoDevices,

    #[error("Device '{0}' is listed more than once in MONITOR_DEVICES")]
    DuplicateDevice(String),

    #[error("Device '{key}': {source}")]
    Detector {
        key: String,
        #[source]
        source: CoreError,
    },
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// One monitored smart plug.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Lower-case key used to build the per-device variable names.
    pub key: String,
    /// Human-readable name used in logs and notifications, e.g. `Washer`.
    pub label: String,
    /// LAN address of the plug.
    pub address: String,
    pub detector: DetectorConfig,
}

/// Account credentials for pairing with the plugs.
#[derive(Clone)]
pub struct TapoConfig {
    pub username: String,
    pub password: String,
    /// Upper bound on a single power read.
    pub timeout: Duration,
}

impl fmt::Debug for TapoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapoConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Pushover application credentials.
#[derive(Clone)]
pub struct PushoverConfig {
    pub token: String,
    pub user: String,
    pub sound: String,
    pub api_url: String,
}

impl fmt::Debug for PushoverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushoverConfig")
            .field("token", &"<redacted>")
            .field("user", &"<redacted>")
            .field("sound", &self.sound)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub devices: Vec<DeviceConfig>,
    pub tapo: TapoConfig,
    pub pushover: PushoverConfig,
    /// Abandon a device after this many reads in a row fail. `None` keeps
    /// retrying forever.
    pub max_consecutive_read_failures: Option<u32>,
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let tapo = TapoConfig {
            username: env.required("TAPO_USERNAME")?,
            password: env.required("TAPO_PASSWORD")?,
            timeout: Duration::from_secs(
                env.parsed("TAPO_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_TAPO_TIMEOUT_SECS),
            ),
        };

        let pushover = PushoverConfig {
            token: env.required("PUSHOVER_TOKEN")?,
            user: env.required("PUSHOVER_USER")?,
            sound: env
                .optional("PUSHOVER_SOUND")
                .unwrap_or_else(|| DEFAULT_PUSHOVER_SOUND.to_string()),
            api_url: env
                .optional("PUSHOVER_API_URL")
                .unwrap_or_else(|| DEFAULT_PUSHOVER_API_URL.to_string()),
        };

        let max_consecutive_read_failures: Option<u32> = env.parsed("MAX_CONSECUTIVE_READ_FAILURES")?;
        if max_consecutive_read_failures == Some(0) {
            return Err(ConfigError::Invalid {
                var: "MAX_CONSECUTIVE_READ_FAILURES".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1 (unset it to never give up)".to_string(),
            });
        }

        let device_list = env
            .optional("MONITOR_DEVICES")
            .unwrap_or_else(|| DEFAULT_DEVICES.to_string());

        let mut seen = HashSet::new();
        let mut devices = Vec::new();
        for key in device_list
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
        {
            if !seen.insert(key.clone()) {
                return Err(ConfigError::DuplicateDevice(key));
            }
            devices.push(load_device(&env, key)?);
        }

        if devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }

        Ok(Self {
            devices,
            tapo,
            pushover,
            max_consecutive_read_failures,
        })
    }
}

fn load_device<F>(env: &Env<F>, key: String) -> Result<DeviceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = key.to_ascii_uppercase();
    let var = |suffix: &str| format!("{prefix}_{suffix}");

    let address = env.required(&var("IP"))?;
    let label = env
        .optional(&var("LABEL"))
        .unwrap_or_else(|| capitalise(&key));

    let interval_secs: u64 = env
        .parsed_with_fallback(&var("SAMPLE_INTERVAL_SECS"), "SAMPLE_INTERVAL_SECS")?
        .unwrap_or(DEFAULT_SAMPLE_INTERVAL.as_secs());

    let detector = DetectorConfig {
        high_threshold_watts: env
            .parsed_with_fallback(&var("HIGH_THRESHOLD_WATTS"), "HIGH_THRESHOLD_WATTS")?
            .unwrap_or(DEFAULT_HIGH_THRESHOLD_WATTS),
        low_threshold_watts: env
            .parsed_with_fallback(&var("LOW_THRESHOLD_WATTS"), "LOW_THRESHOLD_WATTS")?
            .unwrap_or(DEFAULT_LOW_THRESHOLD_WATTS),
        arm_debounce: env
            .parsed_with_fallback(&var("ARM_DEBOUNCE"), "ARM_DEBOUNCE")?
            .unwrap_or(DEFAULT_ARM_DEBOUNCE),
        finish_debounce: env
            .parsed_with_fallback(&var("FINISH_DEBOUNCE"), "FINISH_DEBOUNCE")?
            .unwrap_or(DEFAULT_FINISH_DEBOUNCE),
        sample_interval: Duration::from_secs(interval_secs),
    };

    detector.validate().map_err(|source| ConfigError::Detector {
        key: key.clone(),
        source,
    })?;

    Ok(DeviceConfig {
        key,
        label,
        address,
        detector,
    })
}

/// `washer` -> `Washer`.
fn capitalise(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &str) -> Result<String, ConfigError> {
        self.optional(var)
            .ok_or_else(|| ConfigError::Missing(var.to_string()))
    }

    fn parsed<T>(&self, var: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional(var)
            .map(|value| {
                value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    var: var.to_string(),
                    reason: e.to_string(),
                    value,
                })
            })
            .transpose()
    }

    /// Per-device variable first, then the shared one.
    fn parsed_with_fallback<T>(&self, var: &str, fallback: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.parsed(var)? {
            Some(value) => Ok(Some(value)),
            None => self.parsed(fallback),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
