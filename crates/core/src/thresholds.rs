//! Per-device detection thresholds and debounce settings.
//!
//! A [`DetectorConfig`] is built once at startup and handed to a
//! [`FinishDetector`](crate::detector::FinishDetector); nothing in the
//! detection path reads the environment.

use std::time::Duration;

use crate::error::CoreError;

/// Readings above this many watts count as "running".
pub const DEFAULT_HIGH_THRESHOLD_WATTS: f64 = 100.0;

/// Readings below this many watts count as "idle".
pub const DEFAULT_LOW_THRESHOLD_WATTS: f64 = 10.0;

/// Consecutive high samples required to arm (~30s at the default interval).
pub const DEFAULT_ARM_DEBOUNCE: u32 = 10;

/// Consecutive low samples required to finish (~3min at the default interval).
pub const DEFAULT_FINISH_DEBOUNCE: u32 = 60;

/// Time between two power samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(3);

/// Thresholds and debounce counts for a single monitored device.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub high_threshold_watts: f64,
    pub low_threshold_watts: f64,
    /// Consecutive samples strictly above `high_threshold_watts` before arming.
    pub arm_debounce: u32,
    /// Consecutive samples strictly below `low_threshold_watts` before finishing.
    pub finish_debounce: u32,
    pub sample_interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            high_threshold_watts: DEFAULT_HIGH_THRESHOLD_WATTS,
            low_threshold_watts: DEFAULT_LOW_THRESHOLD_WATTS,
            arm_debounce: DEFAULT_ARM_DEBOUNCE,
            finish_debounce: DEFAULT_FINISH_DEBOUNCE,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

impl DetectorConfig {
    /// Check that the settings describe a usable detector.
    ///
    /// Thresholds must be finite with `low <= high`, both debounce counts
    /// must be at least one sample, and the interval must be non-zero.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_finite(self.high_threshold_watts, "high_threshold_watts")?;
        validate_finite(self.low_threshold_watts, "low_threshold_watts")?;

        if self.low_threshold_watts > self.high_threshold_watts {
            return Err(CoreError::Validation(format!(
                "low_threshold_watts ({}) must not exceed high_threshold_watts ({})",
                self.low_threshold_watts, self.high_threshold_watts
            )));
        }

        validate_debounce(self.arm_debounce, "arm_debounce")?;
        validate_debounce(self.finish_debounce, "finish_debounce")?;

        if self.sample_interval.is_zero() {
            return Err(CoreError::Validation(
                "sample_interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Approximate wall-clock time of sustained draw needed to arm.
    ///
    /// Saturates at [`Duration::MAX`].
    pub fn time_to_arm(&self) -> Duration {
        self.sample_interval.saturating_mul(self.arm_debounce)
    }

    /// Approximate wall-clock time of confirmed idle needed to finish.
    ///
    /// Saturates at [`Duration::MAX`].
    pub fn time_to_finish(&self) -> Duration {
        self.sample_interval.saturating_mul(self.finish_debounce)
    }
}

fn validate_finite(value: f64, name: &str) -> Result<(), CoreError> {
    if !value.is_finite() {
        return Err(CoreError::Validation(format!(
            "{name} must be a finite number, got {value}"
        )));
    }
    Ok(())
}

fn validate_debounce(value: u32, name: &str) -> Result<(), CoreError> {
    if value == 0 {
        return Err(CoreError::Validation(format!(
            "{name} must be at least 1 sample"
        )));
    }
    Ok(())
}
