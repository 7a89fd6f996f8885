//! Cycle finish detection for a single appliance.
//!
//! [`FinishDetector`] classifies each power reading against two thresholds:
//!
//! - strictly above `high` is evidence the appliance is running,
//! - strictly below `low` is evidence it is idle,
//! - anything in between (thresholds included) is the dead band and counts
//!   as neither.
//!
//! Sustained high readings arm the detector; once armed, sustained low
//! readings produce a single [`Transition::Finished`] and disarm it again.
//! Dead-band readings only break a high streak, so an armed appliance that
//! idles between agitation or heating bursts keeps its low streak.

use crate::thresholds::DetectorConfig;

/// A state change reported by [`FinishDetector::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Sustained high draw observed; the appliance is mid-cycle.
    Armed,
    /// Sustained low draw observed after arming; the cycle is complete.
    Finished,
}

/// Mutable detection state, owned by exactly one detector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorState {
    pub armed: bool,
    /// Consecutive samples above the high threshold.
    pub high_count: u32,
    /// Consecutive samples below the low threshold while armed.
    pub low_count: u32,
}

/// Debounced hysteresis classifier turning power readings into cycle
/// transitions.
#[derive(Debug, Clone)]
pub struct FinishDetector {
    config: DetectorConfig,
    state: DetectorState,
}

impl FinishDetector {
    /// Create a disarmed detector.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::default(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state.armed
    }

    /// Feed one power sample (watts) into the detector.
    ///
    /// Returns [`Transition::Armed`] on the sample that completes the arm
    /// debounce and [`Transition::Finished`] on the sample that completes the
    /// finish debounce. Every other sample returns `None`.
    pub fn observe(&mut self, power_watts: f64) -> Option<Transition> {
        let state = &mut self.state;

        if power_watts > self.config.high_threshold_watts {
            state.high_count = state.high_count.saturating_add(1);
            state.low_count = 0;

            if !state.armed && state.high_count >= self.config.arm_debounce {
                state.armed = true;
                return Some(Transition::Armed);
            }
        } else if power_watts < self.config.low_threshold_watts {
            state.high_count = 0;

            if state.armed {
                state.low_count += 1;
                if state.low_count >= self.config.finish_debounce {
                    state.armed = false;
                    state.low_count = 0;
                    return Some(Transition::Finished);
                }
            } else {
                state.low_count = 0;
            }
        } else {
            // Dead band: breaks a high streak only.
            state.high_count = 0;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(arm: u32, finish: u32) -> FinishDetector {
        FinishDetector::new(DetectorConfig {
            arm_debounce: arm,
            finish_debounce: finish,
            ..Default::default()
        })
    }

    fn feed(detector: &mut FinishDetector, power: f64, times: usize) -> Vec<Transition> {
        (0..times).filter_map(|_| detector.observe(power)).collect()
    }

    #[test]
    fn starts_disarmed() {
        let d = detector(3, 3);
        assert_eq!(d.state(), &DetectorState::default());
        assert!(!d.is_armed());
    }

    #[test]
    fn arms_on_kth_high_sample() {
        let mut d = detector(3, 5);
        assert_eq!(d.observe(150.0), None);
        assert_eq!(d.observe(150.0), None);
        assert_eq!(d.observe(150.0), Some(Transition::Armed));
        assert!(d.is_armed());
    }

    #[test]
    fn armed_is_reported_once() {
        let mut d = detector(2, 5);
        let transitions = feed(&mut d, 150.0, 20);
        assert_eq!(transitions, vec![Transition::Armed]);
        assert_eq!(d.state().high_count, 20);
    }

    #[test]
    fn high_resets_low_streak() {
        let mut d = detector(1, 5);
        d.observe(150.0);
        feed(&mut d, 2.0, 4);
        assert_eq!(d.state().low_count, 4);

        d.observe(150.0);
        assert_eq!(d.state().low_count, 0);
        assert!(d.is_armed());
    }

    #[test]
    fn dead_band_keeps_low_streak() {
        let mut d = detector(1, 5);
        d.observe(150.0);
        feed(&mut d, 2.0, 4);
        d.observe(50.0);
        assert_eq!(d.state().low_count, 4);
        assert_eq!(d.state().high_count, 0);

        assert_eq!(d.observe(2.0), Some(Transition::Finished));
    }

    #[test]
    fn low_while_disarmed_keeps_zero_counts() {
        let mut d = detector(3, 3);
        d.observe(150.0);
        d.observe(1.0);
        assert_eq!(d.state(), &DetectorState::default());
    }

    #[test]
    fn negative_reading_counts_as_low() {
        let mut d = detector(1, 2);
        d.observe(150.0);
        assert_eq!(d.observe(-5.0), None);
        assert_eq!(d.observe(-5.0), Some(Transition::Finished));
    }
}
