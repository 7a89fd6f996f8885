//! `laundry-core` -- appliance cycle detection logic.
//!
//! Pure logic with no I/O: the monitor crate feeds power readings in and
//! acts on the transitions that come out.

pub mod detector;
pub mod error;
pub mod thresholds;

pub use detector::{DetectorState, FinishDetector, Transition};
pub use error::CoreError;
pub use thresholds::DetectorConfig;
