//! Tunable execution parameters.

use std::time::Duration;

/// Polling and observation parameters shared by the executors.
#[derive(Debug, Clone)]
pub struct ExecSettings {
    /// Spacing between condition polls and cooperative-sleep slices.
    pub poll_interval: Duration,
    /// How close to the dynamic empty weight a reading must be to count
    /// as empty, in grams.
    pub empty_tolerance_g: f64,
    /// How long readings must stay empty before a drain terminates.
    pub empty_window: Duration,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            empty_tolerance_g: 0.5,
            empty_window: Duration::from_secs(2),
        }
    }
}

impl ExecSettings {
    /// Fast settings for tests: millisecond polls and windows.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(2),
            empty_tolerance_g: 0.5,
            empty_window: Duration::from_millis(10),
        }
    }
}
