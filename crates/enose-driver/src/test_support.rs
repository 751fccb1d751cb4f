//! In-memory hardware doubles shared by unit and integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use enose_error::{EnoseError, Result};

use crate::{ActuatorDriver, Scale, SensorMonitor, WeightReading};

// ---------------------------------------------------------------------------
// RecordingDriver
// ---------------------------------------------------------------------------

/// Driver that records every line and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    lines: Mutex<Vec<String>>,
    /// When set, any line containing this substring is rejected.
    fail_on: Mutex<Option<String>>,
}

impl RecordingDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines sent so far, in order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Lines containing `needle`, in order.
    #[must_use]
    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|l| l.contains(needle))
            .cloned()
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Reject any future line containing `needle`.
    pub fn fail_on(&self, needle: impl Into<String>) {
        *self.fail_on.lock() = Some(needle.into());
    }
}

impl ActuatorDriver for RecordingDriver {
    fn send_line(&self, line: &str) -> Result<()> {
        if let Some(needle) = self.fail_on.lock().as_deref() {
            if line.contains(needle) {
                return Err(EnoseError::Driver {
                    command: line.to_owned(),
                    message: "injected failure".to_owned(),
                });
            }
        }
        self.lines.lock().push(line.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedScale
// ---------------------------------------------------------------------------

/// Scale double fed from a script or driven live from a test thread.
///
/// Reads pop scripted samples in order; once the script is exhausted the
/// last sample repeats forever, so polling loops always make progress.
#[derive(Debug)]
pub struct ScriptedScale {
    queue: Mutex<VecDeque<WeightReading>>,
    last: Mutex<WeightReading>,
}

impl ScriptedScale {
    /// Start with a single steady reading.
    #[must_use]
    pub fn steady(grams: f64) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            last: Mutex::new(WeightReading {
                grams,
                stable: true,
            }),
        }
    }

    /// Append a scripted sample.
    pub fn push(&self, grams: f64, stable: bool) {
        self.queue
            .lock()
            .push_back(WeightReading { grams, stable });
    }

    /// Replace the steady-state reading returned once the script runs out.
    pub fn set_reading(&self, grams: f64, stable: bool) {
        *self.last.lock() = WeightReading { grams, stable };
        self.queue.lock().clear();
    }
}

impl Scale for ScriptedScale {
    fn read(&self) -> Result<WeightReading> {
        if let Some(next) = self.queue.lock().pop_front() {
            *self.last.lock() = next;
            return Ok(next);
        }
        Ok(*self.last.lock())
    }
}

// ---------------------------------------------------------------------------
// ManualSensorMonitor
// ---------------------------------------------------------------------------

/// Sensor monitor advanced explicitly by tests.
#[derive(Debug, Default)]
pub struct ManualSensorMonitor {
    cycles: AtomicU64,
}

impl ManualSensorMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `n` further completed heater cycles.
    pub fn advance(&self, n: u64) {
        self.cycles.fetch_add(n, Ordering::Relaxed);
    }
}

impl SensorMonitor for ManualSensorMonitor {
    fn heater_cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_driver_captures_lines() {
        let driver = RecordingDriver::new();
        driver.send_line("SET_PIN PIN=air_pump VALUE=0.500").unwrap();
        driver.send_line("ENOSE_ASYNC_STOP").unwrap();
        assert_eq!(driver.lines().len(), 2);
        assert_eq!(driver.lines_containing("ASYNC").len(), 1);
    }

    #[test]
    fn test_recording_driver_injected_failure() {
        let driver = RecordingDriver::new();
        driver.fail_on("G1");
        assert!(driver.send_line("G1 A1.000 F300").is_err());
        assert!(driver.send_line("ENOSE_ASYNC_STOP").is_ok());
    }

    #[test]
    fn test_scripted_scale_repeats_last() {
        let scale = ScriptedScale::steady(100.0);
        scale.push(101.0, false);
        scale.push(102.0, true);
        assert_eq!(scale.read().unwrap().grams, 101.0);
        assert_eq!(scale.read().unwrap().grams, 102.0);
        // Script exhausted: last sample repeats.
        assert_eq!(scale.read().unwrap().grams, 102.0);
        assert!(scale.read().unwrap().stable);
    }
}
