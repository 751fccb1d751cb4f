//! Hardware seams: actuator driver, load cell, and sensor monitor.
//!
//! The engine never speaks to hardware directly. It renders commands in
//! the motion firmware's G-code dialect and hands the textual line to an
//! [`ActuatorDriver`]; it observes the bottle through a [`Scale`] and
//! the sensor board through a [`SensorMonitor`]. Production
//! implementations live with the serial/RPC collaborators; the test
//! doubles in [`test_support`] are used throughout the workspace.

use std::time::Duration;

use enose_error::Result;

pub mod command;
pub mod test_support;

pub use command::{ActuatorCommand, AXIS_LETTERS, STEPPER_NAMES};

/// How long MCU-side queued steps may keep draining after an
/// out-of-band async stop.
pub const ASYNC_STOP_DRAIN: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Actuator driver
// ---------------------------------------------------------------------------

/// Serial link to the motion firmware.
///
/// Implementations queue the line and report transport-level failure;
/// they do not interpret it. The driver handle is shared read-only
/// between threads — internal locking is the implementation's concern.
pub trait ActuatorDriver: Send + Sync {
    /// Send one textual command line.
    fn send_line(&self, line: &str) -> Result<()>;

    /// Render and send a typed command.
    fn send(&self, cmd: &ActuatorCommand) -> Result<()> {
        self.send_line(&cmd.render())
    }
}

// ---------------------------------------------------------------------------
// Load cell
// ---------------------------------------------------------------------------

/// One load-cell sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightReading {
    /// Gross weight in grams.
    pub grams: f64,
    /// Smoothed stability flag reported by the scale driver.
    pub stable: bool,
}

/// Gravimetric feedback from the bottle's load cell.
pub trait Scale: Send + Sync {
    /// Read the current weight and stability flag.
    fn read(&self) -> Result<WeightReading>;
}

// ---------------------------------------------------------------------------
// Sensor monitor
// ---------------------------------------------------------------------------

/// View onto the sensor board's streamed phase markers.
///
/// The board heats and cools its MOX elements cyclically; the monitor
/// exposes a monotonic count of completed heater cycles.
pub trait SensorMonitor: Send + Sync {
    /// Number of heater cycles completed since the monitor started.
    fn heater_cycles(&self) -> u64;
}
