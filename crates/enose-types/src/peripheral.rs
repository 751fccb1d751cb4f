//! Peripheral configuration values (L0).
//!
//! A [`PeripheralState`] is an immutable snapshot of the desired setting
//! of every actuator on the fluidics rig: four binary valves, two
//! PWM-driven pumps, eight metering pumps, and the sensor heater. The
//! state controller diffs two snapshots field by field and emits only
//! the delta as actuator commands.

use serde::{Deserialize, Serialize};

use crate::hardware::METERING_PUMP_COUNT;

// ---------------------------------------------------------------------------
// PwmDuty
// ---------------------------------------------------------------------------

/// A fractional PWM duty cycle, clamped to `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PwmDuty(f64);

impl PwmDuty {
    /// Fully off.
    pub const OFF: Self = Self(0.0);
    /// Fully on.
    pub const FULL: Self = Self(1.0);

    /// Build a duty cycle, clamping out-of-range input into `0.0..=1.0`.
    #[must_use]
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::OFF;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// The fractional duty value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Whether the duty is exactly zero.
    #[must_use]
    pub fn is_off(self) -> bool {
        self.0 == 0.0
    }
}

// ---------------------------------------------------------------------------
// Valves
// ---------------------------------------------------------------------------

/// Nominal position of a binary solenoid valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValvePosition {
    Closed,
    Open,
}

impl ValvePosition {
    /// Electrical pin value for this position.
    #[must_use]
    pub const fn pin_value(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
        }
    }
}

/// Routing mode of the pinch valve.
///
/// The pinch valve is *linked*: its two companion fan pins are always
/// driven to the same electrical value in the same command batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinchMode {
    /// Gas path selected (de-energized).
    Gas,
    /// Liquid path selected (energized).
    Liquid,
}

impl PinchMode {
    /// Electrical pin value for this mode.
    #[must_use]
    pub const fn pin_value(self) -> u8 {
        match self {
            Self::Gas => 0,
            Self::Liquid => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Metering pumps
// ---------------------------------------------------------------------------

/// A queued motion for one metering-pump axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionRequest {
    /// Commanded travel on this axis in millimetres.
    pub distance_mm: f64,
    /// Feedrate in mm/min (speed in mm/s × 60).
    pub feedrate_mm_min: f64,
}

/// State of one metering pump.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeteringPump {
    Stopped,
    Running(MotionRequest),
}

impl MeteringPump {
    /// Whether the pump currently has an active motion.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running(_))
    }
}

// ---------------------------------------------------------------------------
// PeripheralState
// ---------------------------------------------------------------------------

/// Desired configuration of every actuator on the rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeripheralState {
    /// Waste-line solenoid. Open only while draining.
    pub valve_waste: ValvePosition,
    /// Gas route into the sensor chamber.
    pub valve_chamber: ValvePosition,
    /// Liquid inlet into the sample bottle.
    pub valve_inlet: ValvePosition,
    /// Modal pinch valve selecting the gas or liquid path.
    pub valve_pinch: PinchMode,
    /// Air (gas) pump duty.
    pub air_pump: PwmDuty,
    /// Cleaning pump duty. Increases are soft-started.
    pub cleaning_pump: PwmDuty,
    /// The eight metering pumps, indexed by pump index.
    pub metering_pumps: [MeteringPump; METERING_PUMP_COUNT],
    /// Sensor heater duty.
    pub heater: PwmDuty,
}

impl PeripheralState {
    /// Everything closed, stopped, and off.
    #[must_use]
    pub const fn all_off() -> Self {
        Self {
            valve_waste: ValvePosition::Closed,
            valve_chamber: ValvePosition::Closed,
            valve_inlet: ValvePosition::Closed,
            valve_pinch: PinchMode::Gas,
            air_pump: PwmDuty::OFF,
            cleaning_pump: PwmDuty::OFF,
            metering_pumps: [MeteringPump::Stopped; METERING_PUMP_COUNT],
            heater: PwmDuty::OFF,
        }
    }

    /// Whether any metering pump has an active motion.
    #[must_use]
    pub fn any_pump_running(&self) -> bool {
        self.metering_pumps.iter().any(|p| p.is_running())
    }

    /// Copy of this state with every metering pump stopped.
    #[must_use]
    pub fn with_pumps_stopped(mut self) -> Self {
        self.metering_pumps = [MeteringPump::Stopped; METERING_PUMP_COUNT];
        self
    }
}

// ---------------------------------------------------------------------------
// CoarseState
// ---------------------------------------------------------------------------

/// Top-level peripheral configuration label (L0).
///
/// Each value pairs with a predefined [`PeripheralState`] template held
/// by the state controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarseState {
    /// Idle: all valves closed, all pumps off.
    Initial,
    /// Waste open, air pump pushing the bottle empty.
    Drain,
    /// Liquid routed, cleaning pump driving rinse fluid.
    Clean,
    /// Gas routed to the chamber, air pump sampling.
    Sample,
    /// Liquid routed, metering pumps individually driven.
    Inject,
}

impl CoarseState {
    /// All coarse states, in template-table order.
    pub const ALL: [Self; 5] = [
        Self::Initial,
        Self::Drain,
        Self::Clean,
        Self::Sample,
        Self::Inject,
    ];

    /// Stable lower-case name used in commands, logs, and events.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Drain => "drain",
            Self::Clean => "clean",
            Self::Sample => "sample",
            Self::Inject => "inject",
        }
    }
}

impl std::fmt::Display for CoarseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pwm_duty_clamps() {
        assert_eq!(PwmDuty::clamped(-0.5), PwmDuty::OFF);
        assert_eq!(PwmDuty::clamped(1.5), PwmDuty::FULL);
        assert_eq!(PwmDuty::clamped(f64::NAN), PwmDuty::OFF);
        assert!((PwmDuty::clamped(0.3).value() - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_off_has_no_running_pump() {
        let s = PeripheralState::all_off();
        assert!(!s.any_pump_running());
        assert_eq!(s.valve_waste, ValvePosition::Closed);
        assert_eq!(s.valve_pinch, PinchMode::Gas);
    }

    #[test]
    fn test_with_pumps_stopped_clears_motion() {
        let mut s = PeripheralState::all_off();
        s.metering_pumps[3] = MeteringPump::Running(MotionRequest {
            distance_mm: 10.0,
            feedrate_mm_min: 300.0,
        });
        assert!(s.any_pump_running());
        assert!(!s.with_pumps_stopped().any_pump_running());
    }
}
