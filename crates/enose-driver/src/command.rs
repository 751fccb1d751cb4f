//! G-code dialect command rendering.
//!
//! The motion firmware consumes a Klipper-flavoured dialect. Rendering
//! lives here so every crate emits byte-identical lines and tests can
//! assert on them.

use enose_types::METERING_PUMP_COUNT;

/// Axis letter per metering-pump index in the multi-axis parallel move.
pub const AXIS_LETTERS: [char; METERING_PUMP_COUNT] = ['A', 'B', 'C', 'D', 'H', 'I', 'J', 'K'];

/// Manual-stepper name per metering-pump index.
pub const STEPPER_NAMES: [&str; METERING_PUMP_COUNT] = [
    "pump0", "pump1", "pump2", "pump3", "pump4", "pump5", "pump6", "pump7",
];

/// Output pin names on the MCU.
pub mod pins {
    pub const VALVE_WASTE: &str = "valve_waste";
    pub const VALVE_CHAMBER: &str = "valve_chamber";
    pub const VALVE_INLET: &str = "valve_inlet";
    pub const PINCH_VALVE: &str = "pinch_valve";
    /// Companion pins driven together with the pinch valve.
    pub const PINCH_FAN_A: &str = "pinch_fan_a";
    pub const PINCH_FAN_B: &str = "pinch_fan_b";
    pub const AIR_PUMP: &str = "air_pump";
    pub const CLEANING_PUMP: &str = "cleaning_pump";
    pub const HEATER: &str = "heater";
}

/// One command to the motion firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCommand {
    /// Drive a binary output pin.
    SetPin { pin: &'static str, value: u8 },
    /// Drive a PWM output pin with a fractional duty.
    SetPwm { pin: &'static str, duty: f64 },
    /// Release a manual stepper's holding torque.
    DisableStepper { stepper: &'static str },
    /// Bind the eight metering pumps to their motion axes.
    RegisterPumpAxes,
    /// Multi-axis parallel move over all eight pump axes.
    ParallelMove {
        distances_mm: [f64; METERING_PUMP_COUNT],
        feedrate_mm_min: f64,
    },
    /// Out-of-band stop that bypasses the motion queue and clears the
    /// trapezoid queue.
    AsyncStop,
}

impl ActuatorCommand {
    /// Render the command as one firmware line.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::SetPin { pin, value } => format!("SET_PIN PIN={pin} VALUE={value}"),
            Self::SetPwm { pin, duty } => format!("SET_PIN PIN={pin} VALUE={duty:.3}"),
            Self::DisableStepper { stepper } => {
                format!("MANUAL_STEPPER STEPPER={stepper} ENABLE=0")
            }
            Self::RegisterPumpAxes => "REGISTER_PUMPS_TO_AXIS".to_owned(),
            Self::ParallelMove {
                distances_mm,
                feedrate_mm_min,
            } => {
                let mut line = String::from("G1");
                for (letter, dist) in AXIS_LETTERS.iter().zip(distances_mm) {
                    line.push_str(&format!(" {letter}{dist:.3}"));
                }
                line.push_str(&format!(" F{feedrate_mm_min:.0}"));
                line
            }
            Self::AsyncStop => "ENOSE_ASYNC_STOP".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_pin_render() {
        let cmd = ActuatorCommand::SetPin {
            pin: pins::VALVE_WASTE,
            value: 1,
        };
        assert_eq!(cmd.render(), "SET_PIN PIN=valve_waste VALUE=1");
    }

    #[test]
    fn test_set_pwm_render() {
        let cmd = ActuatorCommand::SetPwm {
            pin: pins::AIR_PUMP,
            duty: 0.8,
        };
        assert_eq!(cmd.render(), "SET_PIN PIN=air_pump VALUE=0.800");
    }

    #[test]
    fn test_parallel_move_render() {
        let mut distances = [0.0; METERING_PUMP_COUNT];
        distances[2] = 10.0;
        let cmd = ActuatorCommand::ParallelMove {
            distances_mm: distances,
            feedrate_mm_min: 300.0,
        };
        assert_eq!(
            cmd.render(),
            "G1 A0.000 B0.000 C10.000 D0.000 H0.000 I0.000 J0.000 K0.000 F300"
        );
    }

    #[test]
    fn test_async_stop_render() {
        assert_eq!(ActuatorCommand::AsyncStop.render(), "ENOSE_ASYNC_STOP");
    }

    #[test]
    fn test_disable_stepper_render() {
        let cmd = ActuatorCommand::DisableStepper {
            stepper: STEPPER_NAMES[5],
        };
        assert_eq!(cmd.render(), "MANUAL_STEPPER STEPPER=pump5 ENABLE=0");
    }
}
