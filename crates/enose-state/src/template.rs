//! Peripheral templates, one per coarse state.

use enose_types::{CoarseState, PeripheralState, PinchMode, PwmDuty, ValvePosition};

/// Air-pump duty while draining the bottle to waste.
pub const DRAIN_AIR_DUTY: f64 = 0.8;
/// Air-pump duty while sampling gas into the chamber.
pub const SAMPLE_AIR_DUTY: f64 = 0.6;
/// Cleaning-pump duty while rinsing. Increases are soft-started.
pub const CLEAN_PUMP_DUTY: f64 = 1.0;
/// Sensor-heater duty during acquisition.
pub const SAMPLE_HEATER_DUTY: f64 = 1.0;

/// Desired peripheral configuration for a coarse state.
///
/// The metering pumps are always `Stopped` in templates; only
/// [`SystemState::start_inject`](crate::SystemState::start_inject)
/// marks them running.
#[must_use]
pub fn template(coarse: CoarseState) -> PeripheralState {
    let base = PeripheralState::all_off();
    match coarse {
        CoarseState::Initial => base,
        CoarseState::Drain => PeripheralState {
            valve_waste: ValvePosition::Open,
            air_pump: PwmDuty::clamped(DRAIN_AIR_DUTY),
            ..base
        },
        CoarseState::Clean => PeripheralState {
            valve_inlet: ValvePosition::Open,
            valve_pinch: PinchMode::Liquid,
            cleaning_pump: PwmDuty::clamped(CLEAN_PUMP_DUTY),
            ..base
        },
        CoarseState::Sample => PeripheralState {
            valve_chamber: ValvePosition::Open,
            air_pump: PwmDuty::clamped(SAMPLE_AIR_DUTY),
            heater: PwmDuty::clamped(SAMPLE_HEATER_DUTY),
            ..base
        },
        CoarseState::Inject => PeripheralState {
            valve_inlet: ValvePosition::Open,
            valve_pinch: PinchMode::Liquid,
            ..base
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Test: waste valve opens only while draining ===
    #[test]
    fn test_waste_only_in_drain() {
        for coarse in CoarseState::ALL {
            let open = template(coarse).valve_waste == ValvePosition::Open;
            assert_eq!(open, coarse == CoarseState::Drain, "{coarse}");
        }
    }

    // === Test: pinch valve selects liquid only for clean and inject ===
    #[test]
    fn test_pinch_liquid_states() {
        for coarse in CoarseState::ALL {
            let liquid = template(coarse).valve_pinch == PinchMode::Liquid;
            let expect = matches!(coarse, CoarseState::Clean | CoarseState::Inject);
            assert_eq!(liquid, expect, "{coarse}");
        }
    }

    // === Test: no template carries a running metering pump ===
    #[test]
    fn test_templates_never_run_pumps() {
        for coarse in CoarseState::ALL {
            assert!(!template(coarse).any_pump_running(), "{coarse}");
        }
    }

    #[test]
    fn test_initial_is_all_off() {
        assert_eq!(template(CoarseState::Initial), PeripheralState::all_off());
    }
}
