//! Property tests over the validator: purity and resource accounting.

use proptest::prelude::*;

use enose::{
    validate, Action, HardwareConstraints, LiquidInventory, LiquidType, Program, Step,
};
use enose_types::{Component, InjectAction, LoopAction};

fn hardware(available_ml: f64) -> HardwareConstraints {
    HardwareConstraints {
        bottle_capacity_ml: 1000.0,
        max_fill_ml: 800.0,
        max_gas_pump_pwm: 0.9,
        liquids: vec![LiquidInventory {
            id: "water".to_owned(),
            name: "Rinse water".to_owned(),
            pump_index: 0,
            kind: LiquidType::Rinse,
            available_ml,
            density_g_per_ml: Some(1.0),
        }],
    }
}

fn looped_inject(volume_ml: f64, tolerance_g: f64, count: u32) -> Program {
    Program {
        steps: vec![Step::new(
            "cycle",
            Action::Loop(LoopAction {
                count,
                steps: vec![Step::new(
                    "fill",
                    Action::Inject(InjectAction {
                        volume_ml: Some(volume_ml),
                        weight_g: None,
                        tolerance_g,
                        flow_rate_ml_min: 5.0,
                        stable_timeout_s: 10.0,
                        components: vec![Component {
                            liquid_id: "water".to_owned(),
                            ratio: 1.0,
                        }],
                    }),
                )],
            }),
        )],
    }
}

proptest! {
    // Two validations of the same inputs are byte-for-byte identical.
    #[test]
    fn validate_is_pure(
        volume in 0.1f64..40.0,
        tolerance in 0.0f64..5.0,
        count in 0u32..8,
        available in 10.0f64..500.0,
    ) {
        let hw = hardware(available);
        let program = looped_inject(volume, tolerance, count);
        let first = validate(&program, Some(&hw));
        let second = validate(&program, Some(&hw));
        prop_assert_eq!(first, second);
    }

    // A valid program never plans to consume more than is available.
    #[test]
    fn valid_programs_fit_the_inventory(
        volume in 0.1f64..40.0,
        count in 0u32..8,
        available in 10.0f64..500.0,
    ) {
        let hw = hardware(available);
        let program = looped_inject(volume, 0.01, count);
        let report = validate(&program, Some(&hw));
        if report.is_valid() {
            for usage in &report.estimate.liquids {
                prop_assert!(usage.required_ml <= usage.available_ml);
                prop_assert!(usage.sufficient);
            }
        }
    }
}
