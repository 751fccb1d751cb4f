//! Hardware constraints and liquid inventory.

use serde::{Deserialize, Serialize};

/// Number of metering pumps on the rig, one per motion axis.
pub const METERING_PUMP_COUNT: usize = 8;

/// Role of a liquid in the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidType {
    Rinse,
    Sample,
    Calibration,
    Unspecified,
}

/// One liquid reservoir attached to a metering pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidInventory {
    /// Unique liquid id referenced by inject components.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Metering pump index, `0..METERING_PUMP_COUNT`, unique per liquid.
    pub pump_index: u8,
    /// Role of the liquid.
    pub kind: LiquidType,
    /// Volume available in the reservoir, millilitres.
    pub available_ml: f64,
    /// Density in g/mL, if known. Weight targets fall back to 1.0 when
    /// any referenced component lacks a density.
    pub density_g_per_ml: Option<f64>,
}

/// Static limits of the rig plus the liquid inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareConstraints {
    /// Physical bottle capacity, millilitres.
    pub bottle_capacity_ml: f64,
    /// Maximum admissible fill level, at most the bottle capacity.
    pub max_fill_ml: f64,
    /// Upper bound for any gas-pump duty request.
    pub max_gas_pump_pwm: f64,
    /// Known liquids, keyed by id.
    pub liquids: Vec<LiquidInventory>,
}

impl HardwareConstraints {
    /// Look up a liquid by id.
    #[must_use]
    pub fn liquid(&self, id: &str) -> Option<&LiquidInventory> {
        self.liquids.iter().find(|l| l.id == id)
    }

    /// First liquid of the given type, in inventory order.
    #[must_use]
    pub fn first_of_kind(&self, kind: LiquidType) -> Option<&LiquidInventory> {
        self.liquids.iter().find(|l| l.kind == kind)
    }

    /// Clamp a requested gas-pump duty to the hardware maximum.
    #[must_use]
    pub fn bound_gas_pwm(&self, requested: f64) -> f64 {
        requested.clamp(0.0, self.max_gas_pump_pwm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water(id: &str, pump: u8) -> LiquidInventory {
        LiquidInventory {
            id: id.to_owned(),
            name: id.to_owned(),
            pump_index: pump,
            kind: LiquidType::Rinse,
            available_ml: 500.0,
            density_g_per_ml: Some(1.0),
        }
    }

    #[test]
    fn test_liquid_lookup() {
        let hw = HardwareConstraints {
            bottle_capacity_ml: 60.0,
            max_fill_ml: 50.0,
            max_gas_pump_pwm: 0.9,
            liquids: vec![water("w1", 0), water("w2", 1)],
        };
        assert_eq!(hw.liquid("w2").map(|l| l.pump_index), Some(1));
        assert!(hw.liquid("missing").is_none());
        assert_eq!(hw.first_of_kind(LiquidType::Rinse).map(|l| l.id.as_str()), Some("w1"));
    }

    #[test]
    fn test_gas_pwm_bound() {
        let hw = HardwareConstraints {
            bottle_capacity_ml: 60.0,
            max_fill_ml: 50.0,
            max_gas_pump_pwm: 0.8,
            liquids: Vec::new(),
        };
        assert!((hw.bound_gas_pwm(1.0) - 0.8).abs() < f64::EPSILON);
        assert!((hw.bound_gas_pwm(0.5) - 0.5).abs() < f64::EPSILON);
        assert!(hw.bound_gas_pwm(-1.0).abs() < f64::EPSILON);
    }
}
