//! Aggregated resource estimate produced by validation.

use serde::{Deserialize, Serialize};

use enose_types::METERING_PUMP_COUNT;

/// Simulated consumption of one inventory liquid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidUsage {
    pub liquid_id: String,
    /// Total simulated consumption, millilitres.
    pub required_ml: f64,
    /// Reservoir volume at validation time, millilitres.
    pub available_ml: f64,
    /// Whether the reservoir covers the requirement.
    pub sufficient: bool,
}

/// Resource totals from the simulated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    /// Simulated consumption per metering pump, millilitres.
    pub per_pump_consumption_ml: [f64; METERING_PUMP_COUNT],
    /// Highest simulated bottle level, millilitres.
    pub peak_level_ml: f64,
    /// Simulated bottle level at program end, millilitres.
    pub final_level_ml: f64,
    /// Estimated wall-clock duration, seconds.
    pub total_duration_s: f64,
    /// Total heater cycles demanded by acquire/wait conditions.
    pub heater_cycles: u64,
    /// Per-liquid sufficiency rows, in inventory order.
    pub liquids: Vec<LiquidUsage>,
}

impl ResourceEstimate {
    /// Estimate of an empty program.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            per_pump_consumption_ml: [0.0; METERING_PUMP_COUNT],
            peak_level_ml: 0.0,
            final_level_ml: 0.0,
            total_duration_s: 0.0,
            heater_cycles: 0,
            liquids: Vec::new(),
        }
    }
}
