//! The nine primitive executors.
//!
//! All share one skeleton: evaluate preconditions, open transaction
//! guards with the workflow's target state, stream actuator commands,
//! poll for sensor conditions with cooperative cancellation checks, and
//! commit — or let the guards roll back on the first failure.

mod acquire;
mod drain;
mod inject;
mod loop_step;
mod phase_marker;
mod set_gas_pump;
mod set_state;
mod wait;
mod wash;

pub use acquire::AcquireExecutor;
pub use drain::DrainExecutor;
pub use inject::InjectExecutor;
pub use loop_step::LoopExecutor;
pub use phase_marker::PhaseMarkerExecutor;
pub use set_gas_pump::SetGasPumpExecutor;
pub use set_state::SetStateExecutor;
pub use wait::WaitExecutor;
pub use wash::WashExecutor;

use enose_error::Result;
use enose_state::SystemState;
use enose_types::{ActivityState, Component, HardwareConstraints};

/// Metering-pump axis travel per millilitre of liquid. The pump lead
/// screws are sized so one axis millimetre displaces one millilitre.
pub(crate) const AXIS_MM_PER_ML: f64 = 1.0;

/// Walk the activity machine along a workflow chain, resuming from the
/// current state when it already sits inside the chain.
pub(crate) fn ensure_activity(system: &SystemState, chain: &[ActivityState]) -> Result<()> {
    let current = system.activity();
    let resume_at = chain
        .iter()
        .position(|state| *state == current)
        .map_or(0, |i| i + 1);
    for state in &chain[resume_at..] {
        system.request_transition(*state)?;
    }
    Ok(())
}

/// Ratio-weighted density of a component set, falling back to 1.0 when
/// any referenced component lacks a known density.
pub(crate) fn weighted_density(hardware: &HardwareConstraints, components: &[Component]) -> f64 {
    let mut sum = 0.0;
    for component in components {
        match hardware
            .liquid(&component.liquid_id)
            .and_then(|l| l.density_g_per_ml)
        {
            Some(density) => sum += component.ratio * density,
            None => return 1.0,
        }
    }
    if sum > 0.0 { sum } else { 1.0 }
}
