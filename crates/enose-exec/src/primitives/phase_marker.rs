//! PhaseMarker: emit an observable annotation. No hardware effect.

use enose_error::{EnoseError, Result};
use enose_types::{
    Action, EngineEvent, ExecutionOutcome, PhaseMarkerAction, PreconditionResult, Step,
};

use crate::context::ExecContext;
use crate::executor::ActionExecutor;

pub struct PhaseMarkerExecutor;

fn action(step: &Step) -> Result<&PhaseMarkerAction> {
    match &step.action {
        Some(Action::PhaseMarker(a)) => Ok(a),
        _ => Err(EnoseError::internal(
            "phase_marker executor dispatched on a non-phase_marker step",
        )),
    }
}

impl ActionExecutor for PhaseMarkerExecutor {
    fn name(&self) -> &'static str {
        "phase_marker"
    }

    fn is_idempotent(&self) -> bool {
        true
    }

    fn check_preconditions(&self, _step: &Step, _ctx: &ExecContext<'_>) -> PreconditionResult {
        PreconditionResult::satisfied()
    }

    fn estimate_duration(&self, _step: &Step, _ctx: &ExecContext<'_>) -> f64 {
        0.0
    }

    fn execute(&self, step: &Step, ctx: &ExecContext<'_>) -> Result<ExecutionOutcome> {
        let a = action(step)?;
        ctx.events.emit(EngineEvent::PhaseMarker {
            phase: a.phase.clone(),
            is_start: a.is_start,
        });
        Ok(ExecutionOutcome::anonymous(0.0))
    }
}
