//! SetState: force the rig into a coarse state and lift the activity
//! machine to match. Committed immediately; no rollback expected.

use enose_error::{EnoseError, Result};
use enose_state::ActivityGuard;
use enose_types::{
    Action, ActivityState, ExecutionOutcome, PreconditionResult, SetStateAction, Step,
};

use crate::context::ExecContext;
use crate::executor::{ActionExecutor, ResourceTag};

pub struct SetStateExecutor;

fn action(step: &Step) -> Result<&SetStateAction> {
    match &step.action {
        Some(Action::SetState(a)) => Ok(a),
        _ => Err(EnoseError::internal(
            "set_state executor dispatched on a non-set_state step",
        )),
    }
}

impl ActionExecutor for SetStateExecutor {
    fn name(&self) -> &'static str {
        "set_state"
    }

    fn is_idempotent(&self) -> bool {
        true
    }

    fn required_resources(&self) -> &'static [ResourceTag] {
        &[ResourceTag::Valves, ResourceTag::GasPump, ResourceTag::CleaningPump]
    }

    fn check_preconditions(&self, _step: &Step, _ctx: &ExecContext<'_>) -> PreconditionResult {
        PreconditionResult::satisfied()
    }

    fn estimate_duration(&self, _step: &Step, _ctx: &ExecContext<'_>) -> f64 {
        0.0
    }

    fn execute(&self, step: &Step, ctx: &ExecContext<'_>) -> Result<ExecutionOutcome> {
        let a = action(step)?;
        ctx.control.check_stop_or_pause()?;
        let guard = ActivityGuard::begin(ctx.system, "set_state", None)?;
        ctx.system
            .force_transition(ActivityState::lift(a.target))?;
        guard.commit();
        Ok(ExecutionOutcome::anonymous(0.0))
    }
}
