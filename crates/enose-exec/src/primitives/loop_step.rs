//! Loop: bounded iteration over a child step sequence.
//!
//! Children dispatch back through the registry via the context's
//! `run_step`, so a loop body may contain any primitive, including
//! nested loops. The first inner failure aborts remaining iterations.

use tracing::debug;

use enose_error::{EnoseError, Result};
use enose_types::{Action, ExecutionOutcome, LoopAction, PreconditionResult, Step};

use crate::context::ExecContext;
use crate::executor::ActionExecutor;

pub struct LoopExecutor;

fn action(step: &Step) -> Result<&LoopAction> {
    match &step.action {
        Some(Action::Loop(a)) => Ok(a),
        _ => Err(EnoseError::internal(
            "loop executor dispatched on a non-loop step",
        )),
    }
}

impl ActionExecutor for LoopExecutor {
    fn name(&self) -> &'static str {
        "loop"
    }

    fn check_preconditions(&self, _step: &Step, _ctx: &ExecContext<'_>) -> PreconditionResult {
        PreconditionResult::satisfied()
    }

    fn estimate_duration(&self, step: &Step, ctx: &ExecContext<'_>) -> f64 {
        let Ok(a) = action(step) else { return 0.0 };
        let per_iteration: f64 = a.steps.iter().map(|child| ctx.estimate_step(child)).sum();
        per_iteration * f64::from(a.count)
    }

    fn execute(&self, step: &Step, ctx: &ExecContext<'_>) -> Result<ExecutionOutcome> {
        let a = action(step)?;
        for iteration in 0..a.count {
            debug!(iteration, count = a.count, "loop iteration");
            for (index, child) in a.steps.iter().enumerate() {
                ctx.control.check_stop_or_pause()?;
                let path = format!("{}.loop.steps[{index}]", ctx.path());
                ctx.run_step(child, &path)?;
            }
        }
        Ok(ExecutionOutcome::anonymous(0.0))
    }
}
