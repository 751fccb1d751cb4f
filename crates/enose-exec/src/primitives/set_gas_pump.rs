//! SetGasPump: one PWM command, bounded by the hardware maximum.

use enose_error::{EnoseError, Result};
use enose_types::{Action, ExecutionOutcome, PreconditionResult, SetGasPumpAction, Step};

use crate::context::ExecContext;
use crate::executor::{ActionExecutor, ResourceTag};

pub struct SetGasPumpExecutor;

fn action(step: &Step) -> Result<&SetGasPumpAction> {
    match &step.action {
        Some(Action::SetGasPump(a)) => Ok(a),
        _ => Err(EnoseError::internal(
            "set_gas_pump executor dispatched on a non-set_gas_pump step",
        )),
    }
}

impl ActionExecutor for SetGasPumpExecutor {
    fn name(&self) -> &'static str {
        "set_gas_pump"
    }

    fn is_idempotent(&self) -> bool {
        true
    }

    fn required_resources(&self) -> &'static [ResourceTag] {
        &[ResourceTag::GasPump]
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
        ctx.system
            .set_air_pump(ctx.hardware.bound_gas_pwm(a.pwm))?;
        Ok(ExecutionOutcome::anonymous(0.0))
    }
}
