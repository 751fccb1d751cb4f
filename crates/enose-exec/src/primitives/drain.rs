//! Drain: push the bottle contents to waste until the load cell
//! settles at the dynamic empty weight.

use std::time::{Duration, Instant};

use tracing::info;

use enose_error::{EnoseError, Result};
use enose_state::{ActivityGuard, CoarseGuard};
use enose_types::{Action, ActivityState, DrainAction, ExecutionOutcome, PreconditionResult, Step};

use crate::context::ExecContext;
use crate::executor::{ActionExecutor, ResourceTag};
use crate::observe::{wait_for_empty, EmptyWait};
use crate::primitives::ensure_activity;

pub struct DrainExecutor;

fn action(step: &Step) -> Result<&DrainAction> {
    match &step.action {
        Some(Action::Drain(a)) => Ok(a),
        _ => Err(EnoseError::internal(
            "drain executor dispatched on a non-drain step",
        )),
    }
}

impl ActionExecutor for DrainExecutor {
    fn name(&self) -> &'static str {
        "drain"
    }

    fn is_idempotent(&self) -> bool {
        // Draining an already-empty bottle terminates immediately.
        true
    }

    fn required_resources(&self) -> &'static [ResourceTag] {
        &[ResourceTag::GasPump, ResourceTag::Valves, ResourceTag::Scale]
    }

    fn check_preconditions(&self, _step: &Step, ctx: &ExecContext<'_>) -> PreconditionResult {
        let mut failed = Vec::new();
        if ctx.scale.is_none() {
            failed.push("scale_attached".to_owned());
        }
        if !matches!(
            ctx.system.activity(),
            ActivityState::Idle | ActivityState::DrainPreparing | ActivityState::DrainRunning
        ) {
            failed.push("activity_ready".to_owned());
        }
        PreconditionResult {
            failed_conditions: failed,
        }
    }

    fn estimate_duration(&self, step: &Step, _ctx: &ExecContext<'_>) -> f64 {
        action(step).map_or(0.0, |a| a.timeout_s.max(0.0) / 2.0)
    }

    fn execute(&self, step: &Step, ctx: &ExecContext<'_>) -> Result<ExecutionOutcome> {
        let a = action(step)?;
        ctx.control.check_stop_or_pause()?;
        let scale = ctx.scale()?;

        let coarse_guard = CoarseGuard::begin(ctx.system, "drain", None)?;
        let guard = ActivityGuard::begin(ctx.system, "drain", None)?;
        ensure_activity(
            ctx.system,
            &[ActivityState::DrainPreparing, ActivityState::DrainRunning],
        )?;

        ctx.control.check_stop_or_pause()?;
        ctx.system
            .set_air_pump(ctx.hardware.bound_gas_pwm(a.pump_pwm))?;

        let settled = wait_for_empty(
            scale,
            &EmptyWait {
                baseline_g: ctx.empty_weight.get(),
                tolerance_g: ctx.settings.empty_tolerance_g,
                window: ctx.settings.empty_window,
                deadline: Instant::now() + Duration::from_secs_f64(a.timeout_s.max(0.0)),
                timeout_s: a.timeout_s,
            },
            ctx.control,
            ctx.settings.poll_interval,
        )?;
        ctx.empty_weight.update(settled);
        info!(settled, "drain complete");

        guard.commit_with_state(ActivityState::Idle)?;
        coarse_guard.commit();
        Ok(ExecutionOutcome {
            execution_id: Some(ctx.ids.next(self.name())),
            duration_s: 0.0,
        })
    }
}
