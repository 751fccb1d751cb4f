//! Wash: sugar over `repeat_count × { inject(rinse) → drain }` with an
//! optional trailing drain. The synthesized child steps dispatch back
//! through the registry, so they get the full guard/precondition
//! treatment of first-class steps.

use enose_error::{EnoseError, Result};
use enose_types::{
    Action, Component, DrainAction, ExecutionOutcome, InjectAction, LiquidType,
    PreconditionResult, Step, WashAction,
};

use crate::context::ExecContext;
use crate::executor::{ActionExecutor, ResourceTag};

/// Settled-weight tolerance for rinse injections, grams.
const RINSE_TOLERANCE_G: f64 = 1.0;
/// Stabilization timeout for rinse injections, seconds.
const RINSE_STABLE_TIMEOUT_S: f64 = 30.0;

pub struct WashExecutor;

fn action(step: &Step) -> Result<&WashAction> {
    match &step.action {
        Some(Action::Wash(a)) => Ok(a),
        _ => Err(EnoseError::internal(
            "wash executor dispatched on a non-wash step",
        )),
    }
}

impl WashExecutor {
    fn rinse_liquid_id(a: &WashAction, ctx: &ExecContext<'_>) -> Result<String> {
        if let Some(id) = &a.liquid_id {
            return Ok(id.clone());
        }
        ctx.hardware
            .first_of_kind(LiquidType::Rinse)
            .map(|l| l.id.clone())
            .ok_or_else(|| EnoseError::internal("no rinse-type liquid in the inventory"))
    }

    fn inject_step(a: &WashAction, liquid_id: &str) -> Step {
        Step::new(
            "wash rinse",
            Action::Inject(InjectAction {
                volume_ml: Some(a.volume_ml),
                weight_g: None,
                tolerance_g: RINSE_TOLERANCE_G,
                flow_rate_ml_min: a.flow_rate_ml_min,
                stable_timeout_s: RINSE_STABLE_TIMEOUT_S,
                components: vec![Component {
                    liquid_id: liquid_id.to_owned(),
                    ratio: 1.0,
                }],
            }),
        )
    }

    fn drain_step(a: &WashAction) -> Step {
        Step::new(
            "wash drain",
            Action::Drain(DrainAction {
                pump_pwm: a.drain_pwm,
                timeout_s: a.drain_timeout_s,
            }),
        )
    }
}

impl ActionExecutor for WashExecutor {
    fn name(&self) -> &'static str {
        "wash"
    }

    fn required_resources(&self) -> &'static [ResourceTag] {
        &[
            ResourceTag::MeteringPumps,
            ResourceTag::GasPump,
            ResourceTag::Valves,
            ResourceTag::Scale,
        ]
    }

    fn check_preconditions(&self, step: &Step, ctx: &ExecContext<'_>) -> PreconditionResult {
        let mut failed = Vec::new();
        if ctx.scale.is_none() {
            failed.push("scale_attached".to_owned());
        }
        if let Ok(a) = action(step) {
            if Self::rinse_liquid_id(a, ctx).is_err() {
                failed.push("rinse_liquid_available".to_owned());
            }
        }
        PreconditionResult {
            failed_conditions: failed,
        }
    }

    fn estimate_duration(&self, step: &Step, _ctx: &ExecContext<'_>) -> f64 {
        let Ok(a) = action(step) else { return 0.0 };
        let inject_s = if a.flow_rate_ml_min > 0.0 {
            a.volume_ml / a.flow_rate_ml_min * 60.0
        } else {
            0.0
        };
        let per_cycle = inject_s + a.drain_timeout_s.max(0.0) / 2.0;
        let trailing = if a.final_drain {
            a.drain_timeout_s.max(0.0) / 2.0
        } else {
            0.0
        };
        per_cycle * f64::from(a.repeat_count) + trailing
    }

    fn execute(&self, step: &Step, ctx: &ExecContext<'_>) -> Result<ExecutionOutcome> {
        let a = action(step)?;
        let liquid_id = Self::rinse_liquid_id(a, ctx)?;
        let inject = Self::inject_step(a, &liquid_id);
        let drain = Self::drain_step(a);

        for cycle in 0..a.repeat_count {
            ctx.control.check_stop_or_pause()?;
            ctx.run_step(&inject, &format!("{}.wash[{cycle}].inject", ctx.path()))?;
            ctx.run_step(&drain, &format!("{}.wash[{cycle}].drain", ctx.path()))?;
        }
        if a.final_drain {
            ctx.control.check_stop_or_pause()?;
            ctx.run_step(&drain, &format!("{}.wash.final_drain", ctx.path()))?;
        }
        Ok(ExecutionOutcome {
            execution_id: Some(ctx.ids.next(self.name())),
            duration_s: 0.0,
        })
    }
}
