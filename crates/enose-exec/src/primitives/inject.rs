//! Inject: meter liquid into the bottle and wait for the weight to
//! settle within tolerance.

use std::time::Instant;

use tracing::{debug, info};

use enose_error::{EnoseError, Result, TimeoutKind};
use enose_state::{ActivityGuard, CoarseGuard, InjectMotion};
use enose_types::{
    Action, ActivityState, ExecutionOutcome, InjectAction, PreconditionResult, Step,
    METERING_PUMP_COUNT,
};

use crate::context::ExecContext;
use crate::executor::{ActionExecutor, ResourceTag};
use crate::observe::cooperative_sleep_until;
use crate::primitives::{ensure_activity, weighted_density, AXIS_MM_PER_ML};

pub struct InjectExecutor;

fn action(step: &Step) -> Result<&InjectAction> {
    match &step.action {
        Some(Action::Inject(a)) => Ok(a),
        _ => Err(EnoseError::internal(
            "inject executor dispatched on a non-inject step",
        )),
    }
}

impl InjectExecutor {
    /// Total volume in millilitres from either target form.
    fn total_ml(a: &InjectAction, density: f64) -> Result<f64> {
        match (a.volume_ml, a.weight_g) {
            (Some(volume), _) => Ok(volume),
            (None, Some(weight)) => Ok(weight / density),
            (None, None) => Err(EnoseError::internal(
                "inject without a target; validation should have refused it",
            )),
        }
    }
}

impl ActionExecutor for InjectExecutor {
    fn name(&self) -> &'static str {
        "inject"
    }

    fn required_resources(&self) -> &'static [ResourceTag] {
        &[ResourceTag::MeteringPumps, ResourceTag::Valves, ResourceTag::Scale]
    }

    fn check_preconditions(&self, step: &Step, ctx: &ExecContext<'_>) -> PreconditionResult {
        let mut failed = Vec::new();
        if ctx.scale.is_none() {
            failed.push("scale_attached".to_owned());
        }
        if let Ok(a) = action(step) {
            if a.components.is_empty() {
                failed.push("components_present".to_owned());
            }
            if a.volume_ml.is_none() && a.weight_g.is_none() {
                failed.push("target_specified".to_owned());
            }
            if a.components
                .iter()
                .any(|c| ctx.hardware.liquid(&c.liquid_id).is_none())
            {
                failed.push("liquids_known".to_owned());
            }
        }
        if !matches!(
            ctx.system.activity(),
            ActivityState::Idle | ActivityState::InjectPreparing | ActivityState::InjectRunning
        ) {
            failed.push("activity_ready".to_owned());
        }
        PreconditionResult {
            failed_conditions: failed,
        }
    }

    fn estimate_duration(&self, step: &Step, ctx: &ExecContext<'_>) -> f64 {
        let Ok(a) = action(step) else { return 0.0 };
        let density = weighted_density(ctx.hardware, &a.components);
        let Ok(total) = Self::total_ml(a, density) else {
            return 0.0;
        };
        let motion = if a.flow_rate_ml_min > 0.0 {
            total / a.flow_rate_ml_min * 60.0
        } else {
            0.0
        };
        motion + a.stable_timeout_s.max(0.0)
    }

    fn execute(&self, step: &Step, ctx: &ExecContext<'_>) -> Result<ExecutionOutcome> {
        let a = action(step)?;
        ctx.control.check_stop_or_pause()?;
        let scale = ctx.scale()?;

        let density = weighted_density(ctx.hardware, &a.components);
        let total_ml = Self::total_ml(a, density)?;
        let expected_delta_g = a.weight_g.unwrap_or(total_ml * density);

        let mut distances_mm = [0.0; METERING_PUMP_COUNT];
        for component in &a.components {
            let liquid = ctx.hardware.liquid(&component.liquid_id).ok_or_else(|| {
                EnoseError::internal(format!("unknown liquid `{}`", component.liquid_id))
            })?;
            let pump = usize::from(liquid.pump_index);
            if pump >= METERING_PUMP_COUNT {
                return Err(EnoseError::internal(format!(
                    "pump index {pump} out of range"
                )));
            }
            distances_mm[pump] += total_ml * component.ratio * AXIS_MM_PER_ML;
        }

        let coarse_guard = CoarseGuard::begin(ctx.system, "inject", None)?;
        let guard = ActivityGuard::begin(ctx.system, "inject", None)?;
        ensure_activity(
            ctx.system,
            &[ActivityState::InjectPreparing, ActivityState::InjectRunning],
        )?;

        let start_g = scale.read()?.grams;
        ctx.control.check_stop_or_pause()?;
        let speed_mm_s = a.flow_rate_ml_min * AXIS_MM_PER_ML;
        ctx.system.start_inject(&InjectMotion {
            distances_mm,
            speed_mm_s,
        })?;
        info!(total_ml, expected_delta_g, "injection move running");

        // Let the parallel move play out before watching the scale.
        let longest_mm = distances_mm.iter().fold(0.0_f64, |acc, d| acc.max(*d));
        if speed_mm_s > 0.0 && longest_mm > 0.0 {
            let motion_end =
                Instant::now() + std::time::Duration::from_secs_f64(longest_mm / speed_mm_s);
            cooperative_sleep_until(motion_end, ctx.control, ctx.settings.poll_interval)?;
        }

        ensure_activity(ctx.system, &[ActivityState::InjectStabilizing])?;
        let deadline = Instant::now()
            + std::time::Duration::from_secs_f64(a.stable_timeout_s.max(0.0));
        loop {
            ctx.control.check_stop_or_pause()?;
            if Instant::now() >= deadline {
                return Err(EnoseError::Timeout {
                    kind: TimeoutKind::WeightStability,
                    deadline_s: a.stable_timeout_s,
                });
            }
            let reading = scale.read()?;
            let delta = reading.grams - start_g;
            if reading.stable && (delta - expected_delta_g).abs() <= a.tolerance_g {
                debug!(delta, "injection weight settled");
                break;
            }
            std::thread::sleep(ctx.settings.poll_interval);
        }

        guard.commit_with_state(ActivityState::Idle)?;
        coarse_guard.commit();
        Ok(ExecutionOutcome {
            execution_id: Some(ctx.ids.next(self.name())),
            duration_s: 0.0,
        })
    }
}
