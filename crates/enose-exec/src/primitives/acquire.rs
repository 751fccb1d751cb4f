//! Acquire: pull gas through the sensor chamber until a termination
//! criterion fires.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use enose_error::{EnoseError, Result, TimeoutKind};
use enose_state::{ActivityGuard, CoarseGuard};
use enose_types::{
    AcquireAction, AcquireTermination, Action, ActivityState, ExecutionOutcome,
    PreconditionResult, Step,
};

use crate::context::ExecContext;
use crate::executor::{ActionExecutor, ResourceTag};
use crate::observe::{cooperative_sleep_until, StabilityWindow};
use crate::primitives::ensure_activity;
use crate::DEFAULT_HEATER_CYCLE_S;

pub struct AcquireExecutor;

fn action(step: &Step) -> Result<&AcquireAction> {
    match &step.action {
        Some(Action::Acquire(a)) => Ok(a),
        _ => Err(EnoseError::internal(
            "acquire executor dispatched on a non-acquire step",
        )),
    }
}

impl ActionExecutor for AcquireExecutor {
    fn name(&self) -> &'static str {
        "acquire"
    }

    fn required_resources(&self) -> &'static [ResourceTag] {
        &[
            ResourceTag::GasPump,
            ResourceTag::Valves,
            ResourceTag::Heater,
            ResourceTag::Scale,
        ]
    }

    fn check_preconditions(&self, step: &Step, ctx: &ExecContext<'_>) -> PreconditionResult {
        let mut failed = Vec::new();
        if let Ok(a) = action(step) {
            match &a.termination {
                Some(AcquireTermination::HeaterCycles { .. }) if ctx.sensors.is_none() => {
                    failed.push("sensor_monitor_attached".to_owned());
                }
                Some(
                    AcquireTermination::Stability { .. } | AcquireTermination::Weight { .. },
                ) if ctx.scale.is_none() => {
                    failed.push("scale_attached".to_owned());
                }
                _ => {}
            }
        }
        if !matches!(
            ctx.system.activity(),
            ActivityState::Idle | ActivityState::SamplePreparing | ActivityState::SampleAcquiring
        ) {
            failed.push("activity_ready".to_owned());
        }
        PreconditionResult {
            failed_conditions: failed,
        }
    }

    fn estimate_duration(&self, step: &Step, _ctx: &ExecContext<'_>) -> f64 {
        let Ok(a) = action(step) else { return 0.0 };
        let raw = match &a.termination {
            None => return 0.0,
            Some(AcquireTermination::Duration { seconds }) => *seconds,
            Some(AcquireTermination::HeaterCycles { cycles }) => {
                f64::from(*cycles) * DEFAULT_HEATER_CYCLE_S
            }
            Some(AcquireTermination::Stability { window_s, .. }) => *window_s,
            Some(AcquireTermination::Weight { .. }) => a.max_duration_s / 2.0,
        };
        if a.max_duration_s > 0.0 {
            raw.min(a.max_duration_s).max(0.0)
        } else {
            raw.max(0.0)
        }
    }

    fn execute(&self, step: &Step, ctx: &ExecContext<'_>) -> Result<ExecutionOutcome> {
        let a = action(step)?;
        let termination = a.termination.as_ref().ok_or_else(|| {
            EnoseError::internal("acquire without a termination; validation should have refused it")
        })?;
        ctx.control.check_stop_or_pause()?;

        let coarse_guard = CoarseGuard::begin(ctx.system, "acquire", None)?;
        let guard = ActivityGuard::begin(ctx.system, "acquire", None)?;
        ensure_activity(
            ctx.system,
            &[ActivityState::SamplePreparing, ActivityState::SampleAcquiring],
        )?;

        ctx.control.check_stop_or_pause()?;
        ctx.system
            .set_air_pump(ctx.hardware.bound_gas_pwm(a.pump_pwm))?;

        let started = Instant::now();
        let ceiling = if a.max_duration_s > 0.0 {
            started + Duration::from_secs_f64(a.max_duration_s)
        } else {
            // No ceiling configured; validation warns about this.
            started + Duration::from_secs(86_400)
        };
        let timeout = || EnoseError::Timeout {
            kind: TimeoutKind::AcquireCeiling,
            deadline_s: a.max_duration_s,
        };

        match termination {
            AcquireTermination::Duration { seconds } => {
                let end = started + Duration::from_secs_f64(seconds.max(0.0));
                cooperative_sleep_until(end.min(ceiling), ctx.control, ctx.settings.poll_interval)?;
            }
            AcquireTermination::HeaterCycles { cycles } => {
                let monitor = ctx
                    .sensors
                    .ok_or_else(|| EnoseError::internal("no sensor monitor attached"))?;
                let start_count = monitor.heater_cycles();
                loop {
                    ctx.control.check_stop_or_pause()?;
                    let seen = monitor.heater_cycles() - start_count;
                    if seen >= u64::from(*cycles) {
                        debug!(seen, "heater-cycle target reached");
                        break;
                    }
                    if Instant::now() >= ceiling {
                        return Err(timeout());
                    }
                    std::thread::sleep(ctx.settings.poll_interval);
                }
            }
            AcquireTermination::Stability {
                window_s,
                max_slope_g_per_s,
            } => {
                let scale = ctx.scale()?;
                let mut window = StabilityWindow::new(
                    Duration::from_secs_f64(window_s.max(0.0)),
                    *max_slope_g_per_s,
                );
                loop {
                    ctx.control.check_stop_or_pause()?;
                    let reading = scale.read()?;
                    window.push(Instant::now(), reading.grams);
                    if window.is_stable() {
                        break;
                    }
                    if Instant::now() >= ceiling {
                        return Err(timeout());
                    }
                    std::thread::sleep(ctx.settings.poll_interval);
                }
            }
            AcquireTermination::Weight {
                target_g,
                tolerance_g,
            } => {
                let scale = ctx.scale()?;
                loop {
                    ctx.control.check_stop_or_pause()?;
                    let reading = scale.read()?;
                    if reading.stable && (reading.grams - target_g).abs() <= *tolerance_g {
                        break;
                    }
                    if Instant::now() >= ceiling {
                        return Err(timeout());
                    }
                    std::thread::sleep(ctx.settings.poll_interval);
                }
            }
        }
        info!(elapsed_s = started.elapsed().as_secs_f64(), "acquisition finished");

        guard.commit_with_state(ActivityState::Idle)?;
        coarse_guard.commit();
        Ok(ExecutionOutcome {
            execution_id: Some(ctx.ids.next(self.name())),
            duration_s: 0.0,
        })
    }
}
