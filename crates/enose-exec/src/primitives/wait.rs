//! Wait: block until a condition holds, without changing peripheral
//! state. The guard targets the current state; commit keeps it.

use std::time::{Duration, Instant};

use enose_error::{EnoseError, Result, TimeoutKind};
use enose_state::ActivityGuard;
use enose_types::{
    Action, ExecutionOutcome, PreconditionResult, Step, WaitAction, WaitCondition,
};

use crate::context::ExecContext;
use crate::executor::{ActionExecutor, ResourceTag};
use crate::observe::{cooperative_sleep_until, wait_for_empty, EmptyWait, StabilityWindow};
use crate::DEFAULT_HEATER_CYCLE_S;

pub struct WaitExecutor;

fn action(step: &Step) -> Result<&WaitAction> {
    match &step.action {
        Some(Action::Wait(a)) => Ok(a),
        _ => Err(EnoseError::internal(
            "wait executor dispatched on a non-wait step",
        )),
    }
}

impl ActionExecutor for WaitExecutor {
    fn name(&self) -> &'static str {
        "wait"
    }

    fn is_idempotent(&self) -> bool {
        true
    }

    fn required_resources(&self) -> &'static [ResourceTag] {
        &[ResourceTag::Scale]
    }

    fn check_preconditions(&self, step: &Step, ctx: &ExecContext<'_>) -> PreconditionResult {
        let mut failed = Vec::new();
        if let Ok(a) = action(step) {
            match &a.condition {
                Some(WaitCondition::HeaterCycles { .. }) if ctx.sensors.is_none() => {
                    failed.push("sensor_monitor_attached".to_owned());
                }
                Some(
                    WaitCondition::Stability { .. }
                    | WaitCondition::Weight { .. }
                    | WaitCondition::Empty,
                ) if ctx.scale.is_none() => {
                    failed.push("scale_attached".to_owned());
                }
                _ => {}
            }
        }
        PreconditionResult {
            failed_conditions: failed,
        }
    }

    fn estimate_duration(&self, step: &Step, _ctx: &ExecContext<'_>) -> f64 {
        let Ok(a) = action(step) else { return 0.0 };
        let raw = match &a.condition {
            None => return 0.0,
            Some(WaitCondition::Duration { seconds }) => *seconds,
            Some(WaitCondition::HeaterCycles { cycles }) => {
                f64::from(*cycles) * DEFAULT_HEATER_CYCLE_S
            }
            Some(WaitCondition::Stability { window_s, .. }) => *window_s,
            Some(WaitCondition::Weight { .. } | WaitCondition::Empty) => a.timeout_s / 2.0,
        };
        if a.timeout_s > 0.0 {
            raw.min(a.timeout_s).max(0.0)
        } else {
            raw.max(0.0)
        }
    }

    fn execute(&self, step: &Step, ctx: &ExecContext<'_>) -> Result<ExecutionOutcome> {
        let a = action(step)?;
        let condition = a.condition.as_ref().ok_or_else(|| {
            EnoseError::internal("wait without a condition; validation should have refused it")
        })?;
        ctx.control.check_stop_or_pause()?;

        // No state change required; the guard restores the entry state
        // only if the wait fails mid-flight.
        let guard = ActivityGuard::begin(ctx.system, "wait", None)?;

        let started = Instant::now();
        let deadline = if a.timeout_s > 0.0 {
            started + Duration::from_secs_f64(a.timeout_s)
        } else {
            started + Duration::from_secs(86_400)
        };
        let timeout = || EnoseError::Timeout {
            kind: TimeoutKind::WaitCondition,
            deadline_s: a.timeout_s,
        };

        match condition {
            WaitCondition::Duration { seconds } => {
                let end = started + Duration::from_secs_f64(seconds.max(0.0));
                if end > deadline {
                    cooperative_sleep_until(deadline, ctx.control, ctx.settings.poll_interval)?;
                    return Err(timeout());
                }
                cooperative_sleep_until(end, ctx.control, ctx.settings.poll_interval)?;
            }
            WaitCondition::HeaterCycles { cycles } => {
                let monitor = ctx
                    .sensors
                    .ok_or_else(|| EnoseError::internal("no sensor monitor attached"))?;
                let start_count = monitor.heater_cycles();
                loop {
                    ctx.control.check_stop_or_pause()?;
                    if monitor.heater_cycles() - start_count >= u64::from(*cycles) {
                        break;
                    }
                    if Instant::now() >= deadline {
                        return Err(timeout());
                    }
                    std::thread::sleep(ctx.settings.poll_interval);
                }
            }
            WaitCondition::Stability {
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
                    if Instant::now() >= deadline {
                        return Err(timeout());
                    }
                    std::thread::sleep(ctx.settings.poll_interval);
                }
            }
            WaitCondition::Weight { threshold_g } => {
                let scale = ctx.scale()?;
                loop {
                    ctx.control.check_stop_or_pause()?;
                    if scale.read()?.grams >= *threshold_g {
                        break;
                    }
                    if Instant::now() >= deadline {
                        return Err(timeout());
                    }
                    std::thread::sleep(ctx.settings.poll_interval);
                }
            }
            WaitCondition::Empty => {
                // Same observation algorithm as a drain, with no valve
                // movement.
                let scale = ctx.scale()?;
                let settled = wait_for_empty(
                    scale,
                    &EmptyWait {
                        baseline_g: ctx.empty_weight.get(),
                        tolerance_g: ctx.settings.empty_tolerance_g,
                        window: ctx.settings.empty_window,
                        deadline,
                        timeout_s: a.timeout_s,
                    },
                    ctx.control,
                    ctx.settings.poll_interval,
                )?;
                ctx.empty_weight.update(settled);
            }
        }

        guard.commit();
        Ok(ExecutionOutcome {
            execution_id: Some(ctx.ids.next(self.name())),
            duration_s: 0.0,
        })
    }
}
