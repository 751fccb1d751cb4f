//! Shared execution context handed to every primitive executor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::debug;

use enose_driver::{Scale, SensorMonitor};
use enose_error::{EnoseError, Result};
use enose_state::SystemState;
use enose_types::{
    ActivityState, EngineEvent, EventSink, ExecutionOutcome, HardwareConstraints, Step,
};

use crate::executor::ExecutorRegistry;
use crate::settings::ExecSettings;

// ---------------------------------------------------------------------------
// Execution ids
// ---------------------------------------------------------------------------

/// Generator of advisory execution ids: `<name>_<millis>_<counter>`.
///
/// The counter is shared and monotonic; the ids allow an external
/// persistence layer to deduplicate at-most-once. The engine itself
/// never checks them.
#[derive(Debug, Default)]
pub struct ExecutionIdGen {
    counter: AtomicU64,
}

impl ExecutionIdGen {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next id for `name`.
    #[must_use]
    pub fn next(&self, name: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{name}_{millis}_{n}")
    }
}

// ---------------------------------------------------------------------------
// Dynamic empty weight
// ---------------------------------------------------------------------------

/// Running baseline of the empty bottle as observed by the load cell.
///
/// Updated after every successful drain (and empty-wait) with the
/// settled reading; the next cycle's gross→net delta starts from it.
#[derive(Debug, Default)]
pub struct DynamicEmptyWeight {
    grams: Mutex<Option<f64>>,
}

impl DynamicEmptyWeight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed settled empty reading, if any.
    #[must_use]
    pub fn get(&self) -> Option<f64> {
        *self.grams.lock()
    }

    /// Record a new settled empty reading.
    pub fn update(&self, grams: f64) {
        debug!(grams, "dynamic empty weight updated");
        *self.grams.lock() = Some(grams);
    }

    /// Forget the running baseline.
    pub fn reset(&self) {
        *self.grams.lock() = None;
    }
}

// ---------------------------------------------------------------------------
// ExecContext
// ---------------------------------------------------------------------------

/// Everything a primitive executor needs, borrowed from the scheduler
/// for the duration of one run.
pub struct ExecContext<'a> {
    pub system: &'a SystemState,
    pub scale: Option<&'a dyn Scale>,
    pub sensors: Option<&'a dyn SensorMonitor>,
    pub hardware: &'a HardwareConstraints,
    pub control: &'a crate::control::ControlFlags,
    pub events: &'a dyn EventSink,
    pub empty_weight: &'a DynamicEmptyWeight,
    pub ids: &'a ExecutionIdGen,
    pub settings: &'a ExecSettings,
    pub(crate) registry: &'a ExecutorRegistry,
    path: String,
}

impl<'a> ExecContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        system: &'a SystemState,
        scale: Option<&'a dyn Scale>,
        sensors: Option<&'a dyn SensorMonitor>,
        hardware: &'a HardwareConstraints,
        control: &'a crate::control::ControlFlags,
        events: &'a dyn EventSink,
        empty_weight: &'a DynamicEmptyWeight,
        ids: &'a ExecutionIdGen,
        settings: &'a ExecSettings,
        registry: &'a ExecutorRegistry,
    ) -> Self {
        Self {
            system,
            scale,
            sensors,
            hardware,
            control,
            events,
            empty_weight,
            ids,
            settings,
            registry,
            path: String::new(),
        }
    }

    /// Structured path of the step currently executing.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The attached scale, or `SCALE_UNAVAILABLE`.
    pub fn scale(&self) -> Result<&'a dyn Scale> {
        self.scale.ok_or(EnoseError::ScaleUnavailable)
    }

    /// Dispatch one step through the registry, with preconditions and
    /// event bookkeeping. Used by the scheduler for top-level steps and
    /// re-entered by the `loop` and `wash` executors for child steps.
    pub fn run_step(&self, step: &Step, path: &str) -> Result<ExecutionOutcome> {
        // An engaged emergency stop outranks every step; only an
        // explicit operator recovery clears it.
        if self.system.activity() == ActivityState::EmergencyStop {
            return Err(EnoseError::EmergencyStop);
        }
        let Some(action) = &step.action else {
            return Err(EnoseError::internal(format!(
                "step `{}` has no action; validation should have refused it",
                step.name
            )));
        };
        let tag = action.tag();
        let Some(executor) = self.registry.get(tag) else {
            return Err(EnoseError::NoExecutor {
                tag: tag.key().to_owned(),
            });
        };

        let child = self.at_path(path.to_owned());
        let preconditions = executor.check_preconditions(step, &child);
        if !preconditions.is_satisfied() {
            self.events.emit(EngineEvent::StepFailed {
                path: path.to_owned(),
                code: "PRECONDITION_FAILED".to_owned(),
                message: preconditions.failed_conditions.join(", "),
            });
            return Err(EnoseError::PreconditionFailed {
                failed: preconditions.failed_conditions,
            });
        }

        self.events.emit(EngineEvent::StepStarted {
            path: path.to_owned(),
            name: step.name.clone(),
        });
        let started = Instant::now();
        match executor.execute(step, &child) {
            Ok(mut outcome) => {
                outcome.duration_s = started.elapsed().as_secs_f64();
                self.events.emit(EngineEvent::StepCompleted {
                    path: path.to_owned(),
                    duration_s: outcome.duration_s,
                });
                Ok(outcome)
            }
            Err(err) => {
                self.events.emit(EngineEvent::StepFailed {
                    path: path.to_owned(),
                    code: err.code().to_owned(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Side-effect-free duration estimate for one step, in seconds.
    #[must_use]
    pub fn estimate_step(&self, step: &Step) -> f64 {
        step.action
            .as_ref()
            .and_then(|action| self.registry.get(action.tag()))
            .map_or(0.0, |executor| executor.estimate_duration(step, self))
    }

    fn at_path(&self, path: String) -> ExecContext<'a> {
        ExecContext {
            system: self.system,
            scale: self.scale,
            sensors: self.sensors,
            hardware: self.hardware,
            control: self.control,
            events: self.events,
            empty_weight: self.empty_weight,
            ids: self.ids,
            settings: self.settings,
            registry: self.registry,
            path,
        }
    }
}
