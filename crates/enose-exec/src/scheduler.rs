//! Execution scheduler: the driver loop over a program's steps.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use enose_driver::{Scale, SensorMonitor};
use enose_error::{EnoseError, Result};
use enose_state::SystemState;
use enose_types::{
    CoarseState, EngineEvent, EventSink, ExperimentPhase, ExperimentStatus, HardwareConstraints,
    NullEventSink, Program,
};
use enose_validate::validate;

use crate::context::{DynamicEmptyWeight, ExecContext, ExecutionIdGen};
use crate::control::ControlFlags;
use crate::executor::ExecutorRegistry;
use crate::settings::ExecSettings;

/// Owns the program cursor, the stop/pause pair, and the live status.
///
/// `run` validates first and refuses to start while validation errors
/// remain. Each top-level step dispatches through the registry; the
/// first failure terminates the program, records the failure, and
/// commands the peripherals back to `initial`.
pub struct Scheduler {
    system: Arc<SystemState>,
    registry: Arc<ExecutorRegistry>,
    hardware: HardwareConstraints,
    scale: Option<Arc<dyn Scale>>,
    sensors: Option<Arc<dyn SensorMonitor>>,
    events: Arc<dyn EventSink>,
    settings: ExecSettings,
    control: ControlFlags,
    ids: ExecutionIdGen,
    empty_weight: DynamicEmptyWeight,
    status: Mutex<StatusInner>,
}

struct StatusInner {
    status: ExperimentStatus,
    started: Option<Instant>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        system: Arc<SystemState>,
        registry: Arc<ExecutorRegistry>,
        hardware: HardwareConstraints,
    ) -> Self {
        Self {
            system,
            registry,
            hardware,
            scale: None,
            sensors: None,
            events: Arc::new(NullEventSink),
            settings: ExecSettings::default(),
            control: ControlFlags::new(),
            ids: ExecutionIdGen::new(),
            empty_weight: DynamicEmptyWeight::new(),
            status: Mutex::new(StatusInner {
                status: ExperimentStatus::idle(),
                started: None,
            }),
        }
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Arc<dyn Scale>) -> Self {
        self.scale = Some(scale);
        self
    }

    #[must_use]
    pub fn with_sensors(mut self, sensors: Arc<dyn SensorMonitor>) -> Self {
        self.sensors = Some(sensors);
        self
    }

    /// Attach an event sink. State-machine changes are forwarded to it
    /// as `state_changed` events alongside the step lifecycle.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        let sink = Arc::clone(&events);
        self.system.subscribe(move |event| sink.emit(event.clone()));
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ExecSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The shared state machine.
    #[must_use]
    pub fn system(&self) -> &Arc<SystemState> {
        &self.system
    }

    /// Request a cooperative stop of the running program.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    /// Request a cooperative pause at the next yield point.
    pub fn pause(&self) {
        self.control.request_pause();
    }

    /// Resume a paused program.
    pub fn resume(&self) {
        self.control.resume();
    }

    /// Forget the dynamic empty-weight baseline.
    pub fn reset_empty_weight(&self) {
        self.empty_weight.reset();
    }

    /// Last settled empty-bottle reading, if one has been observed.
    #[must_use]
    pub fn dynamic_empty_weight(&self) -> Option<f64> {
        self.empty_weight.get()
    }

    /// Live status snapshot.
    #[must_use]
    pub fn status(&self) -> ExperimentStatus {
        let inner = self.status.lock();
        let mut status = inner.status.clone();
        if let Some(started) = inner.started {
            status.elapsed_s = started.elapsed().as_secs_f64();
        }
        if status.phase == ExperimentPhase::Running && self.control.is_paused() {
            status.phase = ExperimentPhase::Paused;
        }
        status
    }

    /// Validate and execute a program, blocking until it finishes.
    ///
    /// # Errors
    /// `VALIDATION_FAILED` when errors remain; otherwise the first step
    /// failure, `CANCELLED` included.
    pub fn run(&self, program: &Program) -> Result<()> {
        let report = validate(program, Some(&self.hardware));
        self.events.emit(EngineEvent::ValidationCompleted {
            errors: report.error_count(),
            warnings: report.warning_count(),
        });
        if !report.is_valid() {
            warn!(
                errors = report.error_count(),
                "refusing to start: program has validation errors"
            );
            return Err(EnoseError::ValidationFailed {
                errors: report.error_count(),
            });
        }

        self.control.reset();
        {
            let mut inner = self.status.lock();
            inner.status = ExperimentStatus {
                phase: ExperimentPhase::Running,
                current_step: None,
                total_steps: program.steps.len(),
                current_step_name: None,
                elapsed_s: 0.0,
                last_error: None,
            };
            inner.started = Some(Instant::now());
        }
        info!(steps = program.steps.len(), "program started");

        let result = self.run_steps(program);
        let mut inner = self.status.lock();
        match &result {
            Ok(()) => {
                inner.status.phase = ExperimentPhase::Completed;
                inner.status.current_step = None;
                inner.status.current_step_name = None;
            }
            Err(err) if err.is_cancelled() => {
                inner.status.phase = ExperimentPhase::Stopped;
                inner.status.last_error = Some((err.code().to_owned(), err.to_string()));
            }
            Err(err) => {
                inner.status.phase = ExperimentPhase::Failed;
                inner.status.last_error = Some((err.code().to_owned(), err.to_string()));
            }
        }
        result
    }

    fn context(&self) -> ExecContext<'_> {
        ExecContext::new(
            self.system.as_ref(),
            self.scale.as_deref(),
            self.sensors.as_deref(),
            &self.hardware,
            &self.control,
            self.events.as_ref(),
            &self.empty_weight,
            &self.ids,
            &self.settings,
            self.registry.as_ref(),
        )
    }

    /// Side-effect-free duration estimate for a whole program, seconds.
    #[must_use]
    pub fn estimate_program(&self, program: &Program) -> f64 {
        let ctx = self.context();
        program.steps.iter().map(|step| ctx.estimate_step(step)).sum()
    }

    fn run_steps(&self, program: &Program) -> Result<()> {
        let ctx = self.context();
        for (index, step) in program.steps.iter().enumerate() {
            {
                let mut inner = self.status.lock();
                inner.status.current_step = Some(index);
                inner.status.current_step_name = Some(step.name.clone());
            }
            if let Err(err) = self.control.check_stop_or_pause() {
                self.command_initial();
                return Err(err);
            }
            let path = format!("steps[{index}]");
            if let Err(err) = ctx.run_step(step, &path) {
                error!(path = %path, code = err.code(), %err, "step failed; terminating program");
                self.command_initial();
                return Err(err);
            }
        }
        info!("program completed");
        Ok(())
    }

    /// Best-effort return of the peripherals to the startup state.
    fn command_initial(&self) {
        if let Err(err) = self.system.transition_to(CoarseState::Initial) {
            warn!(%err, "failed to command initial state after termination");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use enose_driver::test_support::{RecordingDriver, ScriptedScale};
    use enose_types::{
        Action, Component, InjectAction, LiquidInventory, LiquidType, MemoryEventSink,
        SetStateAction, Step, WaitAction, WaitCondition,
    };

    fn hardware() -> HardwareConstraints {
        HardwareConstraints {
            bottle_capacity_ml: 60.0,
            max_fill_ml: 50.0,
            max_gas_pump_pwm: 0.9,
            liquids: vec![LiquidInventory {
                id: "analyte".to_owned(),
                name: "Analyte".to_owned(),
                pump_index: 2,
                kind: LiquidType::Sample,
                available_ml: 100.0,
                density_g_per_ml: Some(1.0),
            }],
        }
    }

    struct Rig {
        driver: Arc<RecordingDriver>,
        scale: Arc<ScriptedScale>,
        events: Arc<MemoryEventSink>,
        scheduler: Arc<Scheduler>,
    }

    fn rig() -> Rig {
        let driver = Arc::new(RecordingDriver::new());
        let scale = Arc::new(ScriptedScale::steady(100.0));
        let events = Arc::new(MemoryEventSink::new());
        let system = Arc::new(SystemState::new(driver.clone()));
        let scheduler = Arc::new(
            Scheduler::new(
                system,
                Arc::new(ExecutorRegistry::with_defaults()),
                hardware(),
            )
            .with_scale(scale.clone())
            .with_events(events.clone())
            .with_settings(ExecSettings::fast()),
        );
        Rig {
            driver,
            scale,
            events,
            scheduler,
        }
    }

    // === Test: happy-path single inject ===
    #[test]
    fn test_single_inject_program() {
        let rig = rig();
        let program = Program {
            steps: vec![
                Step::new(
                    "enter inject",
                    Action::SetState(SetStateAction {
                        target: enose_types::CoarseState::Inject,
                    }),
                ),
                Step::new(
                    "fill 10 mL",
                    Action::Inject(InjectAction {
                        volume_ml: Some(10.0),
                        weight_g: None,
                        tolerance_g: 0.5,
                        flow_rate_ml_min: 5.0,
                        stable_timeout_s: 30.0,
                        components: vec![Component {
                            liquid_id: "analyte".to_owned(),
                            ratio: 1.0,
                        }],
                    }),
                ),
            ],
        };

        // The bottle gains 10 g once the move has had time to finish.
        let scale = rig.scale.clone();
        let feeder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(500));
            scale.set_reading(110.0, true);
        });

        rig.scheduler.run(&program).unwrap();
        feeder.join().unwrap();

        // Exactly one parallel move, with the analyte on axis C and the
        // feedrate derived from the flow rate.
        let moves = rig.driver.lines_containing("G1");
        assert_eq!(
            moves,
            vec!["G1 A0.000 B0.000 C10.000 D0.000 H0.000 I0.000 J0.000 K0.000 F300"]
        );
        // The final return to initial async-stops the metering pumps.
        assert_eq!(rig.driver.lines_containing("ENOSE_ASYNC_STOP").len(), 1);
        assert_eq!(
            rig.scheduler.system().coarse(),
            enose_types::CoarseState::Initial
        );
        assert_eq!(
            rig.scheduler.system().activity(),
            enose_types::ActivityState::Idle
        );
        assert_eq!(rig.scheduler.status().phase, ExperimentPhase::Completed);
    }

    // === Test: estimates mirror the step parameters ===
    #[test]
    fn test_program_estimate() {
        let rig = rig();
        let program = Program {
            steps: vec![
                Step::new(
                    "enter inject",
                    Action::SetState(SetStateAction {
                        target: enose_types::CoarseState::Inject,
                    }),
                ),
                Step::new(
                    "fill 10 mL",
                    Action::Inject(InjectAction {
                        volume_ml: Some(10.0),
                        weight_g: None,
                        tolerance_g: 0.5,
                        flow_rate_ml_min: 5.0,
                        stable_timeout_s: 30.0,
                        components: vec![Component {
                            liquid_id: "analyte".to_owned(),
                            ratio: 1.0,
                        }],
                    }),
                ),
            ],
        };
        // 10 mL at 5 mL/min plus the 30 s stabilization window.
        let estimate = rig.scheduler.estimate_program(&program);
        assert!((estimate - 150.0).abs() < 1e-9);
    }

    // === Test: validation errors refuse to start ===
    #[test]
    fn test_refuses_invalid_program() {
        let rig = rig();
        let inject = |ml: f64| {
            Step::new(
                "fill",
                Action::Inject(InjectAction {
                    volume_ml: Some(ml),
                    weight_g: None,
                    tolerance_g: 0.5,
                    flow_rate_ml_min: 5.0,
                    stable_timeout_s: 10.0,
                    components: vec![Component {
                        liquid_id: "analyte".to_owned(),
                        ratio: 1.0,
                    }],
                }),
            )
        };
        let program = Program {
            steps: vec![inject(30.0), inject(30.0)],
        };
        let err = rig.scheduler.run(&program).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(rig.driver.lines().is_empty());
        let events = rig.events.events();
        assert!(matches!(
            events.first(),
            Some(EngineEvent::ValidationCompleted { errors, .. }) if *errors > 0
        ));
    }

    // === Test: an engaged emergency stop refuses every step ===
    #[test]
    fn test_emergency_stop_refuses_steps() {
        let rig = rig();
        rig.scheduler.system().emergency_stop().unwrap();
        let program = Program {
            steps: vec![Step::new(
                "mark",
                Action::PhaseMarker(enose_types::PhaseMarkerAction {
                    phase: "a".to_owned(),
                    is_start: true,
                }),
            )],
        };
        let err = rig.scheduler.run(&program).unwrap_err();
        assert_eq!(err.code(), "EMERGENCY_STOP");
        // Operator recovery restores normal dispatch.
        rig.scheduler.system().recover_from_error().unwrap();
        rig.scheduler.run(&program).unwrap();
    }

    // === Test: a registry without the step's tag aborts the step ===
    #[test]
    fn test_missing_executor_aborts() {
        let driver = Arc::new(RecordingDriver::new());
        let system = Arc::new(SystemState::new(driver));
        let scheduler = Scheduler::new(system, Arc::new(ExecutorRegistry::new()), hardware())
            .with_settings(ExecSettings::fast());
        let program = Program {
            steps: vec![Step::new(
                "mark",
                Action::PhaseMarker(enose_types::PhaseMarkerAction {
                    phase: "a".to_owned(),
                    is_start: true,
                }),
            )],
        };
        let err = scheduler.run(&program).unwrap_err();
        assert_eq!(err.code(), "NO_EXECUTOR");
        assert_eq!(scheduler.status().phase, ExperimentPhase::Failed);
    }

    // === Test: state changes reach the event sink ===
    #[test]
    fn test_state_changes_forwarded_to_sink() {
        let rig = rig();
        let program = Program {
            steps: vec![Step::new(
                "to drain",
                Action::SetState(SetStateAction {
                    target: enose_types::CoarseState::Drain,
                }),
            )],
        };
        rig.scheduler.run(&program).unwrap();
        let events = rig.events.events();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::StateChanged { new, .. } if new == "drain"
        )));
    }

    // === Test: stop during a wait cancels, rolls back, commands initial ===
    #[test]
    fn test_stop_cancels_wait() {
        let rig = rig();
        let program = Program {
            steps: vec![Step::new(
                "hold",
                Action::Wait(WaitAction {
                    condition: Some(WaitCondition::Duration { seconds: 60.0 }),
                    timeout_s: 120.0,
                }),
            )],
        };
        let scheduler = rig.scheduler.clone();
        let runner = std::thread::spawn(move || scheduler.run(&program));
        std::thread::sleep(Duration::from_millis(100));
        rig.scheduler.stop();
        let err = runner.join().unwrap().unwrap_err();
        assert!(err.is_cancelled());

        assert_eq!(
            rig.scheduler.system().coarse(),
            enose_types::CoarseState::Initial
        );
        assert_eq!(rig.scheduler.status().phase, ExperimentPhase::Stopped);
        let events = rig.events.events();
        let last_failure = events
            .iter()
            .rev()
            .find(|e| matches!(e, EngineEvent::StepFailed { .. }))
            .expect("a step_failed event");
        assert!(matches!(
            last_failure,
            EngineEvent::StepFailed { path, code, .. }
                if path == "steps[0]" && code == "CANCELLED"
        ));
    }

    // === Test: pause holds the program at the next yield point ===
    #[test]
    fn test_pause_and_resume() {
        let rig = rig();
        let program = Program {
            steps: vec![Step::new(
                "short hold",
                Action::Wait(WaitAction {
                    condition: Some(WaitCondition::Duration { seconds: 0.2 }),
                    timeout_s: 10.0,
                }),
            )],
        };
        let scheduler = rig.scheduler.clone();
        let runner = std::thread::spawn(move || scheduler.run(&program));
        std::thread::sleep(Duration::from_millis(50));
        rig.scheduler.pause();
        std::thread::sleep(Duration::from_millis(400));
        // The wait would have elapsed by now if the pause were ignored.
        assert!(!runner.is_finished());
        assert_eq!(rig.scheduler.status().phase, ExperimentPhase::Paused);
        rig.scheduler.resume();
        runner.join().unwrap().unwrap();
        assert_eq!(rig.scheduler.status().phase, ExperimentPhase::Completed);
    }
}
