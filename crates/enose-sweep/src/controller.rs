//! The sweep worker and its injected hardware callbacks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use enose_driver::WeightReading;
use enose_error::{EnoseError, Result};
use enose_types::{CoarseState, EngineEvent, EventSink, NullEventSink, METERING_PUMP_COUNT};

use crate::run::{
    CyclePhase, LogEntry, ParamSet, StepDurations, SweepConfig, SweepStatus, TestResult,
};
use crate::store::RunStore;

/// Bounded ring of worker log lines.
const LOG_CAPACITY: usize = 100;

type StateFn = dyn Fn(CoarseState) -> Result<()> + Send + Sync;
type InjectFn = dyn Fn(&[f64; METERING_PUMP_COUNT], f64, f64) -> Result<()> + Send + Sync;
type EmptyFn = dyn Fn(f64, f64, f64) -> Result<f64> + Send + Sync;
type WeightFn = dyn Fn() -> Result<WeightReading> + Send + Sync;
type ResetFn = dyn Fn() + Send + Sync;

/// The five hardware callbacks the controller drives.
pub struct SweepCallbacks {
    /// Force a coarse peripheral state.
    pub set_system_state: Box<StateFn>,
    /// Launch a parallel injection move: volumes, speed, acceleration.
    pub start_injection: Box<InjectFn>,
    /// Observe the load cell until empty: tolerance, timeout, window
    /// (all in g / s / s). Returns the settled reading.
    pub wait_for_empty_bottle: Box<EmptyFn>,
    /// Instantaneous weight and stability flag.
    pub get_weight: Box<WeightFn>,
    /// Forget the engine-side dynamic empty baseline.
    pub reset_dynamic_empty_weight: Box<ResetFn>,
}

struct Shared {
    callbacks: SweepCallbacks,
    store: Option<Arc<dyn RunStore>>,
    events: Arc<dyn EventSink>,
    status: Mutex<SweepStatus>,
    logs: Mutex<VecDeque<LogEntry>>,
    results: Mutex<Vec<TestResult>>,
    stop: AtomicBool,
    running: AtomicBool,
}

/// Runs parameter sweeps on a background worker thread.
pub struct SweepController {
    shared: Arc<Shared>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

impl SweepController {
    #[must_use]
    pub fn new(callbacks: SweepCallbacks) -> Self {
        Self::configured(callbacks, None, Arc::new(NullEventSink))
    }

    /// Controller with persistence and an event sink attached.
    #[must_use]
    pub fn configured(
        callbacks: SweepCallbacks,
        store: Option<Arc<dyn RunStore>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                callbacks,
                store,
                events,
                status: Mutex::new(SweepStatus::idle()),
                logs: Mutex::new(VecDeque::with_capacity(LOG_CAPACITY)),
                results: Mutex::new(Vec::new()),
                stop: AtomicBool::new(false),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Launch the sweep worker.
    ///
    /// # Errors
    /// `INTERNAL` when a sweep is already running or the configuration
    /// has no parameter sets.
    pub fn start(&self, run_id: impl Into<String>, config: SweepConfig) -> Result<JoinHandle<()>> {
        if config.param_sets.is_empty() {
            return Err(EnoseError::internal("sweep has no parameter sets"));
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(EnoseError::internal("a sweep is already running"));
        }
        let run_id = run_id.into();
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.results.lock().clear();
        {
            let mut status = self.shared.status.lock();
            *status = SweepStatus::idle();
            status.run_id = Some(run_id.clone());
            status.global_total_cycles = config.total_cycles();
        }
        if let Some(store) = &self.shared.store {
            store.create_run(&run_id, &config)?;
        }
        info!(run_id = %run_id, total_cycles = config.total_cycles(), "sweep started");

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::spawn(move || {
            match Worker::new(&shared, &run_id, &config).run_all() {
                Ok(finished) => {
                    let phase = if finished {
                        CyclePhase::Complete
                    } else {
                        // Stopped: the worker already returned hardware
                        // to initial during the stopping phase.
                        CyclePhase::Idle
                    };
                    shared.set_phase(&run_id, phase);
                    if finished {
                        if let Some(store) = &shared.store {
                            if let Err(err) = store.complete_run(&run_id) {
                                warn!(%err, "complete_run failed");
                            }
                        }
                    }
                }
                Err(err) if err.is_cancelled() => {
                    // Stop landed inside an observation; unwind the
                    // same way as a stop between cycles.
                    shared.set_phase(&run_id, CyclePhase::Stopping);
                    shared.log("stop requested");
                    if let Err(reset_err) =
                        (shared.callbacks.set_system_state)(CoarseState::Initial)
                    {
                        warn!(%reset_err, "failed to return hardware to initial");
                    }
                    shared.set_phase(&run_id, CyclePhase::Idle);
                }
                Err(err) => {
                    error!(%err, "sweep worker failed");
                    shared.status.lock().last_error = Some(err.to_string());
                    shared.set_phase(&run_id, CyclePhase::Error);
                    if let Err(reset_err) =
                        (shared.callbacks.set_system_state)(CoarseState::Initial)
                    {
                        warn!(%reset_err, "failed to return hardware to initial");
                    }
                }
            }
            shared.running.store(false, Ordering::SeqCst);
        });
        Ok(handle)
    }

    /// Request the worker to stop after the current observation.
    pub fn stop_test(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Live status snapshot.
    #[must_use]
    pub fn status(&self) -> SweepStatus {
        self.shared.status.lock().clone()
    }

    /// Completed cycle rows, oldest first.
    #[must_use]
    pub fn results(&self) -> Vec<TestResult> {
        self.shared.results.lock().clone()
    }

    /// Recent worker log lines, oldest first.
    #[must_use]
    pub fn logs(&self) -> Vec<LogEntry> {
        self.shared.logs.lock().iter().cloned().collect()
    }
}

impl Shared {
    fn set_phase(&self, run_id: &str, phase: CyclePhase) {
        self.status.lock().phase = phase;
        if let Some(store) = &self.store {
            if let Err(err) = store.update_run_state(run_id, phase) {
                warn!(%err, "update_run_state failed");
            }
        }
    }

    fn log(&self, message: impl Into<String>) {
        let mut logs = self.logs.lock();
        if logs.len() == LOG_CAPACITY {
            logs.pop_front();
        }
        logs.push_back(LogEntry {
            timestamp_ms: now_ms(),
            message: message.into(),
        });
    }
}

struct Worker<'a> {
    shared: &'a Shared,
    run_id: &'a str,
    config: &'a SweepConfig,
    global_cycle: u32,
}

impl<'a> Worker<'a> {
    fn new(shared: &'a Shared, run_id: &'a str, config: &'a SweepConfig) -> Self {
        Self {
            shared,
            run_id,
            config,
            global_cycle: 0,
        }
    }

    /// Run every parameter set. Returns `false` when stopped early.
    fn run_all(&mut self) -> Result<bool> {
        (self.shared.callbacks.reset_dynamic_empty_weight)();
        for (set_index, set) in self.config.param_sets.iter().enumerate() {
            self.shared.status.lock().param_set_index = set_index;
            self.shared.log(format!("parameter set `{}` starting", set.name));
            for cycle in 0..set.cycles {
                if self.stopping()? {
                    return Ok(false);
                }
                self.global_cycle += 1;
                {
                    let mut status = self.shared.status.lock();
                    status.cycle_in_set = cycle + 1;
                    status.global_cycle = self.global_cycle;
                }
                self.run_cycle(set)?;
            }
        }
        (self.shared.callbacks.set_system_state)(CoarseState::Initial)?;
        self.shared.log("sweep complete");
        Ok(true)
    }

    /// One drain → record-empty → inject → record-full cycle.
    fn run_cycle(&mut self, set: &ParamSet) -> Result<()> {
        let phase = |p| self.shared.set_phase(self.run_id, p);

        phase(CyclePhase::Draining);
        let drain_started = Instant::now();
        (self.shared.callbacks.set_system_state)(CoarseState::Drain)?;

        phase(CyclePhase::WaitingEmpty);
        let empty_g = (self.shared.callbacks.wait_for_empty_bottle)(
            self.config.empty_tolerance_g,
            self.config.empty_timeout_s,
            self.config.empty_window_s,
        )?;
        let drain_s = drain_started.elapsed().as_secs_f64();

        phase(CyclePhase::RecordingEmpty);
        self.shared.status.lock().dynamic_empty_weight_g = Some(empty_g);
        self.shared.log(format!(
            "cycle {}: empty baseline {empty_g:.3} g",
            self.global_cycle
        ));

        phase(CyclePhase::Injecting);
        let inject_started = Instant::now();
        (self.shared.callbacks.start_injection)(
            &set.volumes_mm,
            set.speed_mm_s,
            self.config.accel_mm_s2,
        )?;
        let inject_s = inject_started.elapsed().as_secs_f64();

        phase(CyclePhase::WaitingStable);
        let settle_started = Instant::now();
        let full_g = self.wait_for_stable()?;
        let settle_s = settle_started.elapsed().as_secs_f64();

        phase(CyclePhase::RecordingFull);
        let result = TestResult {
            param_set_id: set.id.clone(),
            cycle: self.global_cycle,
            empty_g,
            full_g,
            delta_g: full_g - empty_g,
            durations: StepDurations {
                drain_s,
                inject_s,
                settle_s,
            },
            timestamp_ms: now_ms(),
        };
        self.shared.log(format!(
            "cycle {}: delta {:.3} g",
            self.global_cycle, result.delta_g
        ));
        if let Some(store) = &self.shared.store {
            store.insert_result(self.run_id, &result)?;
        }
        self.shared.events.emit(EngineEvent::TestCycleCompleted {
            run_id: self.run_id.to_owned(),
            cycle: self.global_cycle,
        });
        self.shared.results.lock().push(result);
        Ok(())
    }

    /// Poll the load cell until it reports a stable reading.
    fn wait_for_stable(&self) -> Result<f64> {
        let deadline =
            Instant::now() + std::time::Duration::from_secs_f64(self.config.stable_timeout_s);
        loop {
            if self.shared.stop.load(Ordering::SeqCst) {
                return Err(EnoseError::Cancelled);
            }
            let reading = (self.shared.callbacks.get_weight)()?;
            if reading.stable {
                return Ok(reading.grams);
            }
            if Instant::now() >= deadline {
                return Err(EnoseError::Timeout {
                    kind: enose_error::TimeoutKind::WeightStability,
                    deadline_s: self.config.stable_timeout_s,
                });
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    /// Handle a pending stop request: return hardware to initial.
    fn stopping(&self) -> Result<bool> {
        if !self.shared.stop.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.shared.set_phase(self.run_id, CyclePhase::Stopping);
        self.shared.log("stop requested");
        (self.shared.callbacks.set_system_state)(CoarseState::Initial)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Callback doubles around a shared simulated bottle.
    fn sim_callbacks(
        states: Arc<Mutex<Vec<CoarseState>>>,
        bottle_g: Arc<Mutex<f64>>,
        injections: Arc<AtomicU32>,
    ) -> SweepCallbacks {
        let bottle_for_empty = Arc::clone(&bottle_g);
        let bottle_for_weight = Arc::clone(&bottle_g);
        let bottle_for_inject = Arc::clone(&bottle_g);
        SweepCallbacks {
            set_system_state: Box::new(move |state| {
                states.lock().push(state);
                Ok(())
            }),
            start_injection: Box::new(move |volumes, _speed, _accel| {
                injections.fetch_add(1, Ordering::SeqCst);
                let added: f64 = volumes.iter().sum();
                *bottle_for_inject.lock() += added;
                Ok(())
            }),
            wait_for_empty_bottle: Box::new(move |_tol, _timeout, _window| {
                let mut bottle = bottle_for_empty.lock();
                *bottle = 100.0;
                Ok(*bottle)
            }),
            get_weight: Box::new(move || {
                // Pace the simulated cycles so stop requests can land.
                std::thread::sleep(std::time::Duration::from_millis(1));
                Ok(WeightReading {
                    grams: *bottle_for_weight.lock(),
                    stable: true,
                })
            }),
            reset_dynamic_empty_weight: Box::new(|| {}),
        }
    }

    fn config(cycles: u32) -> SweepConfig {
        SweepConfig {
            param_sets: vec![ParamSet {
                id: "ps1".to_owned(),
                name: "all pumps 50 mm".to_owned(),
                volumes_mm: [50.0; METERING_PUMP_COUNT],
                speed_mm_s: 10.0,
                cycles,
            }],
            accel_mm_s2: 100.0,
            empty_tolerance_g: 0.5,
            empty_timeout_s: 30.0,
            empty_window_s: 0.01,
            stable_timeout_s: 5.0,
        }
    }

    // === Test: two cycles produce two result rows and finish complete ===
    #[test]
    fn test_two_cycle_sweep() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let bottle = Arc::new(Mutex::new(0.0));
        let injections = Arc::new(AtomicU32::new(0));
        let controller = SweepController::new(sim_callbacks(
            Arc::clone(&states),
            Arc::clone(&bottle),
            Arc::clone(&injections),
        ));

        let handle = controller.start("run-1", config(2)).unwrap();
        handle.join().unwrap();

        let status = controller.status();
        assert_eq!(status.phase, CyclePhase::Complete);
        assert_eq!(status.global_cycle, 2);
        assert_eq!(status.dynamic_empty_weight_g, Some(100.0));
        assert_eq!(injections.load(Ordering::SeqCst), 2);

        let results = controller.results();
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!((result.empty_g - 100.0).abs() < 1e-9);
            assert!((result.delta_g - 400.0).abs() < 1e-9);
        }
        // Each cycle drained, and the run ended back at initial.
        let states = states.lock();
        assert_eq!(
            states
                .iter()
                .filter(|s| **s == CoarseState::Drain)
                .count(),
            2
        );
        assert_eq!(states.last(), Some(&CoarseState::Initial));
    }

    // === Test: stop request lands in idle after returning to initial ===
    #[test]
    fn test_stop_between_cycles() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let bottle = Arc::new(Mutex::new(0.0));
        let injections = Arc::new(AtomicU32::new(0));
        let controller = SweepController::new(sim_callbacks(
            Arc::clone(&states),
            bottle,
            injections,
        ));

        controller.stop_test();
        let handle = controller.start("run-2", config(100)).unwrap();
        // stop() flags are reset by start; request again immediately.
        controller.stop_test();
        handle.join().unwrap();

        let status = controller.status();
        assert!(matches!(status.phase, CyclePhase::Idle | CyclePhase::Complete));
        assert_eq!(states.lock().last(), Some(&CoarseState::Initial));
    }

    // === Test: a second start while running is refused ===
    #[test]
    fn test_exclusive_start() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let bottle = Arc::new(Mutex::new(0.0));
        let injections = Arc::new(AtomicU32::new(0));
        let controller = SweepController::new(sim_callbacks(states, bottle, injections));

        let handle = controller.start("run-3", config(50)).unwrap();
        let second = controller.start("run-4", config(1));
        controller.stop_test();
        handle.join().unwrap();
        match second {
            Err(err) => assert_eq!(err.code(), "INTERNAL"),
            Ok(handle) => handle.join().unwrap(),
        }
    }

    // === Test: the run store sees the whole lifecycle ===
    #[test]
    fn test_run_store_lifecycle() {
        #[derive(Default)]
        struct MemoryStore {
            created: Mutex<Vec<String>>,
            results: Mutex<Vec<TestResult>>,
            phases: Mutex<Vec<CyclePhase>>,
            completed: Mutex<Vec<String>>,
        }
        impl RunStore for MemoryStore {
            fn create_run(&self, run_id: &str, _config: &SweepConfig) -> Result<()> {
                self.created.lock().push(run_id.to_owned());
                Ok(())
            }
            fn insert_result(&self, _run_id: &str, result: &TestResult) -> Result<()> {
                self.results.lock().push(result.clone());
                Ok(())
            }
            fn update_run_state(&self, _run_id: &str, phase: CyclePhase) -> Result<()> {
                self.phases.lock().push(phase);
                Ok(())
            }
            fn complete_run(&self, run_id: &str) -> Result<()> {
                self.completed.lock().push(run_id.to_owned());
                Ok(())
            }
        }

        let states = Arc::new(Mutex::new(Vec::new()));
        let bottle = Arc::new(Mutex::new(0.0));
        let injections = Arc::new(AtomicU32::new(0));
        let store = Arc::new(MemoryStore::default());
        let controller = SweepController::configured(
            sim_callbacks(states, bottle, injections),
            Some(store.clone()),
            Arc::new(NullEventSink),
        );

        let handle = controller.start("run-store", config(1)).unwrap();
        handle.join().unwrap();

        assert_eq!(store.created.lock().as_slice(), ["run-store"]);
        assert_eq!(store.completed.lock().as_slice(), ["run-store"]);
        assert_eq!(store.results.lock().len(), 1);
        let phases = store.phases.lock();
        for expected in [
            CyclePhase::Draining,
            CyclePhase::WaitingEmpty,
            CyclePhase::RecordingEmpty,
            CyclePhase::Injecting,
            CyclePhase::WaitingStable,
            CyclePhase::RecordingFull,
            CyclePhase::Complete,
        ] {
            assert!(phases.contains(&expected), "missing phase {expected:?}");
        }
    }

    // === Test: log ring is bounded ===
    #[test]
    fn test_log_ring_bounded() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let bottle = Arc::new(Mutex::new(0.0));
        let injections = Arc::new(AtomicU32::new(0));
        let controller = SweepController::new(sim_callbacks(states, bottle, injections));
        for i in 0..250 {
            controller.shared.log(format!("line {i}"));
        }
        let logs = controller.logs();
        assert_eq!(logs.len(), LOG_CAPACITY);
        assert_eq!(logs.last().map(|l| l.message.as_str()), Some("line 249"));
    }
}
