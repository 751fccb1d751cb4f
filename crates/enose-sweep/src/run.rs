//! Sweep configuration, per-cycle results, and status snapshots.

use serde::{Deserialize, Serialize};

use enose_types::METERING_PUMP_COUNT;

/// One parameter combination to sweep over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub id: String,
    pub name: String,
    /// Per-pump axis travel for the injection, millimetres.
    pub volumes_mm: [f64; METERING_PUMP_COUNT],
    /// Axis speed for the injection, mm/s.
    pub speed_mm_s: f64,
    /// Cycles to run with this set.
    pub cycles: u32,
}

/// Full sweep configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub param_sets: Vec<ParamSet>,
    /// Axis acceleration for injections, mm/s².
    pub accel_mm_s2: f64,
    /// Empty-detection tolerance, grams.
    pub empty_tolerance_g: f64,
    /// Per-drain timeout, seconds.
    pub empty_timeout_s: f64,
    /// Settle window for empty detection, seconds.
    pub empty_window_s: f64,
    /// How long to wait for a stable full reading, seconds.
    pub stable_timeout_s: f64,
}

impl SweepConfig {
    /// Total cycles across all parameter sets.
    #[must_use]
    pub fn total_cycles(&self) -> u32 {
        self.param_sets.iter().map(|set| set.cycles).sum()
    }
}

/// Phase of the per-cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Draining,
    WaitingEmpty,
    RecordingEmpty,
    Injecting,
    WaitingStable,
    RecordingFull,
    Complete,
    Error,
    Stopping,
}

/// Wall-clock spent in the observable phases of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepDurations {
    pub drain_s: f64,
    pub inject_s: f64,
    pub settle_s: f64,
}

/// One completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub param_set_id: String,
    /// Global cycle index, 1-based.
    pub cycle: u32,
    /// Settled empty reading before the injection, grams.
    pub empty_g: f64,
    /// Stable gross reading after the injection, grams.
    pub full_g: f64,
    /// Net injected weight, grams.
    pub delta_g: f64,
    pub durations: StepDurations,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// One timestamped log line from the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub message: String,
}

/// Live snapshot of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepStatus {
    pub run_id: Option<String>,
    pub phase: CyclePhase,
    /// Index into `param_sets` of the set currently running.
    pub param_set_index: usize,
    /// 1-based cycle number within the current set.
    pub cycle_in_set: u32,
    /// 1-based cycle number across the whole run.
    pub global_cycle: u32,
    pub global_total_cycles: u32,
    /// Running baseline of the empty bottle, grams.
    pub dynamic_empty_weight_g: Option<f64>,
    pub last_error: Option<String>,
}

impl SweepStatus {
    /// Snapshot of an idle controller.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            run_id: None,
            phase: CyclePhase::Idle,
            param_set_index: 0,
            cycle_in_set: 0,
            global_cycle: 0,
            global_total_cycles: 0,
            dynamic_empty_weight_g: None,
            last_error: None,
        }
    }
}
