//! Execution results and live status snapshots.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Execution results
// ---------------------------------------------------------------------------

/// Successful completion of one primitive action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Advisory id for external at-most-once deduplication, when the
    /// executor generated one.
    pub execution_id: Option<String>,
    /// Wall-clock duration of the action in seconds.
    pub duration_s: f64,
}

impl ExecutionOutcome {
    /// Outcome without an execution id.
    #[must_use]
    pub const fn anonymous(duration_s: f64) -> Self {
        Self {
            execution_id: None,
            duration_s,
        }
    }
}

/// Result of a precondition check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconditionResult {
    /// Names of the conditions that failed; empty means satisfied.
    pub failed_conditions: Vec<String>,
}

impl PreconditionResult {
    /// All preconditions hold.
    #[must_use]
    pub const fn satisfied() -> Self {
        Self {
            failed_conditions: Vec::new(),
        }
    }

    /// Whether every condition held.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.failed_conditions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Experiment status
// ---------------------------------------------------------------------------

/// Coarse phase of a program run, for status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentPhase {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

/// Live snapshot published by the execution scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatus {
    /// Coarse run phase.
    pub phase: ExperimentPhase,
    /// Index of the top-level step currently executing, if any.
    pub current_step: Option<usize>,
    /// Number of top-level steps in the loaded program.
    pub total_steps: usize,
    /// Name of the step currently executing, if any.
    pub current_step_name: Option<String>,
    /// Seconds elapsed since the run started.
    pub elapsed_s: f64,
    /// Code and message of the last failure, if any.
    pub last_error: Option<(String, String)>,
}

impl ExperimentStatus {
    /// Snapshot of an idle scheduler with no program loaded.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            phase: ExperimentPhase::Idle,
            current_step: None,
            total_steps: 0,
            current_step_name: None,
            elapsed_s: 0.0,
            last_error: None,
        }
    }
}
