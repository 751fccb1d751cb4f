//! Optional persistence of test runs.

use enose_error::Result;

use crate::run::{CyclePhase, SweepConfig, TestResult};

/// Persistence seam for test runs. The controller operates unchanged
/// when no store is attached.
pub trait RunStore: Send + Sync {
    /// Record a new run and its configuration.
    fn create_run(&self, run_id: &str, config: &SweepConfig) -> Result<()>;

    /// Append one cycle's result row.
    fn insert_result(&self, run_id: &str, result: &TestResult) -> Result<()>;

    /// Record a phase change.
    fn update_run_state(&self, run_id: &str, phase: CyclePhase) -> Result<()>;

    /// Mark the run finished.
    fn complete_run(&self, run_id: &str) -> Result<()>;
}
