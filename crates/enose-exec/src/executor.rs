//! The action-executor capability surface and its registry.

use std::collections::HashMap;
use std::sync::Arc;

use enose_error::Result;
use enose_types::{ActionTag, ExecutionOutcome, PreconditionResult, Step};

use crate::context::ExecContext;

/// Abstract resource an action acquires while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTag {
    GasPump,
    CleaningPump,
    MeteringPumps,
    Valves,
    Heater,
    Scale,
}

/// One primitive action implementation.
///
/// Executors are registry-owned singletons and stateless; per-run state
/// travels through the [`ExecContext`].
pub trait ActionExecutor: Send + Sync {
    /// Unique name, also used as the execution-id prefix.
    fn name(&self) -> &'static str;

    /// Pure predicate over the step and machine state.
    fn check_preconditions(&self, step: &Step, ctx: &ExecContext<'_>) -> PreconditionResult;

    /// Perform the action.
    ///
    /// # Errors
    /// Any [`enose_error::EnoseError`]; the caller rolls back guards and
    /// surfaces the failure with the step path.
    fn execute(&self, step: &Step, ctx: &ExecContext<'_>) -> Result<ExecutionOutcome>;

    /// Side-effect-free duration estimate in seconds.
    fn estimate_duration(&self, step: &Step, ctx: &ExecContext<'_>) -> f64;

    /// Whether re-execution under the same execution id is safe.
    fn is_idempotent(&self) -> bool {
        false
    }

    /// Resources the action acquires.
    fn required_resources(&self) -> &'static [ResourceTag] {
        &[]
    }
}

/// Keyed collection of executors, one per action tag.
///
/// Built once at startup and passed by reference into the scheduler;
/// there is no global mutable registry.
pub struct ExecutorRegistry {
    executors: HashMap<ActionTag, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registry with all nine primitive executors.
    #[must_use]
    pub fn with_defaults() -> Self {
        use crate::primitives;

        let mut registry = Self::new();
        registry.register(ActionTag::Inject, Arc::new(primitives::InjectExecutor));
        registry.register(ActionTag::Drain, Arc::new(primitives::DrainExecutor));
        registry.register(ActionTag::Acquire, Arc::new(primitives::AcquireExecutor));
        registry.register(ActionTag::Wash, Arc::new(primitives::WashExecutor));
        registry.register(ActionTag::Wait, Arc::new(primitives::WaitExecutor));
        registry.register(ActionTag::SetState, Arc::new(primitives::SetStateExecutor));
        registry.register(
            ActionTag::SetGasPump,
            Arc::new(primitives::SetGasPumpExecutor),
        );
        registry.register(ActionTag::Loop, Arc::new(primitives::LoopExecutor));
        registry.register(
            ActionTag::PhaseMarker,
            Arc::new(primitives::PhaseMarkerExecutor),
        );
        registry
    }

    /// Register (or replace) the executor for a tag.
    pub fn register(&mut self, tag: ActionTag, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(tag, executor);
    }

    /// Executor for a tag, if registered.
    #[must_use]
    pub fn get(&self, tag: ActionTag) -> Option<&Arc<dyn ActionExecutor>> {
        self.executors.get(&tag)
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
