//! Action executors and the execution scheduler.
//!
//! A [`Program`](enose_types::Program) runs by dispatching each step
//! through the [`ExecutorRegistry`] to one of nine primitive
//! executors. Every executor opens transaction guards on the state
//! machine, streams actuator commands, polls sensors with cooperative
//! cancellation, and commits — or lets the guards roll back.

pub mod context;
pub mod control;
pub mod executor;
pub mod observe;
pub mod primitives;
pub mod scheduler;
pub mod settings;

pub use context::{DynamicEmptyWeight, ExecContext, ExecutionIdGen};
pub use control::ControlFlags;
pub use enose_validate::DEFAULT_HEATER_CYCLE_S;
pub use executor::{ActionExecutor, ExecutorRegistry, ResourceTag};
pub use observe::{wait_for_empty, EmptyWait, StabilityWindow};
pub use scheduler::Scheduler;
pub use settings::ExecSettings;
