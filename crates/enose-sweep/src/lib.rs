//! Multi-parameter test sweeps with gravimetric feedback.
//!
//! A sweep runs cycles of drain → record empty → inject → record full
//! for each parameter set, tracking the dynamic empty weight between
//! cycles. The controller drives the hardware exclusively through five
//! injected callbacks, so it layers on top of the execution engine (or
//! a simulator) without owning either.

pub mod controller;
pub mod run;
pub mod store;

pub use controller::{SweepCallbacks, SweepController};
pub use run::{CyclePhase, LogEntry, ParamSet, StepDurations, SweepConfig, SweepStatus, TestResult};
pub use store::RunStore;
