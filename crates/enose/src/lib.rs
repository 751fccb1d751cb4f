//! E-nose experiment execution engine.
//!
//! The control plane of an automated electronic-nose instrument: a
//! two-level hardware state machine with transactional guards, a static
//! program validator with resource simulation, a registry of primitive
//! action executors, an execution scheduler, and a gravimetric sweep
//! controller. Serial/G-code transport, program parsing, persistence,
//! and the RPC surface are collaborator concerns behind the traits in
//! [`driver`] and [`sweep::RunStore`](enose_sweep::RunStore).
//!
//! ```no_run
//! use std::sync::Arc;
//! use enose::{
//!     ExecutorRegistry, HardwareConstraints, Program, Scheduler, SystemState,
//! };
//! # fn demo(driver: Arc<dyn enose::driver::ActuatorDriver>,
//! #         hardware: HardwareConstraints, program: Program) -> enose::Result<()> {
//! let system = Arc::new(SystemState::new(driver));
//! let registry = Arc::new(ExecutorRegistry::with_defaults());
//! let scheduler = Scheduler::new(system, registry, hardware);
//! scheduler.run(&program)?;
//! # Ok(())
//! # }
//! ```

pub use enose_driver as driver;
pub use enose_error::{EnoseError, Result, TimeoutKind};
pub use enose_exec::{
    ActionExecutor, ControlFlags, DynamicEmptyWeight, ExecContext, ExecSettings,
    ExecutionIdGen, ExecutorRegistry, ResourceTag, Scheduler,
};
pub use enose_state::{ActivityGuard, CoarseGuard, InjectMotion, SystemState};
pub use enose_sweep as sweep;
pub use enose_types::{
    ActivityState, Action, ActionTag, CoarseState, EngineEvent, EventSink, HardwareConstraints,
    LiquidInventory, LiquidType, MemoryEventSink, NullEventSink, PeripheralState, Program, Step,
};
pub use enose_validate::{validate, Diagnostic, DiagnosticCode, Severity, ValidationReport};
