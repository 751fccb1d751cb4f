//! Core value types for the e-nose experiment execution engine.
//!
//! Everything in this crate is a plain value: peripheral and activity
//! state labels, the declarative program model, hardware constraints,
//! execution results, and the typed event stream. No IO, no locking,
//! no hardware — those live in the driver/state/exec crates.

pub mod activity;
pub mod event;
pub mod hardware;
pub mod peripheral;
pub mod program;
pub mod status;

pub use activity::ActivityState;
pub use event::{EngineEvent, EventSink, MemoryEventSink, NullEventSink, StateLevel};
pub use hardware::{HardwareConstraints, LiquidInventory, LiquidType, METERING_PUMP_COUNT};
pub use peripheral::{
    CoarseState, MeteringPump, MotionRequest, PeripheralState, PinchMode, PwmDuty, ValvePosition,
};
pub use program::{
    AcquireAction, AcquireTermination, Action, ActionTag, Component, DrainAction, InjectAction,
    LoopAction, PhaseMarkerAction, Program, SetGasPumpAction, SetStateAction, Step, WaitAction,
    WaitCondition, WashAction,
};
pub use status::{ExecutionOutcome, ExperimentPhase, ExperimentStatus, PreconditionResult};
