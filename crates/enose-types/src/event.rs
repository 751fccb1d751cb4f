//! Typed engine events.
//!
//! The scheduler and sweep controller publish these to an [`EventSink`]
//! supplied by the caller (the RPC layer, a log bridge, a test
//! collector). Emission is fire-and-forget: sinks must not block.

use serde::{Deserialize, Serialize};

use crate::activity::ActivityState;
use crate::peripheral::CoarseState;

/// Which state-machine level a `StateChanged` event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateLevel {
    Coarse,
    Activity,
}

/// One observable engine event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EngineEvent {
    /// A state machine changed value.
    StateChanged {
        level: StateLevel,
        old: String,
        new: String,
    },
    /// A `PhaseMarker` step fired.
    PhaseMarker { phase: String, is_start: bool },
    /// A step began executing.
    StepStarted { path: String, name: String },
    /// A step finished successfully.
    StepCompleted { path: String, duration_s: f64 },
    /// A step failed; `code` is a stable SCREAMING_SNAKE identifier.
    StepFailed {
        path: String,
        code: String,
        message: String,
    },
    /// Validation finished; `errors`/`warnings` are diagnostic counts.
    ValidationCompleted { errors: usize, warnings: usize },
    /// One sweep cycle finished; payload is the serialized result row.
    TestCycleCompleted { run_id: String, cycle: u32 },
}

impl EngineEvent {
    /// Convenience constructor for coarse-state changes.
    #[must_use]
    pub fn coarse_changed(old: CoarseState, new: CoarseState) -> Self {
        Self::StateChanged {
            level: StateLevel::Coarse,
            old: old.name().to_owned(),
            new: new.name().to_owned(),
        }
    }

    /// Convenience constructor for activity-state changes.
    #[must_use]
    pub fn activity_changed(old: ActivityState, new: ActivityState) -> Self {
        Self::StateChanged {
            level: StateLevel::Activity,
            old: old.name().to_owned(),
            new: new.name().to_owned(),
        }
    }
}

/// Consumer of engine events.
pub trait EventSink: Send + Sync {
    /// Receive one event. Must not block.
    fn emit(&self, event: EngineEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Sink that stores every event in memory. Test support.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: std::sync::Mutex<Vec<EngineEvent>>,
}

impl MemoryEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events emitted so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: EngineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
