//! Unified error type for the e-nose engine.
//!
//! Every fallible operation in the workspace returns [`Result`]. Each
//! variant maps to a stable SCREAMING_SNAKE code surfaced to callers in
//! `step_failed` events and RPC diagnostics.

use enose_types::ActivityState;
use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, EnoseError>;

/// Which deadline a timed-out operation was bound by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// An inject's stable-weight window expired.
    WeightStability,
    /// A drain or empty-wait never observed a settled empty bottle.
    EmptyBottle,
    /// An acquire exceeded its max-duration ceiling.
    AcquireCeiling,
    /// A wait condition did not hold before its timeout.
    WaitCondition,
}

impl TimeoutKind {
    /// Stable code fragment for this deadline kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::WeightStability => "weight_stability",
            Self::EmptyBottle => "empty_bottle",
            Self::AcquireCeiling => "acquire_ceiling",
            Self::WaitCondition => "wait_condition",
        }
    }
}

/// The error taxonomy of the execution engine.
#[derive(Debug, Error)]
pub enum EnoseError {
    /// No actuator driver is attached to the state controller.
    #[error("actuator driver unavailable")]
    DriverUnavailable,

    /// The actuator driver rejected a command line.
    #[error("driver rejected command `{command}`: {message}")]
    Driver { command: String, message: String },

    /// No load cell is attached.
    #[error("scale unavailable")]
    ScaleUnavailable,

    /// The activity machine rejected a requested transition.
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: ActivityState,
        to: ActivityState,
    },

    /// A step's preconditions did not hold at dispatch.
    #[error("preconditions failed: {}", failed.join(", "))]
    PreconditionFailed { failed: Vec<String> },

    /// A waiting operation exceeded its deadline.
    #[error("{} timeout after {deadline_s}s", kind.name())]
    Timeout { kind: TimeoutKind, deadline_s: f64 },

    /// The caller requested a stop; the step unwound cooperatively.
    #[error("cancelled by stop request")]
    Cancelled,

    /// An out-of-band emergency stop fired.
    #[error("emergency stop engaged")]
    EmergencyStop,

    /// No executor is registered for the step's action tag.
    #[error("no executor registered for action `{tag}`")]
    NoExecutor { tag: String },

    /// Execution refused to start while validation errors remain.
    #[error("program has {errors} validation error(s)")]
    ValidationFailed { errors: usize },

    /// Invariant violation inside the engine.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EnoseError {
    /// Build an [`EnoseError::Internal`] from any displayable payload.
    #[must_use]
    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DriverUnavailable => "DRIVER_UNAVAILABLE",
            Self::Driver { .. } => "DRIVER_ERROR",
            Self::ScaleUnavailable => "SCALE_UNAVAILABLE",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::EmergencyStop => "EMERGENCY_STOP",
            Self::NoExecutor { .. } => "NO_EXECUTOR",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether this failure came from a cooperative cancellation rather
    /// than a fault.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
