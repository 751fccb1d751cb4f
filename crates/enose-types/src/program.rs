//! Declarative experiment program model.
//!
//! A [`Program`] is a tree of [`Step`]s; each step carries one of nine
//! [`Action`] variants. Programs are immutable after load: collaborators
//! parse YAML or a wire format into these values, the validator checks
//! them, and the scheduler executes them.

use serde::{Deserialize, Serialize};

use crate::peripheral::CoarseState;

// ---------------------------------------------------------------------------
// Program / Step
// ---------------------------------------------------------------------------

/// A validated, immutable experiment program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Top-level steps, executed in order.
    pub steps: Vec<Step>,
}

/// One node of the program tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Human-readable step name. Empty names draw a validator warning.
    pub name: String,
    /// The action to perform. `None` is a validation error.
    pub action: Option<Action>,
}

impl Step {
    /// Build a named step around an action.
    #[must_use]
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action: Some(action),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Registry key for an action variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    Inject,
    Drain,
    Acquire,
    Wash,
    Wait,
    SetState,
    SetGasPump,
    Loop,
    PhaseMarker,
}

impl ActionTag {
    /// Stable string key used by the executor registry.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Inject => "inject",
            Self::Drain => "drain",
            Self::Acquire => "acquire",
            Self::Wash => "wash",
            Self::Wait => "wait",
            Self::SetState => "set_state",
            Self::SetGasPump => "set_gas_pump",
            Self::Loop => "loop",
            Self::PhaseMarker => "phase_marker",
        }
    }
}

impl std::fmt::Display for ActionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// The nine primitive actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Inject(InjectAction),
    Drain(DrainAction),
    Acquire(AcquireAction),
    Wash(WashAction),
    Wait(WaitAction),
    SetState(SetStateAction),
    SetGasPump(SetGasPumpAction),
    Loop(LoopAction),
    PhaseMarker(PhaseMarkerAction),
}

impl Action {
    /// Registry key for this variant.
    #[must_use]
    pub const fn tag(&self) -> ActionTag {
        match self {
            Self::Inject(_) => ActionTag::Inject,
            Self::Drain(_) => ActionTag::Drain,
            Self::Acquire(_) => ActionTag::Acquire,
            Self::Wash(_) => ActionTag::Wash,
            Self::Wait(_) => ActionTag::Wait,
            Self::SetState(_) => ActionTag::SetState,
            Self::SetGasPump(_) => ActionTag::SetGasPump,
            Self::Loop(_) => ActionTag::Loop,
            Self::PhaseMarker(_) => ActionTag::PhaseMarker,
        }
    }
}

// ---------------------------------------------------------------------------
// Inject
// ---------------------------------------------------------------------------

/// One liquid component of an injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Id of a [`crate::hardware::LiquidInventory`] entry.
    pub liquid_id: String,
    /// Fraction of the total target, `0.0..=1.0`. Ratios sum to 1.
    pub ratio: f64,
}

/// Meter liquid into the bottle and wait for the weight to settle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectAction {
    /// Target volume in millilitres. Exactly one of volume/weight is set.
    pub volume_ml: Option<f64>,
    /// Target weight in grams, converted through component densities.
    pub weight_g: Option<f64>,
    /// Acceptable deviation of the settled weight delta, in grams.
    pub tolerance_g: f64,
    /// Flow rate in mL/min shared by the parallel move.
    pub flow_rate_ml_min: f64,
    /// How long to wait for a stable in-tolerance reading, in seconds.
    pub stable_timeout_s: f64,
    /// Ordered component set; ratios sum to 1.
    pub components: Vec<Component>,
}

// ---------------------------------------------------------------------------
// Drain
// ---------------------------------------------------------------------------

/// Push the bottle contents to waste until the load cell reads empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainAction {
    /// Air-pump duty during the drain, bounded by the hardware maximum.
    pub pump_pwm: f64,
    /// Absolute ceiling for the whole drain, in seconds.
    pub timeout_s: f64,
}

// ---------------------------------------------------------------------------
// Acquire
// ---------------------------------------------------------------------------

/// Termination criterion for a gas acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireTermination {
    /// Run for a fixed duration in seconds.
    Duration { seconds: f64 },
    /// Run until the sensor board reports this many heater cycles.
    HeaterCycles { cycles: u32 },
    /// Run until the weight derivative stays below `max_slope_g_per_s`
    /// over a sliding window.
    Stability { window_s: f64, max_slope_g_per_s: f64 },
    /// Run until the load cell reads `target_g` ± `tolerance_g`.
    Weight { target_g: f64, tolerance_g: f64 },
}

/// Acquire gas into the sensor chamber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquireAction {
    /// Air-pump duty during acquisition.
    pub pump_pwm: f64,
    /// Termination criterion. `None` is a validation error.
    pub termination: Option<AcquireTermination>,
    /// Absolute ceiling for all termination modes, in seconds.
    pub max_duration_s: f64,
}

// ---------------------------------------------------------------------------
// Wash
// ---------------------------------------------------------------------------

/// Repeated rinse: `repeat_count × { inject(rinse) → drain }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WashAction {
    /// Number of inject+drain repetitions.
    pub repeat_count: u32,
    /// Rinse liquid id. `None` selects the first `rinse`-typed liquid.
    pub liquid_id: Option<String>,
    /// Rinse volume per repetition, in millilitres.
    pub volume_ml: f64,
    /// Flow rate for the rinse injections, mL/min.
    pub flow_rate_ml_min: f64,
    /// Air-pump duty for the drains.
    pub drain_pwm: f64,
    /// Timeout per drain, in seconds.
    pub drain_timeout_s: f64,
    /// Whether to run one extra drain after the last repetition.
    pub final_drain: bool,
}

// ---------------------------------------------------------------------------
// Wait
// ---------------------------------------------------------------------------

/// Condition a `Wait` step blocks on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    /// Sleep for a fixed duration in seconds.
    Duration { seconds: f64 },
    /// Wait for the sensor board to report this many heater cycles.
    HeaterCycles { cycles: u32 },
    /// Wait for the weight derivative to settle over a sliding window.
    Stability { window_s: f64, max_slope_g_per_s: f64 },
    /// Wait for the load cell to cross a weight threshold.
    Weight { threshold_g: f64 },
    /// Wait for the bottle to read empty, without touching any valve.
    Empty,
}

/// Block until a condition holds, without changing peripheral state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitAction {
    /// Condition to block on. `None` is a validation error.
    pub condition: Option<WaitCondition>,
    /// Absolute ceiling, in seconds. Zero or negative draws a warning.
    pub timeout_s: f64,
}

// ---------------------------------------------------------------------------
// SetState / SetGasPump / Loop / PhaseMarker
// ---------------------------------------------------------------------------

/// Force the rig into a coarse peripheral state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStateAction {
    pub target: CoarseState,
}

/// Set the air pump's duty cycle directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetGasPumpAction {
    /// Requested duty, bounded by the hardware maximum.
    pub pwm: f64,
}

/// Bounded iteration over a child step sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopAction {
    /// Iteration count. Zero is legal and makes the loop a no-op.
    pub count: u32,
    /// Child steps, executed in order each iteration.
    pub steps: Vec<Step>,
}

/// Emit an observable phase annotation. No hardware effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMarkerAction {
    /// Phase name carried by the event.
    pub phase: String,
    /// Whether this marks the start (`true`) or end of the phase.
    pub is_start: bool,
}
