//! Static validation of experiment programs.
//!
//! The validator is a single-pass simulated interpreter: it walks the
//! program tree, checks every step against the hardware constraints,
//! and tracks per-pump consumption, bottle level, total duration, and
//! heater cycles — without ever touching hardware. Diagnostics carry
//! structured paths (`steps[3].inject.components[0].liquid_id`) and
//! stable machine-readable codes.
//!
//! `validate` is pure: two calls on the same inputs yield identical
//! diagnostics and identical estimates.

pub mod check;
pub mod diag;
pub mod estimate;

pub use check::{validate, ValidationReport};
pub use diag::{Diagnostic, DiagnosticCode, Severity};
pub use estimate::{LiquidUsage, ResourceEstimate};

/// Assumed seconds per sensor heater cycle when estimating durations.
pub const DEFAULT_HEATER_CYCLE_S: f64 = 2.0;
/// Fraction of available liquid above which consumption draws a
/// `LOW_LIQUID_MARGIN` warning.
pub const LOW_MARGIN_FRACTION: f64 = 0.85;
/// Fraction of the max fill level above which the peak draws a
/// `HIGH_FILL_LEVEL` warning.
pub const HIGH_FILL_FRACTION: f64 = 0.9;
/// Tolerance-to-target ratio above which an inject draws a
/// `LARGE_TOLERANCE` warning.
pub const LARGE_TOLERANCE_FRACTION: f64 = 0.5;
