//! The simulated-interpreter walk.

use enose_types::{
    AcquireAction, AcquireTermination, Action, Component, DrainAction, HardwareConstraints,
    InjectAction, LiquidType, LoopAction, Program, Step, WaitAction, WaitCondition, WashAction,
    METERING_PUMP_COUNT,
};

use crate::diag::{Diagnostic, DiagnosticCode, Severity};
use crate::estimate::{LiquidUsage, ResourceEstimate};
use crate::{
    DEFAULT_HEATER_CYCLE_S, HIGH_FILL_FRACTION, LARGE_TOLERANCE_FRACTION, LOW_MARGIN_FRACTION,
};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of validating one program.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// All findings, in discovery order.
    pub diagnostics: Vec<Diagnostic>,
    /// Aggregated resource simulation.
    pub estimate: ResourceEstimate,
}

impl ValidationReport {
    /// Whether the program may execute (no error-severity findings).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    /// Error-severity findings.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    /// Warning-severity findings.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Number of error-severity findings.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Number of warning-severity findings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// First finding with the given code, if any.
    #[must_use]
    pub fn find(&self, code: DiagnosticCode) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.code == code)
    }
}

/// Validate a program against optional hardware constraints.
#[must_use]
pub fn validate(program: &Program, hardware: Option<&HardwareConstraints>) -> ValidationReport {
    let mut cx = Checker {
        hardware,
        diags: Vec::new(),
        sim: Sim::default(),
    };
    cx.check_hardware();
    for (index, step) in program.steps.iter().enumerate() {
        cx.check_step(step, &format!("steps[{index}]"));
    }
    cx.finish()
}

// ---------------------------------------------------------------------------
// Simulation counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Sim {
    consumed_ml: [f64; METERING_PUMP_COUNT],
    level_ml: f64,
    peak_ml: f64,
    duration_s: f64,
    heater_cycles: u64,
}

struct Checker<'a> {
    hardware: Option<&'a HardwareConstraints>,
    diags: Vec<Diagnostic>,
    sim: Sim,
}

impl Checker<'_> {
    fn push(&mut self, path: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) {
        self.diags.push(Diagnostic::new(path, code, message));
    }

    // -----------------------------------------------------------------------
    // Hardware
    // -----------------------------------------------------------------------

    fn check_hardware(&mut self) {
        let Some(hw) = self.hardware else {
            self.push(
                "hardware",
                DiagnosticCode::MissingHardware,
                "no hardware constraints provided",
            );
            return;
        };
        if hw.max_fill_ml > hw.bottle_capacity_ml {
            self.push(
                "hardware.max_fill_ml",
                DiagnosticCode::MaxFillExceedsCapacity,
                format!(
                    "max fill {} mL exceeds bottle capacity {} mL",
                    hw.max_fill_ml, hw.bottle_capacity_ml
                ),
            );
        }
        for (i, liquid) in hw.liquids.iter().enumerate() {
            if hw.liquids[..i].iter().any(|other| other.id == liquid.id) {
                self.push(
                    format!("hardware.liquids[{i}].id"),
                    DiagnosticCode::DuplicateLiquidId,
                    format!("liquid id `{}` is declared twice", liquid.id),
                );
            }
            if hw.liquids[..i]
                .iter()
                .any(|other| other.pump_index == liquid.pump_index)
            {
                self.push(
                    format!("hardware.liquids[{i}].pump_index"),
                    DiagnosticCode::DuplicatePumpIndex,
                    format!("pump index {} is assigned twice", liquid.pump_index),
                );
            }
            if usize::from(liquid.pump_index) >= METERING_PUMP_COUNT {
                self.push(
                    format!("hardware.liquids[{i}].pump_index"),
                    DiagnosticCode::PumpIndexOutOfRange,
                    format!(
                        "pump index {} is outside 0..{METERING_PUMP_COUNT}",
                        liquid.pump_index
                    ),
                );
            }
        }
        if hw.first_of_kind(LiquidType::Rinse).is_none() {
            self.push(
                "hardware.liquids",
                DiagnosticCode::NoRinseLiquid,
                "no rinse-type liquid in the inventory; wash steps cannot run",
            );
        }
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    fn check_step(&mut self, step: &Step, path: &str) {
        if step.name.trim().is_empty() {
            self.push(
                format!("{path}.name"),
                DiagnosticCode::EmptyStepName,
                "step has no name",
            );
        }
        let Some(action) = &step.action else {
            self.push(path, DiagnosticCode::NoAction, "step has no action set");
            return;
        };
        match action {
            Action::Inject(a) => self.check_inject(a, path),
            Action::Drain(a) => self.check_drain(a, path),
            Action::Acquire(a) => self.check_acquire(a, path),
            Action::Wash(a) => self.check_wash(a, path),
            Action::Wait(a) => self.check_wait(a, path),
            Action::Loop(a) => self.check_loop(a, path),
            // No resource effect to simulate.
            Action::SetState(_) | Action::SetGasPump(_) | Action::PhaseMarker(_) => {}
        }
    }

    fn check_inject(&mut self, a: &InjectAction, path: &str) {
        let base = format!("{path}.inject");
        let density = self.weighted_density(&a.components);
        let total_ml = match (a.volume_ml, a.weight_g) {
            (Some(v), _) => Some(v),
            (None, Some(w)) => Some(w / density),
            (None, None) => {
                self.push(
                    base.as_str(),
                    DiagnosticCode::NoTarget,
                    "inject specifies neither a volume nor a weight target",
                );
                None
            }
        };

        if a.components.is_empty() {
            self.push(
                format!("{base}.components"),
                DiagnosticCode::NoComponents,
                "inject has no components",
            );
        } else {
            let ratio_sum: f64 = a.components.iter().map(|c| c.ratio).sum();
            if (ratio_sum - 1.0).abs() > 1e-6 {
                self.push(
                    format!("{base}.components"),
                    DiagnosticCode::ComponentRatioSum,
                    format!("component ratios sum to {ratio_sum}, expected 1"),
                );
            }
        }

        for (i, component) in a.components.iter().enumerate() {
            let Some(hw) = self.hardware else { continue };
            match hw.liquid(&component.liquid_id) {
                None => self.push(
                    format!("{base}.components[{i}].liquid_id"),
                    DiagnosticCode::UnknownLiquid,
                    format!("unknown liquid `{}`", component.liquid_id),
                ),
                Some(liquid) => {
                    let pump = usize::from(liquid.pump_index);
                    if pump < METERING_PUMP_COUNT {
                        if let Some(total) = total_ml {
                            self.sim.consumed_ml[pump] += total * component.ratio;
                        }
                    }
                }
            }
        }

        let target_g = a.weight_g.or(total_ml);
        if let Some(target) = target_g {
            if target > 0.0 && a.tolerance_g > LARGE_TOLERANCE_FRACTION * target {
                self.push(
                    format!("{base}.tolerance_g"),
                    DiagnosticCode::LargeTolerance,
                    format!(
                        "tolerance {} g exceeds half the target {} g",
                        a.tolerance_g, target
                    ),
                );
            }
        }
        if a.stable_timeout_s <= 0.0 {
            self.push(
                format!("{base}.stable_timeout_s"),
                DiagnosticCode::NoTimeout,
                "inject has no stabilization timeout",
            );
        }

        if let Some(total) = total_ml {
            self.fill(total, path);
            if a.flow_rate_ml_min > 0.0 {
                self.sim.duration_s += total / a.flow_rate_ml_min * 60.0;
            }
            self.sim.duration_s += a.stable_timeout_s.max(0.0);
        }
    }

    fn check_drain(&mut self, a: &DrainAction, path: &str) {
        if a.timeout_s <= 0.0 {
            self.push(
                format!("{path}.drain.timeout_s"),
                DiagnosticCode::NoTimeout,
                "drain has no timeout",
            );
        }
        if self.sim.level_ml <= 0.0 {
            self.push(
                path,
                DiagnosticCode::EmptyDrain,
                "draining an already-empty bottle",
            );
        }
        self.sim.level_ml = 0.0;
        self.sim.duration_s += a.timeout_s.max(0.0) / 2.0;
    }

    fn check_acquire(&mut self, a: &AcquireAction, path: &str) {
        let base = format!("{path}.acquire");
        if a.max_duration_s <= 0.0 {
            self.push(
                format!("{base}.max_duration_s"),
                DiagnosticCode::NoTimeout,
                "acquire has no max-duration ceiling",
            );
        }
        let Some(termination) = &a.termination else {
            self.push(
                format!("{base}.termination"),
                DiagnosticCode::NoTermination,
                "acquire has no termination criterion",
            );
            return;
        };
        let raw = match termination {
            AcquireTermination::Duration { seconds } => *seconds,
            AcquireTermination::HeaterCycles { cycles } => {
                self.sim.heater_cycles += u64::from(*cycles);
                f64::from(*cycles) * DEFAULT_HEATER_CYCLE_S
            }
            AcquireTermination::Stability { window_s, .. } => *window_s,
            AcquireTermination::Weight { .. } => a.max_duration_s / 2.0,
        };
        let bounded = if a.max_duration_s > 0.0 {
            raw.min(a.max_duration_s)
        } else {
            raw
        };
        self.sim.duration_s += bounded.max(0.0);
    }

    fn check_wait(&mut self, a: &WaitAction, path: &str) {
        let base = format!("{path}.wait");
        if a.timeout_s <= 0.0 {
            self.push(
                format!("{base}.timeout_s"),
                DiagnosticCode::NoTimeout,
                "wait has no timeout",
            );
        }
        let Some(condition) = &a.condition else {
            self.push(
                format!("{base}.condition"),
                DiagnosticCode::NoCondition,
                "wait has no condition",
            );
            return;
        };
        let raw = match condition {
            WaitCondition::Duration { seconds } => *seconds,
            WaitCondition::HeaterCycles { cycles } => {
                self.sim.heater_cycles += u64::from(*cycles);
                f64::from(*cycles) * DEFAULT_HEATER_CYCLE_S
            }
            WaitCondition::Stability { window_s, .. } => *window_s,
            WaitCondition::Weight { .. } => a.timeout_s / 2.0,
            WaitCondition::Empty => {
                // Observes the bottle running empty without touching valves.
                self.sim.level_ml = 0.0;
                a.timeout_s / 2.0
            }
        };
        let bounded = if a.timeout_s > 0.0 {
            raw.min(a.timeout_s)
        } else {
            raw
        };
        self.sim.duration_s += bounded.max(0.0);
    }

    fn check_wash(&mut self, a: &WashAction, path: &str) {
        let base = format!("{path}.wash");
        let pump = match (self.hardware, &a.liquid_id) {
            (Some(hw), Some(id)) => match hw.liquid(id) {
                Some(liquid) => Some(usize::from(liquid.pump_index)),
                None => {
                    self.push(
                        format!("{base}.liquid_id"),
                        DiagnosticCode::UnknownLiquid,
                        format!("unknown liquid `{id}`"),
                    );
                    None
                }
            },
            (Some(hw), None) => match hw.first_of_kind(LiquidType::Rinse) {
                Some(liquid) => Some(usize::from(liquid.pump_index)),
                None => {
                    self.push(
                        format!("{base}.liquid_id"),
                        DiagnosticCode::UnknownLiquid,
                        "no rinse-type liquid available for wash",
                    );
                    None
                }
            },
            (None, _) => None,
        };

        for _ in 0..a.repeat_count {
            if let Some(pump) = pump {
                if pump < METERING_PUMP_COUNT {
                    self.sim.consumed_ml[pump] += a.volume_ml;
                }
            }
            self.fill(a.volume_ml, path);
            self.sim.level_ml = 0.0;
            if a.flow_rate_ml_min > 0.0 {
                self.sim.duration_s += a.volume_ml / a.flow_rate_ml_min * 60.0;
            }
            self.sim.duration_s += a.drain_timeout_s.max(0.0) / 2.0;
        }
        if a.final_drain {
            self.sim.duration_s += a.drain_timeout_s.max(0.0) / 2.0;
        }
    }

    fn check_loop(&mut self, a: &LoopAction, path: &str) {
        let base = format!("{path}.loop");
        if a.steps.is_empty() {
            self.push(base.as_str(), DiagnosticCode::EmptyLoop, "loop body has no steps");
            return;
        }
        // One structural pass over the body, then linear scaling of the
        // per-iteration counter deltas by the loop count.
        let snapshot = self.sim;
        for (index, step) in a.steps.iter().enumerate() {
            self.check_step(step, &format!("{base}.steps[{index}]"));
        }
        let once = self.sim;
        let count = f64::from(a.count);

        for pump in 0..METERING_PUMP_COUNT {
            self.sim.consumed_ml[pump] = snapshot.consumed_ml[pump]
                + (once.consumed_ml[pump] - snapshot.consumed_ml[pump]) * count;
        }
        self.sim.duration_s =
            snapshot.duration_s + (once.duration_s - snapshot.duration_s) * count;
        self.sim.heater_cycles = snapshot.heater_cycles
            + (once.heater_cycles - snapshot.heater_cycles) * u64::from(a.count);
        self.sim.level_ml = snapshot.level_ml + (once.level_ml - snapshot.level_ml) * count;

        if a.count == 0 {
            self.sim.peak_ml = snapshot.peak_ml;
            return;
        }
        // The in-iteration headroom repeats on top of the final level.
        let projected_peak = (self.sim.level_ml + (once.peak_ml - once.level_ml)).max(once.peak_ml);
        self.sim.peak_ml = projected_peak;
        if let Some(hw) = self.hardware {
            if projected_peak > hw.bottle_capacity_ml && once.peak_ml <= hw.bottle_capacity_ml {
                self.push(
                    base.as_str(),
                    DiagnosticCode::CapacityExceeded,
                    format!(
                        "repeated iterations reach {projected_peak} mL, above the bottle capacity"
                    ),
                );
            } else if projected_peak > hw.max_fill_ml && once.peak_ml <= hw.max_fill_ml {
                self.push(
                    base.as_str(),
                    DiagnosticCode::OverflowRisk,
                    format!("repeated iterations reach {projected_peak} mL, above the max fill"),
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Raise the simulated level and check fill thresholds at `path`.
    fn fill(&mut self, volume_ml: f64, path: &str) {
        self.sim.level_ml += volume_ml;
        self.sim.peak_ml = self.sim.peak_ml.max(self.sim.level_ml);
        let Some(hw) = self.hardware else { return };
        if self.sim.level_ml > hw.bottle_capacity_ml {
            self.push(
                path,
                DiagnosticCode::CapacityExceeded,
                format!(
                    "simulated level {} mL exceeds bottle capacity {} mL",
                    self.sim.level_ml, hw.bottle_capacity_ml
                ),
            );
        } else if self.sim.level_ml > hw.max_fill_ml {
            self.push(
                path,
                DiagnosticCode::OverflowRisk,
                format!(
                    "simulated level {} mL exceeds max fill {} mL",
                    self.sim.level_ml, hw.max_fill_ml
                ),
            );
        } else if self.sim.level_ml > HIGH_FILL_FRACTION * hw.max_fill_ml {
            self.push(
                path,
                DiagnosticCode::HighFillLevel,
                format!(
                    "simulated level {} mL is above {}% of max fill",
                    self.sim.level_ml,
                    HIGH_FILL_FRACTION * 100.0
                ),
            );
        }
    }

    /// Ratio-weighted density, falling back to 1.0 when any referenced
    /// component lacks a density.
    fn weighted_density(&self, components: &[Component]) -> f64 {
        let Some(hw) = self.hardware else { return 1.0 };
        let mut sum = 0.0;
        for component in components {
            match hw
                .liquid(&component.liquid_id)
                .and_then(|l| l.density_g_per_ml)
            {
                Some(density) => sum += component.ratio * density,
                None => return 1.0,
            }
        }
        if sum > 0.0 { sum } else { 1.0 }
    }

    fn finish(mut self) -> ValidationReport {
        let mut liquids = Vec::new();
        if let Some(hw) = self.hardware {
            for (i, liquid) in hw.liquids.iter().enumerate() {
                let pump = usize::from(liquid.pump_index);
                let required = if pump < METERING_PUMP_COUNT {
                    self.sim.consumed_ml[pump]
                } else {
                    0.0
                };
                let sufficient = required <= liquid.available_ml;
                if !sufficient {
                    self.diags.push(Diagnostic::new(
                        format!("hardware.liquids[{i}]"),
                        DiagnosticCode::InsufficientLiquid,
                        format!(
                            "`{}` needs {required} mL but only {} mL is available",
                            liquid.id, liquid.available_ml
                        ),
                    ));
                } else if liquid.available_ml > 0.0
                    && required > LOW_MARGIN_FRACTION * liquid.available_ml
                {
                    self.diags.push(Diagnostic::new(
                        format!("hardware.liquids[{i}]"),
                        DiagnosticCode::LowLiquidMargin,
                        format!(
                            "`{}` consumption {required} mL leaves little margin of {} mL available",
                            liquid.id, liquid.available_ml
                        ),
                    ));
                }
                liquids.push(LiquidUsage {
                    liquid_id: liquid.id.clone(),
                    required_ml: required,
                    available_ml: liquid.available_ml,
                    sufficient,
                });
            }
        }
        ValidationReport {
            diagnostics: self.diags,
            estimate: ResourceEstimate {
                per_pump_consumption_ml: self.sim.consumed_ml,
                peak_level_ml: self.sim.peak_ml,
                final_level_ml: self.sim.level_ml,
                total_duration_s: self.sim.duration_s,
                heater_cycles: self.sim.heater_cycles,
                liquids,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use enose_types::{CoarseState, LiquidInventory, SetStateAction};

    fn hardware() -> HardwareConstraints {
        HardwareConstraints {
            bottle_capacity_ml: 60.0,
            max_fill_ml: 50.0,
            max_gas_pump_pwm: 0.9,
            liquids: vec![
                LiquidInventory {
                    id: "water".to_owned(),
                    name: "Rinse water".to_owned(),
                    pump_index: 0,
                    kind: LiquidType::Rinse,
                    available_ml: 500.0,
                    density_g_per_ml: Some(1.0),
                },
                LiquidInventory {
                    id: "ethanol".to_owned(),
                    name: "Ethanol".to_owned(),
                    pump_index: 2,
                    kind: LiquidType::Sample,
                    available_ml: 100.0,
                    density_g_per_ml: Some(0.789),
                },
            ],
        }
    }

    fn inject(volume_ml: f64, liquid: &str) -> Action {
        Action::Inject(InjectAction {
            volume_ml: Some(volume_ml),
            weight_g: None,
            tolerance_g: 0.5,
            flow_rate_ml_min: 5.0,
            stable_timeout_s: 30.0,
            components: vec![Component {
                liquid_id: liquid.to_owned(),
                ratio: 1.0,
            }],
        })
    }

    // === Test: happy-path single inject ===
    #[test]
    fn test_happy_path_single_inject() {
        let hw = hardware();
        let program = Program {
            steps: vec![
                Step::new("enter inject", Action::SetState(SetStateAction {
                    target: CoarseState::Inject,
                })),
                Step::new("fill", inject(10.0, "ethanol")),
            ],
        };
        let report = validate(&program, Some(&hw));
        assert!(report.is_valid(), "{:?}", report.diagnostics);
        // 10 mL at 5 mL/min plus 30 s stabilization.
        assert!((report.estimate.total_duration_s - 150.0).abs() < 1e-9);
        assert!((report.estimate.per_pump_consumption_ml[2] - 10.0).abs() < 1e-9);
        assert!((report.estimate.peak_level_ml - 10.0).abs() < 1e-9);
    }

    // === Test: second inject without a drain trips overflow at its path ===
    #[test]
    fn test_overflow_at_second_inject() {
        let hw = hardware();
        let program = Program {
            steps: vec![
                Step::new("first", inject(30.0, "water")),
                Step::new("second", inject(30.0, "water")),
            ],
        };
        let report = validate(&program, Some(&hw));
        assert!(!report.is_valid());
        let overflow = report.find(DiagnosticCode::OverflowRisk).unwrap();
        assert_eq!(overflow.path, "steps[1]");
    }

    // === Test: the high-fill window warns without erroring ===
    #[test]
    fn test_high_fill_warns_only() {
        let hw = hardware();
        let program = Program {
            steps: vec![Step::new("fill", inject(47.0, "water"))],
        };
        let report = validate(&program, Some(&hw));
        assert!(report.is_valid());
        assert!(report.find(DiagnosticCode::HighFillLevel).is_some());
        assert!(report.find(DiagnosticCode::OverflowRisk).is_none());
    }

    // === Test: loop accounting with margin warning at count 4 ===
    #[test]
    fn test_loop_margin_then_insufficient() {
        let mut hw = hardware();
        hw.bottle_capacity_ml = 500.0;
        hw.max_fill_ml = 400.0;
        hw.liquids[1].available_ml = 90.0;

        let body = vec![Step::new("inject", inject(20.0, "ethanol"))];
        let looped = |count| Program {
            steps: vec![Step::new(
                "cycle",
                Action::Loop(LoopAction {
                    count,
                    steps: body.clone(),
                }),
            )],
        };

        let report = validate(&looped(4), Some(&hw));
        assert!(report.is_valid(), "{:?}", report.diagnostics);
        assert!(report.find(DiagnosticCode::LowLiquidMargin).is_some());
        assert!((report.estimate.per_pump_consumption_ml[2] - 80.0).abs() < 1e-9);

        let report = validate(&looped(5), Some(&hw));
        assert!(!report.is_valid());
        assert!(report.find(DiagnosticCode::InsufficientLiquid).is_some());
    }

    // === Test: zero-count loop is legal but still checked structurally ===
    #[test]
    fn test_zero_count_loop() {
        let hw = hardware();
        let program = Program {
            steps: vec![Step::new(
                "noop cycle",
                Action::Loop(LoopAction {
                    count: 0,
                    steps: vec![Step::new("bad", inject(10.0, "unknown"))],
                }),
            )],
        };
        let report = validate(&program, Some(&hw));
        // Structural error from the body survives.
        let diag = report.find(DiagnosticCode::UnknownLiquid).unwrap();
        assert_eq!(diag.path, "steps[0].loop.steps[0].inject.components[0].liquid_id");
        // But no resources were consumed.
        assert!(report.estimate.per_pump_consumption_ml.iter().all(|c| *c == 0.0));
        assert_eq!(report.estimate.peak_level_ml, 0.0);
    }

    #[test]
    fn test_empty_loop_errors() {
        let hw = hardware();
        let program = Program {
            steps: vec![Step::new(
                "hollow",
                Action::Loop(LoopAction {
                    count: 3,
                    steps: Vec::new(),
                }),
            )],
        };
        let report = validate(&program, Some(&hw));
        assert_eq!(
            report.find(DiagnosticCode::EmptyLoop).map(|d| d.path.as_str()),
            Some("steps[0].loop")
        );
    }

    // === Test: large tolerance boundary ===
    #[test]
    fn test_large_tolerance_warning() {
        let hw = hardware();
        let mut action = inject(10.0, "water");
        if let Action::Inject(a) = &mut action {
            a.tolerance_g = 5.1;
        }
        let program = Program {
            steps: vec![Step::new("sloppy", action)],
        };
        let report = validate(&program, Some(&hw));
        assert!(report.find(DiagnosticCode::LargeTolerance).is_some());

        let mut tight = inject(10.0, "water");
        if let Action::Inject(a) = &mut tight {
            a.tolerance_g = 5.0;
        }
        let program = Program {
            steps: vec![Step::new("fine", tight)],
        };
        let report = validate(&program, Some(&hw));
        assert!(report.find(DiagnosticCode::LargeTolerance).is_none());
    }

    // === Test: weight target converts through weighted density ===
    #[test]
    fn test_weight_target_uses_density() {
        let hw = hardware();
        let program = Program {
            steps: vec![Step::new(
                "by weight",
                Action::Inject(InjectAction {
                    volume_ml: None,
                    weight_g: Some(7.89),
                    tolerance_g: 0.1,
                    flow_rate_ml_min: 5.0,
                    stable_timeout_s: 10.0,
                    components: vec![Component {
                        liquid_id: "ethanol".to_owned(),
                        ratio: 1.0,
                    }],
                }),
            )],
        };
        let report = validate(&program, Some(&hw));
        assert!(report.is_valid(), "{:?}", report.diagnostics);
        // 7.89 g / 0.789 g/mL = 10 mL.
        assert!((report.estimate.per_pump_consumption_ml[2] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_target_errors() {
        let hw = hardware();
        let program = Program {
            steps: vec![Step::new(
                "aimless",
                Action::Inject(InjectAction {
                    volume_ml: None,
                    weight_g: None,
                    tolerance_g: 0.1,
                    flow_rate_ml_min: 5.0,
                    stable_timeout_s: 10.0,
                    components: vec![Component {
                        liquid_id: "water".to_owned(),
                        ratio: 1.0,
                    }],
                }),
            )],
        };
        let report = validate(&program, Some(&hw));
        assert_eq!(
            report.find(DiagnosticCode::NoTarget).map(|d| d.path.as_str()),
            Some("steps[0].inject")
        );
    }

    #[test]
    fn test_missing_hardware_errors() {
        let program = Program { steps: Vec::new() };
        let report = validate(&program, None);
        assert!(report.find(DiagnosticCode::MissingHardware).is_some());
        assert!(!report.is_valid());
    }

    #[test]
    fn test_duplicate_ids_and_pumps() {
        let mut hw = hardware();
        hw.liquids.push(LiquidInventory {
            id: "water".to_owned(),
            name: "Dup".to_owned(),
            pump_index: 2,
            kind: LiquidType::Unspecified,
            available_ml: 10.0,
            density_g_per_ml: None,
        });
        let report = validate(&Program { steps: Vec::new() }, Some(&hw));
        assert!(report.find(DiagnosticCode::DuplicateLiquidId).is_some());
        assert!(report.find(DiagnosticCode::DuplicatePumpIndex).is_some());
    }

    #[test]
    fn test_no_rinse_liquid_warns() {
        let mut hw = hardware();
        hw.liquids.remove(0);
        let report = validate(&Program { steps: Vec::new() }, Some(&hw));
        assert!(report.find(DiagnosticCode::NoRinseLiquid).is_some());
        assert!(report.is_valid());
    }

    #[test]
    fn test_wait_and_acquire_discriminators() {
        let hw = hardware();
        let program = Program {
            steps: vec![
                Step::new("wait", Action::Wait(WaitAction {
                    condition: None,
                    timeout_s: 10.0,
                })),
                Step::new("acquire", Action::Acquire(AcquireAction {
                    pump_pwm: 0.5,
                    termination: None,
                    max_duration_s: 60.0,
                })),
            ],
        };
        let report = validate(&program, Some(&hw));
        assert!(report.find(DiagnosticCode::NoCondition).is_some());
        assert!(report.find(DiagnosticCode::NoTermination).is_some());
    }

    #[test]
    fn test_empty_drain_and_step_name_warnings() {
        let hw = hardware();
        let program = Program {
            steps: vec![Step {
                name: String::new(),
                action: Some(Action::Drain(DrainAction {
                    pump_pwm: 0.5,
                    timeout_s: 20.0,
                })),
            }],
        };
        let report = validate(&program, Some(&hw));
        assert!(report.find(DiagnosticCode::EmptyDrain).is_some());
        assert!(report.find(DiagnosticCode::EmptyStepName).is_some());
        assert!(report.is_valid());
    }

    #[test]
    fn test_wash_consumes_rinse_liquid() {
        let hw = hardware();
        let program = Program {
            steps: vec![Step::new(
                "rinse",
                Action::Wash(WashAction {
                    repeat_count: 3,
                    liquid_id: None,
                    volume_ml: 15.0,
                    flow_rate_ml_min: 10.0,
                    drain_pwm: 0.6,
                    drain_timeout_s: 30.0,
                    final_drain: true,
                }),
            )],
        };
        let report = validate(&program, Some(&hw));
        assert!(report.is_valid(), "{:?}", report.diagnostics);
        assert!((report.estimate.per_pump_consumption_ml[0] - 45.0).abs() < 1e-9);
        assert_eq!(report.estimate.final_level_ml, 0.0);
        assert!((report.estimate.peak_level_ml - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_heater_cycles_accumulate() {
        let hw = hardware();
        let program = Program {
            steps: vec![Step::new(
                "acquire",
                Action::Acquire(AcquireAction {
                    pump_pwm: 0.5,
                    termination: Some(AcquireTermination::HeaterCycles { cycles: 12 }),
                    max_duration_s: 600.0,
                }),
            )],
        };
        let report = validate(&program, Some(&hw));
        assert_eq!(report.estimate.heater_cycles, 12);
    }

    // === Test: validation is pure ===
    #[test]
    fn test_validate_is_pure() {
        let hw = hardware();
        let program = Program {
            steps: vec![
                Step::new("fill", inject(30.0, "water")),
                Step::new("again", inject(30.0, "water")),
                Step::new(
                    "cycle",
                    Action::Loop(LoopAction {
                        count: 2,
                        steps: vec![Step::new("inner", inject(1.0, "ethanol"))],
                    }),
                ),
            ],
        };
        let first = validate(&program, Some(&hw));
        let second = validate(&program, Some(&hw));
        assert_eq!(first, second);
    }
}
