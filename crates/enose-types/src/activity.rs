//! Fine-grained activity phases (L1) and their projection onto L0.
//!
//! The activity machine tracks where the rig is *within* a workflow.
//! Every activity state projects onto exactly one [`CoarseState`]; the
//! lift is the chosen canonical inverse used when hardware-side changes
//! arrive out of band and L1 has to follow.

use serde::{Deserialize, Serialize};

use crate::peripheral::CoarseState;

/// Fine-grained phase within a workflow (L1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Idle,
    InjectPreparing,
    InjectRunning,
    InjectStabilizing,
    DrainPreparing,
    DrainRunning,
    CleanPreparing,
    CleanFilling,
    CleanDraining,
    SamplePreparing,
    SampleAcquiring,
    Error,
    EmergencyStop,
}

impl ActivityState {
    /// Stable lower-case name used in logs and events.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InjectPreparing => "inject_preparing",
            Self::InjectRunning => "inject_running",
            Self::InjectStabilizing => "inject_stabilizing",
            Self::DrainPreparing => "drain_preparing",
            Self::DrainRunning => "drain_running",
            Self::CleanPreparing => "clean_preparing",
            Self::CleanFilling => "clean_filling",
            Self::CleanDraining => "clean_draining",
            Self::SamplePreparing => "sample_preparing",
            Self::SampleAcquiring => "sample_acquiring",
            Self::Error => "error",
            Self::EmergencyStop => "emergency_stop",
        }
    }

    /// Project this activity state onto its coarse peripheral state.
    #[must_use]
    pub const fn project(self) -> CoarseState {
        match self {
            Self::Idle | Self::Error | Self::EmergencyStop => CoarseState::Initial,
            Self::InjectPreparing | Self::InjectRunning | Self::InjectStabilizing => {
                CoarseState::Inject
            }
            Self::DrainPreparing | Self::DrainRunning => CoarseState::Drain,
            Self::CleanPreparing | Self::CleanFilling | Self::CleanDraining => CoarseState::Clean,
            Self::SamplePreparing | Self::SampleAcquiring => CoarseState::Sample,
        }
    }

    /// Canonical inverse of [`project`](Self::project).
    ///
    /// Used when an out-of-band path reports a new coarse state and the
    /// activity machine has to follow it.
    #[must_use]
    pub const fn lift(coarse: CoarseState) -> Self {
        match coarse {
            CoarseState::Initial => Self::Idle,
            CoarseState::Inject => Self::InjectRunning,
            CoarseState::Drain => Self::DrainRunning,
            CoarseState::Clean => Self::CleanFilling,
            CoarseState::Sample => Self::SampleAcquiring,
        }
    }

    /// Whether a requested transition `self -> target` is admissible.
    ///
    /// The graph is sparse: workflows progress sequentially, every state
    /// can fall back to `Idle` or into `Error`/`EmergencyStop`, the
    /// terminal fault states recover only to `Idle`, and the clean
    /// workflow may loop `CleanDraining -> CleanFilling`.
    #[must_use]
    pub fn admits(self, target: Self) -> bool {
        if self == target {
            return true;
        }
        // Fault entry is admissible from every live state.
        if matches!(target, Self::Error | Self::EmergencyStop)
            && !matches!(self, Self::Error | Self::EmergencyStop)
        {
            return true;
        }
        match self {
            Self::Idle => matches!(
                target,
                Self::InjectPreparing
                    | Self::DrainPreparing
                    | Self::CleanPreparing
                    | Self::SamplePreparing
            ),
            Self::InjectPreparing => matches!(target, Self::InjectRunning | Self::Idle),
            Self::InjectRunning => matches!(target, Self::InjectStabilizing | Self::Idle),
            Self::InjectStabilizing => target == Self::Idle,
            Self::DrainPreparing => matches!(target, Self::DrainRunning | Self::Idle),
            Self::DrainRunning => target == Self::Idle,
            Self::CleanPreparing => matches!(target, Self::CleanFilling | Self::Idle),
            Self::CleanFilling => matches!(target, Self::CleanDraining | Self::Idle),
            Self::CleanDraining => matches!(target, Self::CleanFilling | Self::Idle),
            Self::SamplePreparing => matches!(target, Self::SampleAcquiring | Self::Idle),
            Self::SampleAcquiring => target == Self::Idle,
            Self::Error | Self::EmergencyStop => target == Self::Idle,
        }
    }
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ActivityState; 13] = [
        ActivityState::Idle,
        ActivityState::InjectPreparing,
        ActivityState::InjectRunning,
        ActivityState::InjectStabilizing,
        ActivityState::DrainPreparing,
        ActivityState::DrainRunning,
        ActivityState::CleanPreparing,
        ActivityState::CleanFilling,
        ActivityState::CleanDraining,
        ActivityState::SamplePreparing,
        ActivityState::SampleAcquiring,
        ActivityState::Error,
        ActivityState::EmergencyStop,
    ];

    // === Test: lift is a right inverse of project ===
    #[test]
    fn test_lift_then_project_round_trips() {
        for coarse in CoarseState::ALL {
            assert_eq!(ActivityState::lift(coarse).project(), coarse);
        }
    }

    // === Test: every live state admits fault entry ===
    #[test]
    fn test_fault_entry_always_admissible() {
        for s in ALL {
            if matches!(s, ActivityState::Error | ActivityState::EmergencyStop) {
                continue;
            }
            assert!(s.admits(ActivityState::Error), "{s} must admit error");
            assert!(
                s.admits(ActivityState::EmergencyStop),
                "{s} must admit emergency_stop"
            );
        }
    }

    // === Test: fault states recover only to idle ===
    #[test]
    fn test_fault_recovers_only_to_idle() {
        for fault in [ActivityState::Error, ActivityState::EmergencyStop] {
            for target in ALL {
                let expect = target == ActivityState::Idle || target == fault;
                assert_eq!(fault.admits(target), expect, "{fault} -> {target}");
            }
        }
    }

    // === Test: clean workflow may loop ===
    #[test]
    fn test_clean_loop() {
        assert!(ActivityState::CleanDraining.admits(ActivityState::CleanFilling));
        assert!(ActivityState::CleanFilling.admits(ActivityState::CleanDraining));
    }

    // === Test: idle reaches only preparing states and faults ===
    #[test]
    fn test_idle_fanout() {
        assert!(ActivityState::Idle.admits(ActivityState::InjectPreparing));
        assert!(ActivityState::Idle.admits(ActivityState::SamplePreparing));
        assert!(!ActivityState::Idle.admits(ActivityState::InjectRunning));
        assert!(!ActivityState::Idle.admits(ActivityState::CleanFilling));
    }
}
