//! Scoped state transactions with rollback on non-commit exit.
//!
//! A guard captures the state it was opened at, optionally transitions
//! to a working state, and — unless committed — forces the machine back
//! to the captured state when it goes out of scope. Rollback takes the
//! same lock as every other transition, so it is atomic with respect to
//! concurrent requests. Moving a guard is safe: Rust runs `Drop` once,
//! so the moved-from binding is inert.

use tracing::{debug, info, warn};

use enose_error::Result;
use enose_types::{ActivityState, CoarseState};

use crate::system::SystemState;

// ---------------------------------------------------------------------------
// ActivityGuard
// ---------------------------------------------------------------------------

/// Transaction guard over the activity machine (L1).
pub struct ActivityGuard<'a> {
    system: &'a SystemState,
    initial: ActivityState,
    action: &'static str,
    committed: bool,
}

impl<'a> ActivityGuard<'a> {
    /// Open a guard, optionally transitioning to `target` first.
    ///
    /// # Errors
    /// Propagates the transition failure; no guard is created and no
    /// rollback is pending in that case.
    pub fn begin(
        system: &'a SystemState,
        action: &'static str,
        target: Option<ActivityState>,
    ) -> Result<Self> {
        let initial = system.activity();
        if let Some(target) = target {
            system.request_transition(target)?;
        }
        debug!(action, from = %initial, "activity transaction open");
        Ok(Self {
            system,
            initial,
            action,
            committed: false,
        })
    }

    /// State captured when the guard was opened.
    #[must_use]
    pub const fn initial(&self) -> ActivityState {
        self.initial
    }

    /// Keep the current state.
    pub fn commit(mut self) {
        self.committed = true;
        info!(action = self.action, at = %self.system.activity(), "activity transaction committed");
    }

    /// Transition to `state`, then commit.
    ///
    /// # Errors
    /// If the transition fails the guard is consumed and rolls back.
    pub fn commit_with_state(mut self, state: ActivityState) -> Result<()> {
        self.system.request_transition(state)?;
        self.committed = true;
        info!(action = self.action, at = %state, "activity transaction committed");
        Ok(())
    }

    /// Force back to the captured state, then commit.
    pub fn commit_and_restore(mut self) {
        if let Err(err) = self.system.force_transition(self.initial) {
            warn!(action = self.action, %err, "commit-and-restore transition failed");
        }
        self.committed = true;
        info!(action = self.action, at = %self.initial, "activity transaction committed (restored)");
    }
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        warn!(
            action = self.action,
            back_to = %self.initial,
            "activity transaction rolled back"
        );
        if let Err(err) = self.system.force_transition(self.initial) {
            warn!(action = self.action, %err, "rollback transition failed");
        }
    }
}

// ---------------------------------------------------------------------------
// CoarseGuard
// ---------------------------------------------------------------------------

/// Transaction guard over the coarse peripheral state (L0).
pub struct CoarseGuard<'a> {
    system: &'a SystemState,
    initial: CoarseState,
    action: &'static str,
    committed: bool,
}

impl<'a> CoarseGuard<'a> {
    /// Open a guard, optionally transitioning to `target` first.
    pub fn begin(
        system: &'a SystemState,
        action: &'static str,
        target: Option<CoarseState>,
    ) -> Result<Self> {
        let initial = system.coarse();
        if let Some(target) = target {
            system.transition_to(target)?;
        }
        debug!(action, from = %initial, "coarse transaction open");
        Ok(Self {
            system,
            initial,
            action,
            committed: false,
        })
    }

    /// State captured when the guard was opened.
    #[must_use]
    pub const fn initial(&self) -> CoarseState {
        self.initial
    }

    /// Keep the current state.
    pub fn commit(mut self) {
        self.committed = true;
        info!(action = self.action, at = %self.system.coarse(), "coarse transaction committed");
    }

    /// Transition to `state`, then commit.
    pub fn commit_with_state(mut self, state: CoarseState) -> Result<()> {
        self.system.transition_to(state)?;
        self.committed = true;
        info!(action = self.action, at = %state, "coarse transaction committed");
        Ok(())
    }

    /// Return to the captured state, then commit.
    pub fn commit_and_restore(mut self) {
        if let Err(err) = self.system.transition_to(self.initial) {
            warn!(action = self.action, %err, "commit-and-restore transition failed");
        }
        self.committed = true;
        info!(action = self.action, at = %self.initial, "coarse transaction committed (restored)");
    }
}

impl Drop for CoarseGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        warn!(
            action = self.action,
            back_to = %self.initial,
            "coarse transaction rolled back"
        );
        if let Err(err) = self.system.transition_to(self.initial) {
            warn!(action = self.action, %err, "rollback transition failed");
        }
    }
}
