//! The combined L0/L1 state controller.
//!
//! One [`SystemState`] owns both the coarse peripheral configuration
//! and the fine-grained activity phase behind a single lock. Coarse
//! transitions diff the old and new peripheral snapshots and emit only
//! delta commands, in a deterministic order: valves before pumps, pump
//! stops before pump starts, linked pins batched with their trigger.
//!
//! The cleaning-pump soft start is the one deliberate weakening of the
//! locking discipline: the lock is released between the ten ramp
//! sub-commands so an out-of-band path (emergency stop, reverse sync)
//! can preempt the ramp. Observers must tolerate intermediate PWM
//! values; a preempted ramp simply stops.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use enose_driver::command::pins;
use enose_driver::{ActuatorCommand, ActuatorDriver, STEPPER_NAMES};
use enose_error::{EnoseError, Result};
use enose_types::{
    ActivityState, CoarseState, EngineEvent, MeteringPump, MotionRequest, PeripheralState,
    PwmDuty, METERING_PUMP_COUNT,
};

use crate::template::template;

/// Number of sub-commands in a cleaning-pump soft start.
pub const RAMP_STEPS: u32 = 10;
/// Spacing between soft-start sub-commands.
pub const RAMP_INTERVAL: Duration = Duration::from_millis(100);

type Listener = Box<dyn Fn(&EngineEvent) + Send + Sync>;

// ---------------------------------------------------------------------------
// InjectMotion
// ---------------------------------------------------------------------------

/// Parameters of one multi-axis parallel injection move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InjectMotion {
    /// Per-axis travel in millimetres, indexed by pump index.
    pub distances_mm: [f64; METERING_PUMP_COUNT],
    /// Axis speed in mm/s. The firmware feedrate is this × 60.
    pub speed_mm_s: f64,
}

impl InjectMotion {
    /// Firmware feedrate in mm/min.
    #[must_use]
    pub fn feedrate_mm_min(&self) -> f64 {
        self.speed_mm_s * 60.0
    }

    /// Whether every axis distance is zero (no motion to emit).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.distances_mm.iter().all(|d| *d <= 0.0)
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

struct Inner {
    peripheral: PeripheralState,
    coarse: CoarseState,
    activity: ActivityState,
    /// Bumped on every coarse change; a running soft-start ramp aborts
    /// when it observes a different epoch.
    epoch: u64,
}

struct Ramp {
    from: f64,
    to: f64,
}

/// Everything a coarse change wants to do after the lock is released.
struct Plan {
    commands: SmallVec<[ActuatorCommand; 12]>,
    ramp: Option<Ramp>,
    epoch: u64,
    coarse_change: Option<(CoarseState, CoarseState)>,
    activity_change: Option<(ActivityState, ActivityState)>,
}

impl Plan {
    fn noop(epoch: u64) -> Self {
        Self {
            commands: SmallVec::new(),
            ramp: None,
            epoch,
            coarse_change: None,
            activity_change: None,
        }
    }
}

/// Diff two peripheral snapshots into ordered actuator commands.
///
/// Returns the soft-start ramp when the cleaning pump duty increases.
fn diff(
    old: &PeripheralState,
    new: &PeripheralState,
    commands: &mut SmallVec<[ActuatorCommand; 12]>,
) -> Option<Ramp> {
    // Valves first.
    for (pin, o, n) in [
        (pins::VALVE_WASTE, old.valve_waste, new.valve_waste),
        (pins::VALVE_CHAMBER, old.valve_chamber, new.valve_chamber),
        (pins::VALVE_INLET, old.valve_inlet, new.valve_inlet),
    ] {
        if o != n {
            commands.push(ActuatorCommand::SetPin {
                pin,
                value: n.pin_value(),
            });
        }
    }
    // The pinch valve is linked: its companion fans move in the same batch.
    if old.valve_pinch != new.valve_pinch {
        let value = new.valve_pinch.pin_value();
        for pin in [pins::PINCH_VALVE, pins::PINCH_FAN_A, pins::PINCH_FAN_B] {
            commands.push(ActuatorCommand::SetPin { pin, value });
        }
    }

    // Pumps: stops (duty decreasing) before starts.
    let mut starts: SmallVec<[ActuatorCommand; 4]> = SmallVec::new();
    for (pin, o, n) in [
        (pins::AIR_PUMP, old.air_pump, new.air_pump),
        (pins::HEATER, old.heater, new.heater),
    ] {
        if o != n {
            let cmd = ActuatorCommand::SetPwm {
                pin,
                duty: n.value(),
            };
            if n.value() < o.value() {
                commands.push(cmd);
            } else {
                starts.push(cmd);
            }
        }
    }

    let mut ramp = None;
    if old.cleaning_pump != new.cleaning_pump {
        if new.cleaning_pump.value() < old.cleaning_pump.value() {
            // Decreases take effect immediately.
            commands.push(ActuatorCommand::SetPwm {
                pin: pins::CLEANING_PUMP,
                duty: new.cleaning_pump.value(),
            });
        } else {
            ramp = Some(Ramp {
                from: old.cleaning_pump.value(),
                to: new.cleaning_pump.value(),
            });
        }
    }

    commands.extend(starts);
    ramp
}

// ---------------------------------------------------------------------------
// SystemState
// ---------------------------------------------------------------------------

/// The two-level hardware state machine.
pub struct SystemState {
    inner: Mutex<Inner>,
    driver: Option<Arc<dyn ActuatorDriver>>,
    listeners: Mutex<Vec<Listener>>,
}

impl SystemState {
    /// Controller wired to an actuator driver, starting idle.
    #[must_use]
    pub fn new(driver: Arc<dyn ActuatorDriver>) -> Self {
        Self::build(Some(driver))
    }

    /// Controller without a driver. Every command-emitting operation
    /// logs an error and returns without mutation.
    #[must_use]
    pub fn detached() -> Self {
        Self::build(None)
    }

    fn build(driver: Option<Arc<dyn ActuatorDriver>>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                peripheral: PeripheralState::all_off(),
                coarse: CoarseState::Initial,
                activity: ActivityState::Idle,
                epoch: 0,
            }),
            driver,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a state-change listener. Listeners are invoked after
    /// the state lock is released and must not block.
    pub fn subscribe(&self, listener: impl Fn(&EngineEvent) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Current coarse state.
    #[must_use]
    pub fn coarse(&self) -> CoarseState {
        self.inner.lock().coarse
    }

    /// Current activity state.
    #[must_use]
    pub fn activity(&self) -> ActivityState {
        self.inner.lock().activity
    }

    /// Snapshot of the current peripheral configuration.
    #[must_use]
    pub fn peripheral(&self) -> PeripheralState {
        self.inner.lock().peripheral
    }

    // -----------------------------------------------------------------------
    // L0: coarse transitions
    // -----------------------------------------------------------------------

    /// Move the peripherals to `target`'s template, emitting only delta
    /// commands. A no-op when already at `target`.
    ///
    /// # Errors
    /// `DRIVER_UNAVAILABLE` when no driver is attached; in that case no
    /// state is mutated.
    pub fn transition_to(&self, target: CoarseState) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.coarse == target {
            return Ok(());
        }
        if self.driver.is_none() {
            error!(coarse = %target, "coarse transition with no actuator driver");
            return Err(EnoseError::DriverUnavailable);
        }
        let plan = Self::plan_coarse(&mut inner, target);
        drop(inner);
        self.run_plan(plan, target);
        Ok(())
    }

    /// Compute the coarse-change plan while holding the lock.
    fn plan_coarse(inner: &mut MutexGuard<'_, Inner>, target: CoarseState) -> Plan {
        if inner.coarse == target {
            return Plan::noop(inner.epoch);
        }
        let mut commands: SmallVec<[ActuatorCommand; 12]> = SmallVec::new();

        // Any transition while a metering pump is still moving first
        // stops the motion out of band, bypassing the queued moves.
        if inner.peripheral.any_pump_running() {
            commands.push(ActuatorCommand::AsyncStop);
            inner.peripheral = inner.peripheral.with_pumps_stopped();
        }

        let new_peripheral = template(target);
        let ramp = diff(&inner.peripheral, &new_peripheral, &mut commands);

        let old_coarse = inner.coarse;
        inner.peripheral = new_peripheral;
        inner.coarse = target;
        inner.epoch += 1;

        // Back-sync L1 under the same lock, suppressing the echo when
        // the activity already projects onto the new coarse state.
        let activity_change = if inner.activity.project() == target {
            None
        } else {
            let old_activity = inner.activity;
            inner.activity = ActivityState::lift(target);
            Some((old_activity, inner.activity))
        };

        Plan {
            commands,
            ramp,
            epoch: inner.epoch,
            coarse_change: Some((old_coarse, target)),
            activity_change,
        }
    }

    /// Emit a plan's commands, notify listeners, and run the soft-start
    /// ramp (lock released, preemptible).
    fn run_plan(&self, plan: Plan, ramp_target: CoarseState) {
        if let Some(driver) = &self.driver {
            for cmd in &plan.commands {
                if let Err(err) = driver.send(cmd) {
                    // Send failures belong to the driver's own error
                    // channel; the local state keeps the desired value.
                    warn!(%err, command = %cmd.render(), "actuator command failed");
                }
            }
        }
        if let Some((old, new)) = plan.coarse_change {
            info!(from = %old, to = %new, "coarse state changed");
            self.notify(&EngineEvent::coarse_changed(old, new));
        }
        if let Some((old, new)) = plan.activity_change {
            info!(from = %old, to = %new, "activity back-synced");
            self.notify(&EngineEvent::activity_changed(old, new));
        }
        if let (Some(ramp), Some(driver)) = (plan.ramp, self.driver.clone()) {
            self.run_ramp(&driver, &ramp, plan.epoch, ramp_target);
        }
    }

    /// Soft-start the cleaning pump: ten equal steps 100 ms apart.
    ///
    /// The state lock is re-taken only to check for preemption; a
    /// concurrent coarse change (new epoch) aborts the ramp, leaving
    /// whatever intermediate duty was last commanded.
    fn run_ramp(&self, driver: &Arc<dyn ActuatorDriver>, ramp: &Ramp, epoch: u64, target: CoarseState) {
        let step_delta = (ramp.to - ramp.from) / f64::from(RAMP_STEPS);
        for step in 1..=RAMP_STEPS {
            {
                let inner = self.inner.lock();
                if inner.epoch != epoch || inner.coarse != target {
                    debug!(step, "soft-start ramp preempted");
                    return;
                }
            }
            let duty = ramp.from + step_delta * f64::from(step);
            let cmd = ActuatorCommand::SetPwm {
                pin: pins::CLEANING_PUMP,
                duty,
            };
            if let Err(err) = driver.send(&cmd) {
                warn!(%err, step, "soft-start sub-command failed");
                return;
            }
            if step < RAMP_STEPS {
                std::thread::sleep(RAMP_INTERVAL);
            }
        }
    }

    // -----------------------------------------------------------------------
    // L1: activity transitions
    // -----------------------------------------------------------------------

    /// Request an activity transition, enforcing the admissibility graph.
    ///
    /// # Errors
    /// `INVALID_TRANSITION` when the target is not admissible from the
    /// current state; `DRIVER_UNAVAILABLE` when the projected coarse
    /// state changes and no driver is attached.
    pub fn request_transition(&self, target: ActivityState) -> Result<()> {
        let inner = self.inner.lock();
        let from = inner.activity;
        if !from.admits(target) {
            debug!(%from, to = %target, "transition rejected");
            return Err(EnoseError::InvalidTransition { from, to: target });
        }
        self.apply_activity(inner, target)
    }

    /// Apply an activity transition without the admissibility check.
    ///
    /// Used by emergency paths and guard rollback.
    pub fn force_transition(&self, target: ActivityState) -> Result<()> {
        let inner = self.inner.lock();
        self.apply_activity(inner, target)
    }

    /// Force the machine into `emergency_stop`.
    pub fn emergency_stop(&self) -> Result<()> {
        warn!("emergency stop requested");
        self.force_transition(ActivityState::EmergencyStop)
    }

    /// Recover from `error` or `emergency_stop` back to `idle`.
    ///
    /// # Errors
    /// `INVALID_TRANSITION` from any other state.
    pub fn recover_from_error(&self) -> Result<()> {
        let inner = self.inner.lock();
        let from = inner.activity;
        if !matches!(from, ActivityState::Error | ActivityState::EmergencyStop) {
            return Err(EnoseError::InvalidTransition {
                from,
                to: ActivityState::Idle,
            });
        }
        info!(%from, "recovering to idle");
        self.apply_activity(inner, ActivityState::Idle)
    }

    fn apply_activity(&self, mut inner: MutexGuard<'_, Inner>, target: ActivityState) -> Result<()> {
        let from = inner.activity;
        if from == target {
            return Ok(());
        }
        let coarse_target = target.project();
        if inner.coarse != coarse_target && self.driver.is_none() {
            error!(to = %target, "activity transition needs a coarse change but no driver is attached");
            return Err(EnoseError::DriverUnavailable);
        }
        inner.activity = target;
        let plan = Self::plan_coarse(&mut inner, coarse_target);
        drop(inner);
        debug!(%from, to = %target, "activity state changed");
        self.notify(&EngineEvent::activity_changed(from, target));
        self.run_plan(plan, coarse_target);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reverse synchronization
    // -----------------------------------------------------------------------

    /// Accept a coarse state observed out of band (hardware interlock,
    /// emergency path on the driver callback thread).
    ///
    /// A confirming echo — the current activity already projects onto
    /// `observed` — is ignored to prevent feedback loops. Otherwise the
    /// activity lifts to the canonical state for `observed` and the
    /// local peripheral view follows the template. No actuator commands
    /// are emitted: the hardware is already there.
    pub fn sync_from_hardware(&self, observed: CoarseState) {
        let mut inner = self.inner.lock();
        if inner.activity.project() == observed {
            debug!(%observed, "reverse sync suppressed (echo)");
            return;
        }
        let old_activity = inner.activity;
        let old_coarse = inner.coarse;
        inner.activity = ActivityState::lift(observed);
        inner.coarse = observed;
        inner.peripheral = template(observed);
        inner.epoch += 1;
        let new_activity = inner.activity;
        drop(inner);

        info!(%observed, from = %old_activity, "reverse sync applied");
        if old_coarse != observed {
            self.notify(&EngineEvent::coarse_changed(old_coarse, observed));
        }
        self.notify(&EngineEvent::activity_changed(old_activity, new_activity));
    }

    // -----------------------------------------------------------------------
    // Inject motion
    // -----------------------------------------------------------------------

    /// Enter `inject`, bind the pump axes, and emit one parallel move.
    ///
    /// A zero-distance motion performs the state transition but emits
    /// no motion command.
    pub fn start_inject(&self, motion: &InjectMotion) -> Result<()> {
        let Some(driver) = self.driver.clone() else {
            error!("start_inject with no actuator driver");
            return Err(EnoseError::DriverUnavailable);
        };
        let mut inner = self.inner.lock();
        let plan = Self::plan_coarse(&mut inner, CoarseState::Inject);
        drop(inner);
        self.run_plan(plan, CoarseState::Inject);

        if motion.is_zero() {
            debug!("zero-volume inject: no motion emitted");
            return Ok(());
        }

        driver.send(&ActuatorCommand::RegisterPumpAxes)?;
        let feedrate = motion.feedrate_mm_min();
        driver.send(&ActuatorCommand::ParallelMove {
            distances_mm: motion.distances_mm,
            feedrate_mm_min: feedrate,
        })?;

        let mut inner = self.inner.lock();
        for (pump, distance) in inner
            .peripheral
            .metering_pumps
            .iter_mut()
            .zip(motion.distances_mm)
        {
            if distance > 0.0 {
                *pump = MeteringPump::Running(MotionRequest {
                    distance_mm: distance,
                    feedrate_mm_min: feedrate,
                });
            }
        }
        info!(feedrate, "parallel injection move started");
        Ok(())
    }

    /// Stop any injection motion out of band and return to `initial`.
    pub fn stop_inject(&self) -> Result<()> {
        let Some(driver) = self.driver.clone() else {
            error!("stop_inject with no actuator driver");
            return Err(EnoseError::DriverUnavailable);
        };
        driver.send(&ActuatorCommand::AsyncStop)?;
        let mut inner = self.inner.lock();
        inner.peripheral = inner.peripheral.with_pumps_stopped();
        let plan = Self::plan_coarse(&mut inner, CoarseState::Initial);
        drop(inner);
        self.run_plan(plan, CoarseState::Initial);
        // MCU-side steps already queued keep draining for up to a
        // second after the async stop; hold torque until then.
        std::thread::sleep(enose_driver::ASYNC_STOP_DRAIN);
        for stepper in STEPPER_NAMES {
            driver.send(&ActuatorCommand::DisableStepper { stepper })?;
        }
        Ok(())
    }

    /// Set the air pump's duty directly, without a coarse change.
    pub fn set_air_pump(&self, duty: f64) -> Result<()> {
        let Some(driver) = self.driver.clone() else {
            error!("set_air_pump with no actuator driver");
            return Err(EnoseError::DriverUnavailable);
        };
        let duty = PwmDuty::clamped(duty);
        self.inner.lock().peripheral.air_pump = duty;
        driver.send(&ActuatorCommand::SetPwm {
            pin: pins::AIR_PUMP,
            duty: duty.value(),
        })
    }

    fn notify(&self, event: &EngineEvent) {
        for listener in self.listeners.lock().iter() {
            listener(event);
        }
    }
}
