//! Shared observation helpers: cooperative sleeps, the empty-bottle
//! wait, and the sliding-window stability criterion.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use enose_driver::Scale;
use enose_error::{EnoseError, Result, TimeoutKind};

use crate::control::ControlFlags;

/// Sleep until `deadline`, slicing the wait into poll-interval chunks
/// so stop/pause requests are honored promptly.
///
/// # Errors
/// `CANCELLED` when a stop arrives during the sleep.
pub fn cooperative_sleep_until(
    deadline: Instant,
    control: &ControlFlags,
    poll: Duration,
) -> Result<()> {
    loop {
        control.check_stop_or_pause()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep(poll.min(deadline - now));
    }
}

/// Parameters for [`wait_for_empty`].
#[derive(Debug, Clone, Copy)]
pub struct EmptyWait {
    /// Known empty baseline; `None` adopts the first stable reading.
    pub baseline_g: Option<f64>,
    /// How close to the baseline counts as empty, grams.
    pub tolerance_g: f64,
    /// How long readings must stay empty before terminating.
    pub window: Duration,
    /// Absolute deadline for the whole wait.
    pub deadline: Instant,
    /// Timeout length reported on failure, seconds.
    pub timeout_s: f64,
}

/// Observe the load cell until it settles at the empty baseline.
///
/// A reading counts as empty when it is stable and within
/// `tolerance_g` of the baseline; the wait terminates once readings
/// stay empty for `window`. Returns the settled value, which callers
/// feed back into the dynamic empty weight.
///
/// # Errors
/// `CANCELLED` on stop, `TIMEOUT` (empty-bottle kind) past the
/// deadline, and scale read failures.
pub fn wait_for_empty(
    scale: &dyn Scale,
    params: &EmptyWait,
    control: &ControlFlags,
    poll: Duration,
) -> Result<f64> {
    let mut baseline = params.baseline_g;
    let mut settled_since: Option<Instant> = None;
    let mut settled_value = 0.0;
    loop {
        control.check_stop_or_pause()?;
        if Instant::now() >= params.deadline {
            return Err(EnoseError::Timeout {
                kind: TimeoutKind::EmptyBottle,
                deadline_s: params.timeout_s,
            });
        }
        let reading = scale.read()?;
        if reading.stable {
            let base = *baseline.get_or_insert(reading.grams);
            if (reading.grams - base).abs() <= params.tolerance_g {
                let now = Instant::now();
                match settled_since {
                    Some(since) if now.duration_since(since) >= params.window => {
                        debug!(grams = settled_value, "bottle settled empty");
                        return Ok(settled_value);
                    }
                    Some(_) => {}
                    None => {
                        settled_since = Some(now);
                        settled_value = reading.grams;
                    }
                }
            } else {
                settled_since = None;
            }
        } else {
            settled_since = None;
        }
        std::thread::sleep(poll);
    }
}

/// Sliding-window derivative criterion over load-cell samples.
#[derive(Debug)]
pub struct StabilityWindow {
    window: Duration,
    max_slope_g_per_s: f64,
    samples: VecDeque<(Instant, f64)>,
}

impl StabilityWindow {
    #[must_use]
    pub fn new(window: Duration, max_slope_g_per_s: f64) -> Self {
        Self {
            window,
            max_slope_g_per_s,
            samples: VecDeque::new(),
        }
    }

    /// Record a sample and drop everything older than the window.
    pub fn push(&mut self, at: Instant, grams: f64) {
        self.samples.push_back((at, grams));
        while let Some(&(oldest, _)) = self.samples.front() {
            if at.duration_since(oldest) > self.window && self.samples.len() > 2 {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether the window is full and the end-to-end slope is within
    /// the configured bound.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        let (Some(&(first_t, first_w)), Some(&(last_t, last_w))) =
            (self.samples.front(), self.samples.back())
        else {
            return false;
        };
        let span = last_t.duration_since(first_t);
        if span < self.window {
            return false;
        }
        let slope = (last_w - first_w) / span.as_secs_f64();
        slope.abs() <= self.max_slope_g_per_s
    }
}
