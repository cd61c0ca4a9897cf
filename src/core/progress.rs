//! Weighted, step-scoped progress reporting.
//!
//! Callers open a [`ProgressStep`] with a weight and report fractional
//! increments within it. Overall progress is
//! `(closed weight + sum(open weight * open fraction)) / total weight`, where
//! the total grows as steps are opened. A step closes at its full weight when
//! its guard is finished or dropped, including on error paths.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// Receives overall progress in `[0, 1]` and a status message.
///
/// Called with the reporter's lock held; it must not call back into the
/// reporter.
pub type ProgressCallback = Box<dyn Fn(f64, &str) + Send + Sync>;

#[derive(Debug)]
struct OpenStep {
    id: u64,
    weight: f64,
    fraction: f64,
}

struct State {
    callback: Option<ProgressCallback>,
    expected_weight: f64,
    opened_weight: f64,
    closed_weight: f64,
    open: Vec<OpenStep>,
    next_id: u64,
    last_reported: f64,
}

impl State {
    fn overall(&self) -> f64 {
        let total = self.expected_weight.max(self.opened_weight);
        if total <= 0.0 {
            return self.last_reported;
        }
        let in_flight: f64 = self.open.iter().map(|s| s.weight * s.fraction).sum();
        ((self.closed_weight + in_flight) / total).clamp(0.0, 1.0)
    }

    fn report(&mut self, message: &str) {
        let value = self.overall().max(self.last_reported);
        self.last_reported = value;
        debug!(progress = value, status = message, "Progress");
        if let Some(callback) = &self.callback {
            callback(value, message);
        }
    }
}

/// Shared progress aggregator. Clones report into the same state.
#[derive(Clone)]
pub struct ProgressReporter {
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("current", &self.current())
            .finish()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}

impl ProgressReporter {
    /// Create a reporter forwarding updates to `callback`
    pub fn new(callback: impl Fn(f64, &str) + Send + Sync + 'static) -> Self {
        Self::with_callback(Some(Box::new(callback)))
    }

    /// Create a reporter that only tracks state
    pub fn silent() -> Self {
        Self::with_callback(None)
    }

    fn with_callback(callback: Option<ProgressCallback>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                callback,
                expected_weight: 0.0,
                opened_weight: 0.0,
                closed_weight: 0.0,
                open: Vec::new(),
                next_id: 0,
                last_reported: 0.0,
            })),
        }
    }

    /// Hint the total weight of all steps yet to be opened, so early steps
    /// do not report as complete work
    pub fn with_expected_weight(self, weight: f64) -> Self {
        self.lock().expected_weight = weight.max(0.0);
        self
    }

    /// Declare that `weight` units of steps are still to be opened, on top of
    /// those opened so far. Replaces any earlier hint; `0.0` clears it.
    pub fn expect_remaining(&self, weight: f64) {
        let mut state = self.lock();
        let weight = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
        state.expected_weight = state.opened_weight + weight;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a step of `weight` units
    pub fn step(&self, weight: f64, label: &str) -> ProgressStep {
        let weight = if weight.is_finite() { weight.max(0.0) } else { 0.0 };

        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.opened_weight += weight;
        state.open.push(OpenStep {
            id,
            weight,
            fraction: 0.0,
        });
        state.report(label);

        ProgressStep {
            reporter: self.clone(),
            id,
            weight,
            label: label.to_string(),
            closed: false,
        }
    }

    /// Last reported overall progress
    pub fn current(&self) -> f64 {
        self.lock().last_reported
    }

    /// Report a status message without changing progress
    pub fn message(&self, message: &str) {
        self.lock().report(message);
    }

    fn advance(&self, id: u64, amount: f64, message: &str) {
        let mut state = self.lock();
        if let Some(step) = state.open.iter_mut().find(|s| s.id == id) {
            if step.weight > 0.0 && amount.is_finite() {
                step.fraction = (step.fraction + amount / step.weight).clamp(0.0, 1.0);
            }
        }
        state.report(message);
    }

    fn close(&self, id: u64, message: &str) {
        let mut state = self.lock();
        if let Some(pos) = state.open.iter().position(|s| s.id == id) {
            let step = state.open.remove(pos);
            state.closed_weight += step.weight;
            state.report(message);
        }
    }
}

/// An open progress step. Closes at full weight when finished or dropped.
#[must_use = "a step closes as soon as it is dropped"]
pub struct ProgressStep {
    reporter: ProgressReporter,
    id: u64,
    weight: f64,
    label: String,
    closed: bool,
}

impl fmt::Debug for ProgressStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressStep")
            .field("label", &self.label)
            .field("weight", &self.weight)
            .finish()
    }
}

impl ProgressStep {
    /// Advance by `amount` units of this step's weight
    pub fn increment(&self, amount: f64, message: &str) {
        self.reporter.advance(self.id, amount, message);
    }

    /// Open a nested step sharing this step's reporter
    pub fn substep(&self, weight: f64, label: &str) -> ProgressStep {
        self.reporter.step(weight, label)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Close the step at full weight
    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.reporter.close(self.id, &self.label);
        }
    }
}

impl Drop for ProgressStep {
    fn drop(&mut self) {
        self.close();
    }
}
