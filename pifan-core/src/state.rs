//! Shared state store
//!
//! The single mutually-exclusive region holding the last metrics sample
//! and the fan control fields. The monitor loop and the request handlers
//! only ever touch the state through the methods here; the mutex is never
//! held across sensor reads, GPIO writes, or socket I/O.

use parking_lot::Mutex;

use crate::data::{SharedState, SystemSnapshot};
use crate::engine::{FanDecision, FanPolicy};

/// Authoritative store for the shared monitoring/control state.
///
/// Created once at process start with all-zero/false defaults and an
/// absent temperature; overwritten wholesale by [`StateStore::commit`]
/// each tick and partially (manual preference only) by
/// [`StateStore::set_manual`].
#[derive(Debug, Default)]
pub struct StateStore {
    inner: Mutex<SharedState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SharedState::default()),
        }
    }

    /// Atomic, consistent clone of the whole structure.
    ///
    /// The metrics half and the fan half always come from the same tick;
    /// a reader never sees a snapshot paired with a decision computed
    /// from a different sample.
    pub fn status(&self) -> SharedState {
        self.inner.lock().clone()
    }

    /// Update the manual fan preference.
    ///
    /// Only `manual_on` is written; the actuator is untouched here. The
    /// monitor loop folds the new preference into `actual_on` on its next
    /// tick, so the change becomes visible within one poll interval.
    pub fn set_manual(&self, on: bool) {
        self.inner.lock().fan.manual_on = on;
    }

    /// Commit one completed tick in a single critical section.
    ///
    /// Reads the current manual preference, evaluates the policy against
    /// the fresh sample, and stores sample and decision together, so the
    /// invariant `actual_on == policy(forced_auto, manual_on)` holds for
    /// the stored pair at every observable instant.
    pub fn commit(&self, metrics: SystemSnapshot, policy: &FanPolicy) -> FanDecision {
        let mut guard = self.inner.lock();
        let decision = policy.decide(metrics.cpu_temp_c, guard.fan.manual_on);
        guard.metrics = metrics;
        guard.fan.forced_auto = decision.forced_auto;
        guard.fan.actual_on = decision.fan_on;
        decision
    }
}
