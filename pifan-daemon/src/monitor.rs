//! Monitor Loop
//!
//! The single periodic task that owns actuation: each tick it samples
//! host metrics, folds the fan policy into the shared state store in one
//! atomic commit, and drives the GPIO pin to the committed decision.
//!
//! The loop never terminates on its own and never propagates an error
//! outward. Sensor failures degrade individual fields (see
//! `pifan_core::system`); actuator failures are logged with a
//! consecutive-error counter and retried implicitly on the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use pifan_core::constants::timing::POLL_INTERVAL_MS;
use pifan_core::{sample, FanActuator, FanDecision, FanPolicy, Result, StateStore, SystemSnapshot};

/// Consecutive actuator failures between escalated log lines
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// One sampling/decision/actuation cycle, separated from the loop for
/// error handling and tests.
///
/// The store commit is a single critical section, so readers never
/// observe a metrics snapshot paired with a fan decision from another
/// tick. The actuator write happens after the lock is released.
pub fn tick(
    store: &StateStore,
    policy: &FanPolicy,
    metrics: SystemSnapshot,
    actuator: &dyn FanActuator,
) -> Result<FanDecision> {
    let decision = store.commit(metrics, policy);
    actuator.set_output(decision.fan_on)?;
    Ok(decision)
}

/// Run the monitor loop until `shutdown` is raised.
pub async fn run_monitor_loop(
    store: Arc<StateStore>,
    actuator: Arc<dyn FanActuator>,
    shutdown: Arc<AtomicBool>,
) {
    info!("monitor loop starting (interval {}ms)", POLL_INTERVAL_MS);

    let policy = FanPolicy::new();
    let mut consecutive_errors: u32 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("monitor loop shutting down");
            break;
        }

        // Sampling happens outside any lock; only the commit inside
        // tick() takes the state mutex.
        let metrics = sample();

        match tick(&store, &policy, metrics, actuator.as_ref()) {
            Ok(decision) => {
                if consecutive_errors > 0 {
                    debug!("actuator recovered after {consecutive_errors} failed writes");
                    consecutive_errors = 0;
                }
                debug!(
                    forced_auto = decision.forced_auto,
                    fan_on = decision.fan_on,
                    "tick complete"
                );
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors == 1 || consecutive_errors % MAX_CONSECUTIVE_ERRORS == 0 {
                    error!("actuator write failed (count {consecutive_errors}): {e}");
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }

    info!("monitor loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pifan_error::PifanError;
    use std::sync::Mutex;

    /// Records every commanded output
    #[derive(Default)]
    struct RecordingActuator {
        writes: Mutex<Vec<bool>>,
    }

    impl RecordingActuator {
        fn last(&self) -> Option<bool> {
            self.writes.lock().unwrap().last().copied()
        }
    }

    impl FanActuator for RecordingActuator {
        fn set_output(&self, on: bool) -> Result<()> {
            self.writes.lock().unwrap().push(on);
            Ok(())
        }
    }

    /// Always fails, standing in for a broken pin
    struct FailingActuator;

    impl FanActuator for FailingActuator {
        fn set_output(&self, _on: bool) -> Result<()> {
            Err(PifanError::GpioWrite {
                pin: 17,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test"),
            })
        }
    }

    fn metrics(temp: Option<f64>) -> SystemSnapshot {
        SystemSnapshot {
            cpu_temp_c: temp,
            ..SystemSnapshot::default()
        }
    }

    #[test]
    fn test_absent_temperature_manual_off() {
        // Scenario: no reading, no preference - fan stays off.
        let store = StateStore::new();
        let actuator = RecordingActuator::default();

        let decision = tick(&store, &FanPolicy::new(), metrics(None), &actuator).unwrap();
        assert!(!decision.forced_auto);
        assert!(!decision.fan_on);
        assert_eq!(actuator.last(), Some(false));
    }

    #[test]
    fn test_hot_tick_forces_fan_on() {
        let store = StateStore::new();
        let actuator = RecordingActuator::default();

        let decision = tick(&store, &FanPolicy::new(), metrics(Some(60.0)), &actuator).unwrap();
        assert!(decision.forced_auto);
        assert!(decision.fan_on);
        assert_eq!(actuator.last(), Some(true));
    }

    #[test]
    fn test_forced_wins_then_manual_resumes() {
        // Scenario: hot with a manual preference set, then cooling.
        let store = StateStore::new();
        let policy = FanPolicy::new();
        let actuator = RecordingActuator::default();

        store.set_manual(true);
        let hot = tick(&store, &policy, metrics(Some(60.0)), &actuator).unwrap();
        assert!(hot.forced_auto);
        assert!(hot.fan_on);

        let cool = tick(&store, &policy, metrics(Some(40.0)), &actuator).unwrap();
        assert!(!cool.forced_auto);
        // The remembered preference keeps the fan running.
        assert!(cool.fan_on);
        assert_eq!(actuator.last(), Some(true));
    }

    #[test]
    fn test_preference_toggle_applies_on_next_tick() {
        // Scenario: cool system, preference toggled true then false
        // between ticks - each following tick honors the latest value.
        let store = StateStore::new();
        let policy = FanPolicy::new();
        let actuator = RecordingActuator::default();

        store.set_manual(true);
        let decision = tick(&store, &policy, metrics(Some(40.0)), &actuator).unwrap();
        assert!(decision.fan_on);

        store.set_manual(false);
        let decision = tick(&store, &policy, metrics(Some(40.0)), &actuator).unwrap();
        assert!(!decision.fan_on);
        assert_eq!(actuator.last(), Some(false));

        let state = store.status();
        assert!(!state.fan.actual_on);
        assert!(!state.fan.manual_on);
    }

    #[test]
    fn test_actuator_fault_keeps_committed_state() {
        // A failed GPIO write is reported, but the committed decision
        // stands and the next tick retries the write.
        let store = StateStore::new();
        let policy = FanPolicy::new();

        let result = tick(&store, &policy, metrics(Some(60.0)), &FailingActuator);
        assert!(matches!(result, Err(PifanError::GpioWrite { .. })));

        let state = store.status();
        assert!(state.fan.forced_auto);
        assert!(state.fan.actual_on);

        let actuator = RecordingActuator::default();
        tick(&store, &policy, metrics(Some(60.0)), &actuator).unwrap();
        assert_eq!(actuator.last(), Some(true));
    }
}
