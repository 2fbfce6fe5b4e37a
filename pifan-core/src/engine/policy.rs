//! Fan on/off policy
//!
//! Arbitrates between the thermal safety override and the caller's manual
//! preference. Kept as a pure function so the precedence rule is testable
//! without the monitor loop or hardware:
//!
//! - Above the threshold the fan is forced on, whatever the preference.
//! - At or below the threshold (or with no reading at all) the fan
//!   follows the manual preference exactly.
//!
//! The manual preference is never cleared by a forced-auto episode; it
//! resumes governing as soon as the temperature drops.

use crate::constants::fan::TEMP_THRESHOLD_C;

/// Outcome of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanDecision {
    /// The safety threshold was exceeded
    pub forced_auto: bool,
    /// The output the actuator should be driven to
    pub fan_on: bool,
}

/// The fan arbitration policy.
///
/// The threshold is fixed for the lifetime of the process; making it
/// runtime-configurable is a possible extension, not part of this design.
#[derive(Debug, Clone, Copy)]
pub struct FanPolicy {
    threshold_c: f64,
}

impl FanPolicy {
    pub fn new() -> Self {
        Self {
            threshold_c: TEMP_THRESHOLD_C,
        }
    }

    /// Policy with a custom threshold, for tests
    pub fn with_threshold(threshold_c: f64) -> Self {
        Self { threshold_c }
    }

    pub fn threshold_c(&self) -> f64 {
        self.threshold_c
    }

    /// Evaluate the policy for one tick.
    ///
    /// `forced_auto` requires a present reading strictly above the
    /// threshold; an exactly-equal reading does not trigger it.
    pub fn decide(&self, cpu_temp_c: Option<f64>, manual_on: bool) -> FanDecision {
        let forced_auto = cpu_temp_c.is_some_and(|t| t > self.threshold_c);
        FanDecision {
            forced_auto,
            fan_on: forced_auto || manual_on,
        }
    }
}

impl Default for FanPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_auto_requires_strict_exceedance() {
        let policy = FanPolicy::new();

        assert!(!policy.decide(Some(54.9), false).forced_auto);
        // Boundary: exactly the threshold does not force the fan.
        assert!(!policy.decide(Some(55.0), false).forced_auto);
        assert!(policy.decide(Some(55.1), false).forced_auto);
    }

    #[test]
    fn test_absent_temperature_never_forces() {
        let policy = FanPolicy::new();
        let decision = policy.decide(None, false);
        assert!(!decision.forced_auto);
        assert!(!decision.fan_on);

        // Manual preference still governs with no reading.
        let decision = policy.decide(None, true);
        assert!(!decision.forced_auto);
        assert!(decision.fan_on);
    }

    #[test]
    fn test_output_truth_table() {
        let policy = FanPolicy::new();
        // (temp, manual) -> (forced_auto, fan_on)
        let cases = [
            (Some(40.0), false, false, false),
            (Some(40.0), true, false, true),
            (Some(60.0), false, true, true),
            (Some(60.0), true, true, true),
        ];
        for (temp, manual, forced, on) in cases {
            let decision = policy.decide(temp, manual);
            assert_eq!(decision.forced_auto, forced, "temp={temp:?} manual={manual}");
            assert_eq!(decision.fan_on, on, "temp={temp:?} manual={manual}");
        }
    }

    #[test]
    fn test_forced_wins_then_manual_resumes() {
        let policy = FanPolicy::new();

        // Hot tick: forced on, even though a preference is set.
        let hot = policy.decide(Some(60.0), true);
        assert!(hot.forced_auto);
        assert!(hot.fan_on);

        // Temperature drops, preference was remembered and resumes.
        let cool = policy.decide(Some(40.0), true);
        assert!(!cool.forced_auto);
        assert!(cool.fan_on);

        // Same drop with preference off: fan goes off with it.
        let cool_off = policy.decide(Some(40.0), false);
        assert!(!cool_off.forced_auto);
        assert!(!cool_off.fan_on);
    }

    #[test]
    fn test_custom_threshold() {
        let policy = FanPolicy::with_threshold(70.0);
        assert!(!policy.decide(Some(60.0), false).forced_auto);
        assert!(policy.decide(Some(70.5), false).forced_auto);
    }
}
