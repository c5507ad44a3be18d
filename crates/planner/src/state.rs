//! Per-(farm, zone) control state carried across planning cycles: actuator
//! rate limiters, refill hysteresis latches, and heater on/off hysteresis.
//! Every method takes an explicit `now: f64` rather than reading the wall
//! clock, so the control law stays a pure, testable function of its inputs —
//! the same shape as the simulator's `EnvironmentState::step`. Grounded on
//! `planner/planner_service.py`'s module-level `_rate_limit_state`,
//! `_refill_state` and `_heater_on_state` caches, made into an explicit,
//! per-zone-owned struct per spec §9's redesign note on mutable caches.

use std::collections::HashMap;

use poultry_common::model::ActuatorType;

#[derive(Debug, Default)]
pub struct ZoneControlState {
    last_levels: HashMap<ActuatorType, f64>,
    last_ts: HashMap<ActuatorType, f64>,
    refill_state: HashMap<ActuatorType, bool>,
    heater_on: bool,
    heater_last_switch: Option<f64>,
}

impl ZoneControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamps `target` to at most `max_rate_per_min` of change per minute
    /// since the last call for this actuator. `dt` floors at 0.1s so a
    /// zero-interval first call (or a clock hiccup) never divides by zero or
    /// produces an unbounded step.
    pub fn rate_limit(&mut self, actuator: ActuatorType, target: f64, max_rate_per_min: f64, now: f64) -> f64 {
        let prev = *self.last_levels.get(&actuator).unwrap_or(&target);
        let prev_ts = *self.last_ts.get(&actuator).unwrap_or(&now);
        let dt = (now - prev_ts).max(0.1);
        let max_delta = max_rate_per_min * (dt / 60.0);

        let limited = if target > prev + max_delta {
            prev + max_delta
        } else if target < prev - max_delta {
            prev - max_delta
        } else {
            target
        };

        self.last_levels.insert(actuator, limited);
        self.last_ts.insert(actuator, now);
        limited
    }

    /// Schmitt-trigger latch: turns on at or below `low`, off at or above
    /// `high`, and holds its prior state in the deadband between them. A
    /// missing reading holds the latch unchanged.
    pub fn hysteresis_state(&mut self, actuator: ActuatorType, value: Option<f64>, low: f64, high: f64) -> bool {
        let mut state = *self.refill_state.get(&actuator).unwrap_or(&false);
        if let Some(value) = value {
            if value <= low {
                state = true;
            } else if value >= high {
                state = false;
            }
        }
        self.refill_state.insert(actuator, state);
        state
    }

    /// Heater on/off hysteresis with minimum dwell in each state. The very
    /// first decision for a zone (no prior switch recorded) may flip off→on
    /// without checking dwell, matching the initialisation carve-out
    /// (spec §4.5 stage 2). A missing reading holds the current state.
    pub fn heater_on_state(
        &mut self,
        temp: Option<f64>,
        setpoint: f64,
        deadband: f64,
        min_on_s: f64,
        min_off_s: f64,
        now: f64,
    ) -> bool {
        let Some(temp) = temp else {
            return self.heater_on;
        };

        let dwell_satisfied = |min_s: f64| match self.heater_last_switch {
            Some(last_switch) => now - last_switch >= min_s,
            None => true,
        };

        if self.heater_on {
            if temp >= setpoint + deadband && dwell_satisfied(min_on_s) {
                self.heater_on = false;
                self.heater_last_switch = Some(now);
            }
        } else if temp <= setpoint - deadband && dwell_satisfied(min_off_s) {
            self.heater_on = true;
            self.heater_last_switch = Some(now);
        }

        self.heater_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_first_call_passes_target_through() {
        let mut state = ZoneControlState::new();
        let out = state.rate_limit(ActuatorType::Fan, 46.0, 80.0, 0.0);
        assert_eq!(out, 46.0);
    }

    #[test]
    fn rate_limit_clamps_large_step_to_elapsed_time() {
        let mut state = ZoneControlState::new();
        state.rate_limit(ActuatorType::Fan, 20.0, 80.0, 0.0);
        let out = state.rate_limit(ActuatorType::Fan, 80.0, 80.0, 30.0);
        assert_eq!(out, 60.0);
    }

    #[test]
    fn rate_limit_clamps_downward_steps_too() {
        let mut state = ZoneControlState::new();
        state.rate_limit(ActuatorType::Fan, 80.0, 80.0, 0.0);
        let out = state.rate_limit(ActuatorType::Fan, 0.0, 80.0, 15.0);
        assert_eq!(out, 60.0);
    }

    #[test]
    fn refill_latch_follows_the_scripted_trajectory() {
        let mut state = ZoneControlState::new();
        let readings = [2.0, 1.4, 1.0, 1.8, 2.6];
        let expected = [false, true, true, true, false];
        for (value, want) in readings.iter().zip(expected) {
            let got = state.hysteresis_state(ActuatorType::FeedDispenser, Some(*value), 1.5, 2.5);
            assert_eq!(got, want, "value={value}");
        }
    }

    #[test]
    fn refill_latch_holds_on_missing_reading() {
        let mut state = ZoneControlState::new();
        assert!(state.hysteresis_state(ActuatorType::FeedDispenser, Some(1.0), 1.5, 2.5));
        assert!(state.hysteresis_state(ActuatorType::FeedDispenser, None, 1.5, 2.5));
    }

    #[test]
    fn heater_first_decision_bypasses_dwell() {
        let mut state = ZoneControlState::new();
        let on = state.heater_on_state(Some(18.0), 26.0, 0.4, 120.0, 120.0, 1_000.0);
        assert!(on);
    }

    #[test]
    fn heater_respects_dwell_after_first_switch() {
        let mut state = ZoneControlState::new();
        state.heater_on_state(Some(18.0), 26.0, 0.4, 120.0, 120.0, 0.0);
        // Crosses the off threshold almost immediately; dwell should hold it on.
        let on = state.heater_on_state(Some(30.0), 26.0, 0.4, 120.0, 120.0, 10.0);
        assert!(on);
        let off = state.heater_on_state(Some(30.0), 26.0, 0.4, 120.0, 120.0, 200.0);
        assert!(!off);
    }

    #[test]
    fn heater_missing_temperature_holds_state() {
        let mut state = ZoneControlState::new();
        state.heater_on_state(Some(18.0), 26.0, 0.4, 120.0, 120.0, 0.0);
        let on = state.heater_on_state(None, 26.0, 0.4, 120.0, 120.0, 10.0);
        assert!(on);
    }
}
