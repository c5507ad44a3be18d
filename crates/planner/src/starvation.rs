//! The starvation-aware issue-stream planner variant: priority decays toward
//! a bounded multiplier the longer an issue has gone unaddressed, ensuring a
//! persistently low-priority complaint (e.g. feed running low) is eventually
//! served instead of being perpetually crowded out by a recurring high
//! priority one (e.g. temperature). Grounded on
//! `src/planner/Computation.py`'s `PlannerComputation` class — its
//! `ISSUE_PRIORITIES`/`CONFLICTS` tables, `register_issue`,
//! `_calculate_priority`, `_check_starvation`, `get_highest_priority_issue`,
//! `resolve_conflicts`, `should_execute_action` and `get_multi_parameter_plan`
//! all carried over one for one.
//!
//! Translation note: the Python reference emits legacy `{component, action,
//! duration}` triples, a primitive shape predating the tagged
//! `ActuatorCommand` wire format used everywhere else here. Binary issues
//! (temperature, air quality) are translated to `ActuatorCommand::on_off`
//! where the actuator supports it and to a full-scale/zero `*_set` for the
//! continuously-variable fan. Feed and water issues keep their pulse shape,
//! since `ActuatorCommand::FeedPulse`/`WaterPulse` already model exactly that.

use std::collections::{HashMap, HashSet, VecDeque};

use poultry_common::model::{priority, Action, ActuatorCommand, ActuatorType};
use poultry_config::ZoneConfig;

const FEED_PULSE_BASE_G: f64 = 10.0;
const WATER_PULSE_BASE_S: f64 = 10.0;

fn base_priority(issue: &str) -> f64 {
    match issue {
        "TEMP_HIGH" => 10.0,
        "TEMP_LOW" => 10.0,
        "AIR_QUALITY_BAD" => 9.0,
        "WATER_LOW" => 8.0,
        "FEED_LOW" => 7.0,
        _ => 5.0,
    }
}

fn severity_multiplier(issue: &str, value: f64, config: &ZoneConfig) -> f64 {
    match issue {
        "TEMP_HIGH" => {
            let max_temp = config.temp_max;
            if value > max_temp {
                1.0 + ((value - max_temp) / max_temp) * 0.5
            } else {
                1.0
            }
        }
        "TEMP_LOW" => {
            let min_temp = config.temp_min;
            if value < min_temp {
                1.0 + ((min_temp - value) / min_temp) * 0.5
            } else {
                1.0
            }
        }
        "AIR_QUALITY_BAD" => {
            let max_nh3 = config.nh3_threshold;
            if value > max_nh3 {
                1.0 + ((value - max_nh3) / max_nh3) * 0.5
            } else {
                1.0
            }
        }
        "FEED_LOW" => {
            let min_level = config.feed_threshold;
            if value < min_level {
                1.0 + ((min_level - value) / min_level) * 0.3
            } else {
                1.0
            }
        }
        "WATER_LOW" => {
            let min_level = config.water_threshold;
            if value < min_level {
                1.0 + ((min_level - value) / min_level) * 0.3
            } else {
                1.0
            }
        }
        _ => 1.0,
    }
}

fn conflicts_for(actuator: ActuatorType) -> &'static [ActuatorType] {
    match actuator {
        ActuatorType::Heater => &[ActuatorType::Fan],
        ActuatorType::Fan => &[ActuatorType::Heater],
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy)]
struct IssueRecord {
    value: f64,
}

/// Per-(farm, zone) state for the issue-stream variant: first-seen and
/// last-seen timestamps per issue, the priority last computed for it, the
/// starvation queue, and per-actuator action-throttling state.
#[derive(Debug, Default)]
pub struct StarvationPlanner {
    issue_first_seen: HashMap<String, f64>,
    active_issues: HashMap<String, IssueRecord>,
    issue_priority: HashMap<String, i64>,
    starvation_queue: VecDeque<String>,
    last_action_time: HashMap<ActuatorType, f64>,
}

impl StarvationPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or refreshes) an issue observation and recomputes its
    /// priority, folding in the starvation multiplier once it has gone
    /// unaddressed past `config.starvation_threshold_s`.
    pub fn register_issue(&mut self, issue: &str, value: f64, now: f64, config: &ZoneConfig) {
        let first_seen = *self.issue_first_seen.entry(issue.to_string()).or_insert(now);
        self.active_issues.insert(issue.to_string(), IssueRecord { value });

        let mut multiplier = severity_multiplier(issue, value, config);
        let elapsed = now - first_seen;
        if elapsed > config.starvation_threshold_s {
            let starvation_factor = (1.0 + (elapsed - config.starvation_threshold_s) / 600.0).min(1.5);
            multiplier *= starvation_factor;
        }
        let priority = (base_priority(issue) * multiplier) as i64;
        self.issue_priority.insert(issue.to_string(), priority);

        if elapsed >= config.starvation_threshold_s && !self.starvation_queue.contains(&issue.to_string()) {
            self.starvation_queue.push_back(issue.to_string());
        }
    }

    pub fn clear_issue(&mut self, issue: &str) {
        self.issue_first_seen.remove(issue);
        self.active_issues.remove(issue);
        self.issue_priority.remove(issue);
        self.starvation_queue.retain(|i| i != issue);
    }

    fn get_starvation_issue(&self) -> Option<(String, i64)> {
        let mut candidates: Vec<&String> = self.starvation_queue.iter().collect();
        candidates.sort_by_key(|issue| std::cmp::Reverse(*self.issue_priority.get(*issue).unwrap_or(&0)));
        candidates.first().map(|issue| {
            let priority = *self.issue_priority.get(*issue).unwrap_or(&0);
            ((*issue).clone(), priority)
        })
    }

    /// Picks the issue to act on this cycle: the highest-priority issue
    /// overall, unless a starved issue's own priority is within 80% of it —
    /// in which case the starved issue is preferred so it eventually fires.
    fn get_highest_priority_issue(&self) -> Option<(String, f64)> {
        let starved = self.get_starvation_issue();
        let max_entry = self
            .issue_priority
            .iter()
            .max_by_key(|(_, &priority)| priority)
            .map(|(issue, &priority)| (issue.clone(), priority));

        match (starved, max_entry) {
            (Some((starved_issue, starved_priority)), Some((max_issue, max_priority))) => {
                if starved_priority as f64 >= max_priority as f64 * 0.8 {
                    let value = self.active_issues.get(&starved_issue).map(|r| r.value).unwrap_or(0.0);
                    Some((starved_issue, value))
                } else {
                    let value = self.active_issues.get(&max_issue).map(|r| r.value).unwrap_or(0.0);
                    Some((max_issue, value))
                }
            }
            (Some((starved_issue, _)), None) => {
                let value = self.active_issues.get(&starved_issue).map(|r| r.value).unwrap_or(0.0);
                Some((starved_issue, value))
            }
            (None, Some((max_issue, _))) => {
                let value = self.active_issues.get(&max_issue).map(|r| r.value).unwrap_or(0.0);
                Some((max_issue, value))
            }
            (None, None) => None,
        }
    }

    fn should_execute_action(&self, actuator: ActuatorType, min_interval_s: f64, now: f64) -> bool {
        match self.last_action_time.get(&actuator) {
            None => true,
            Some(&last) => now - last >= min_interval_s,
        }
    }

    fn mark_executed(&mut self, actuator: ActuatorType, now: f64) {
        self.last_action_time.insert(actuator, now);
    }

    fn plan_actions(&mut self, issue: &str, value: f64, now: f64, config: &ZoneConfig) -> Vec<Action> {
        let min_interval = config.min_action_interval_s;
        let mut actions = Vec::new();

        match issue {
            "TEMP_HIGH" => {
                if self.should_execute_action(ActuatorType::Fan, min_interval, now) {
                    actions.push(Action {
                        actuator: ActuatorType::Fan,
                        priority: priority::FAN,
                        command: ActuatorCommand::fan_set(100),
                    });
                    self.mark_executed(ActuatorType::Fan, now);
                }
                if self.should_execute_action(ActuatorType::Heater, min_interval, now) {
                    actions.push(Action {
                        actuator: ActuatorType::Heater,
                        priority: priority::HEATER,
                        command: ActuatorCommand::on_off(ActuatorType::Heater, false),
                    });
                    self.mark_executed(ActuatorType::Heater, now);
                }
            }
            "TEMP_LOW" => {
                if self.should_execute_action(ActuatorType::Heater, min_interval, now) {
                    actions.push(Action {
                        actuator: ActuatorType::Heater,
                        priority: priority::HEATER,
                        command: ActuatorCommand::on_off(ActuatorType::Heater, true),
                    });
                    self.mark_executed(ActuatorType::Heater, now);
                }
                if self.should_execute_action(ActuatorType::Fan, min_interval, now) {
                    actions.push(Action {
                        actuator: ActuatorType::Fan,
                        priority: priority::FAN,
                        command: ActuatorCommand::fan_set(0),
                    });
                    self.mark_executed(ActuatorType::Fan, now);
                }
            }
            "AIR_QUALITY_BAD" => {
                if self.should_execute_action(ActuatorType::Fan, min_interval, now) {
                    actions.push(Action {
                        actuator: ActuatorType::Fan,
                        priority: priority::FAN,
                        command: ActuatorCommand::fan_set(100),
                    });
                    self.mark_executed(ActuatorType::Fan, now);
                }
            }
            "FEED_LOW" => {
                let min_level = config.feed_threshold;
                let multiplier = if value < min_level {
                    ((min_level - value) / min_level * 2.0).max(1.0)
                } else {
                    1.0
                };
                let amount_g = (FEED_PULSE_BASE_G * multiplier) as i32 as f64;
                if self.should_execute_action(ActuatorType::FeedDispenser, min_interval, now) {
                    actions.push(Action {
                        actuator: ActuatorType::FeedDispenser,
                        priority: priority::FEED_WATER,
                        command: ActuatorCommand::FeedPulse { amount_g },
                    });
                    self.mark_executed(ActuatorType::FeedDispenser, now);
                }
            }
            "WATER_LOW" => {
                let min_level = config.water_threshold;
                let multiplier = if value < min_level {
                    (1.0 + (min_level - value) / min_level * 2.0).min(3.0)
                } else {
                    1.0
                };
                let duration_s = (WATER_PULSE_BASE_S * multiplier) as i32 as f64;
                if self.should_execute_action(ActuatorType::WaterValve, min_interval, now) {
                    actions.push(Action {
                        actuator: ActuatorType::WaterValve,
                        priority: priority::FEED_WATER,
                        command: ActuatorCommand::WaterPulse { duration_s },
                    });
                    self.mark_executed(ActuatorType::WaterValve, now);
                }
            }
            _ => {}
        }

        Self::resolve_conflicts(actions)
    }

    /// Drops a previously-added conflicting action in favor of a later one —
    /// e.g. a heater-on action added for `TEMP_LOW` evicts an earlier
    /// fan-on action added for `AIR_QUALITY_BAD` this same cycle.
    fn resolve_conflicts(actions: Vec<Action>) -> Vec<Action> {
        let mut resolved: Vec<Action> = Vec::new();
        let mut present: HashSet<ActuatorType> = HashSet::new();
        for action in actions {
            for &conflicting in conflicts_for(action.actuator) {
                if present.remove(&conflicting) {
                    resolved.retain(|a: &Action| a.actuator != conflicting);
                }
            }
            present.insert(action.actuator);
            resolved.push(action);
        }
        resolved
    }

    /// Processes up to three issues per cycle — highest priority (or
    /// starved) first — then runs a final conflict-resolution pass across
    /// the combined action set.
    pub fn get_multi_parameter_plan(&mut self, now: f64, config: &ZoneConfig) -> Vec<Action> {
        let mut all = Vec::new();
        let mut processed = HashSet::new();

        for _ in 0..3 {
            let Some((issue, value)) = self.get_highest_priority_issue() else {
                break;
            };
            if processed.contains(&issue) {
                break;
            }
            all.extend(self.plan_actions(&issue, value, now, config));
            processed.insert(issue.clone());
            self.starvation_queue.retain(|i| i != &issue);
        }

        Self::resolve_conflicts(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ZoneConfig {
        poultry_config::resolve(&Default::default(), &Default::default(), &Default::default())
    }

    #[test]
    fn single_issue_produces_its_actions() {
        let mut planner = StarvationPlanner::new();
        let config = config();
        planner.register_issue("TEMP_HIGH", 35.0, 0.0, &config);
        let actions = planner.get_multi_parameter_plan(0.0, &config);
        assert!(actions.iter().any(|a| a.actuator == ActuatorType::Fan));
        assert!(actions.iter().any(|a| a.actuator == ActuatorType::Heater));
    }

    #[test]
    fn conflicting_actions_keep_the_later_one() {
        let mut planner = StarvationPlanner::new();
        let config = config();
        planner.register_issue("AIR_QUALITY_BAD", 40.0, 0.0, &config);
        planner.register_issue("TEMP_LOW", 10.0, 0.0, &config);
        let actions = planner.get_multi_parameter_plan(0.0, &config);

        let fan_actions: Vec<&Action> = actions.iter().filter(|a| a.actuator == ActuatorType::Fan).collect();
        assert_eq!(fan_actions.len(), 1);
        match fan_actions[0].command {
            ActuatorCommand::FanSet { level, .. } => assert_eq!(level, 0),
            ref other => panic!("expected FanSet(0) from the TEMP_LOW action, got {other:?}"),
        }
    }

    #[test]
    fn should_execute_action_throttles_within_min_interval() {
        let mut planner = StarvationPlanner::new();
        let config = config();
        planner.register_issue("FEED_LOW", 0.5, 0.0, &config);
        let first = planner.get_multi_parameter_plan(0.0, &config);
        assert!(first.iter().any(|a| a.actuator == ActuatorType::FeedDispenser));

        planner.register_issue("FEED_LOW", 0.5, 5.0, &config);
        let second = planner.get_multi_parameter_plan(5.0, &config);
        assert!(!second.iter().any(|a| a.actuator == ActuatorType::FeedDispenser));
    }

    #[test]
    fn long_unaddressed_issue_enters_the_starvation_queue() {
        let mut planner = StarvationPlanner::new();
        let config = config();
        planner.register_issue("FEED_LOW", 0.5, 0.0, &config);
        planner.register_issue("FEED_LOW", 0.5, config.starvation_threshold_s + 1.0, &config);
        assert!(planner.starvation_queue.contains(&"FEED_LOW".to_string()));
    }

    #[test]
    fn clear_issue_removes_it_from_every_table() {
        let mut planner = StarvationPlanner::new();
        let config = config();
        planner.register_issue("WATER_LOW", 0.5, 0.0, &config);
        planner.clear_issue("WATER_LOW");
        assert!(planner.get_highest_priority_issue().is_none());
    }
}
