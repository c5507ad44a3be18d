//! The status-driven control law: fan → heater → coupling corrections →
//! feed/water latches → inlet → light → priority sort. Grounded on
//! `planner/planner_service.py`'s `_build_actions_from_status`, stage for
//! stage, with one deliberate correction: where that function's fan block is
//! guarded by `if temp is not None or co2 is not None`, its inner
//! "both missing → fan_max" branch is dead code. spec §4.5 stage 1 states the
//! fan_max fallback as a real requirement, so it is implemented here as a
//! reachable branch rather than carried over unreachable.

use poultry_common::model::{priority, Action, ActuatorCommand, ActuatorType, ZoneStatus};
use poultry_config::ZoneConfig;

use crate::state::ZoneControlState;

pub fn build_actions_from_status(
    state: &mut ZoneControlState,
    status: &ZoneStatus,
    config: &ZoneConfig,
    now: f64,
    time_of_day_h: f64,
) -> Vec<Action> {
    let mut actions = Vec::new();

    // Stage 1: fan, proportional on temperature and CO2 error plus an NH3 boost.
    let mut fan_level = if status.temperature_c.is_none() && status.co2_ppm.is_none() {
        config.fan_max
    } else {
        let temp_error = status
            .temperature_c
            .map(|t| (t - config.temp_setpoint).max(0.0))
            .unwrap_or(0.0);
        let co2_error = status
            .co2_ppm
            .map(|c| (c - config.co2_setpoint).max(0.0))
            .unwrap_or(0.0);
        let mut fan = config.fan_kp_temp * temp_error + config.fan_kp_co2 * co2_error;
        if status.nh3_ppm.is_some_and(|n| n > config.nh3_threshold) {
            fan += 30.0;
        }
        fan.clamp(config.fan_min, config.fan_max)
    };

    // Stage 2: heater, hysteresis + proportional, rate-limited immediately.
    let heater_level: Option<f64> = status.temperature_c.map(|temp| {
        let on = state.heater_on_state(
            Some(temp),
            config.temp_setpoint,
            config.heater_deadband_c,
            config.heater_min_on_s,
            config.heater_min_off_s,
            now,
        );
        let raw = if on {
            let deficit = (config.temp_setpoint - temp).max(0.0);
            (config.heater_kp_temp * deficit).min(100.0).max(config.heater_min_level)
        } else {
            0.0
        };
        state.rate_limit(ActuatorType::Heater, raw, config.heater_rate_limit_per_min, now)
    });

    // Stage 3: coupling corrections.
    if heater_level.is_some_and(|level| level > 0.0) {
        fan_level = fan_level.max(config.heater_min_fan);
    }
    fan_level = fan_level.max(config.fan_min_vent_pct);
    let cold_and_clean = status.temperature_c.is_some_and(|temp| {
        temp < config.temp_setpoint - config.cold_vent_delta_c
            && status.co2_ppm.map_or(true, |c| c < config.co2_max)
            && status.nh3_ppm.map_or(true, |n| n < config.nh3_threshold)
    });
    if cold_and_clean {
        fan_level = fan_level.min(config.fan_cold_max_pct);
    }
    fan_level = state.rate_limit(ActuatorType::Fan, fan_level, config.fan_rate_limit_per_min, now);
    actions.push(Action {
        actuator: ActuatorType::Fan,
        priority: priority::FAN,
        command: ActuatorCommand::fan_set(fan_level as i32),
    });

    if let Some(heater_level) = heater_level {
        actions.push(Action {
            actuator: ActuatorType::Heater,
            priority: priority::HEATER,
            command: ActuatorCommand::heater_set(heater_level as i32),
        });
    }

    // Stage 4: feed/water refill latches (Schmitt trigger).
    let feed_on = state.hysteresis_state(
        ActuatorType::FeedDispenser,
        status.feed_kg,
        config.feed_refill_low_kg,
        config.feed_refill_high_kg,
    );
    actions.push(Action {
        actuator: ActuatorType::FeedDispenser,
        priority: priority::FEED_WATER,
        command: ActuatorCommand::on_off(ActuatorType::FeedDispenser, feed_on),
    });
    let water_on = state.hysteresis_state(
        ActuatorType::WaterValve,
        status.water_l,
        config.water_refill_low_l,
        config.water_refill_high_l,
    );
    actions.push(Action {
        actuator: ActuatorType::WaterValve,
        priority: priority::FEED_WATER,
        command: ActuatorCommand::on_off(ActuatorType::WaterValve, water_on),
    });

    // Stage 5: inlet, baseline plus CO2/NH3 bonuses, cold-weather capped.
    let mut inlet = 20.0 + 0.6 * fan_level;
    if let Some(co2) = status.co2_ppm {
        if co2 > config.co2_setpoint {
            inlet += ((co2 - config.co2_setpoint) / 50.0).min(20.0);
        }
    }
    if let Some(nh3) = status.nh3_ppm {
        if nh3 > config.nh3_threshold {
            inlet += ((nh3 - config.nh3_threshold) * 1.5).min(15.0);
        }
    }
    inlet = inlet.clamp(config.inlet_min_pct, 100.0);
    if cold_and_clean {
        inlet = inlet.min(config.inlet_cold_max_pct);
    }
    inlet = state.rate_limit(ActuatorType::Inlet, inlet, config.inlet_rate_limit_per_min, now);
    actions.push(Action {
        actuator: ActuatorType::Inlet,
        priority: priority::INLET,
        command: ActuatorCommand::inlet_set(inlet as i32),
    });

    // Stage 6: light, activity-driven with a day/night floor.
    let night = !(config.lights_on_h <= time_of_day_h && time_of_day_h < config.lights_off_h);
    let min_light = if night { config.light_min_night_pct } else { config.light_min_day_pct };
    let mut light = match status.activity {
        Some(activity) => {
            let activity_error = config.activity_min - activity;
            let mut level = 60.0 + 70.0 * activity_error;
            if activity > config.light_activity_high {
                level -= 20.0;
            }
            level.clamp(min_light, 100.0)
        }
        None => min_light,
    };
    light = state.rate_limit(ActuatorType::Light, light, config.light_rate_limit_per_min, now);
    actions.push(Action {
        actuator: ActuatorType::Light,
        priority: priority::LIGHT,
        command: ActuatorCommand::light_set(light as i32),
    });

    // Stage 7: final priority sort (stable — matches `Plan::sort_by_priority`).
    actions.sort_by_key(|a| a.priority);
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use poultry_common::model::{FarmId, ZoneId};

    fn config() -> ZoneConfig {
        poultry_config::resolve(&Default::default(), &Default::default(), &Default::default())
    }

    fn status(temperature_c: Option<f64>, co2_ppm: Option<f64>) -> ZoneStatus {
        ZoneStatus {
            farm_id: FarmId::from("farm-a"),
            zone: ZoneId::from("zone-1"),
            temperature_c,
            co2_ppm,
            nh3_ppm: Some(5.0),
            feed_kg: Some(2.0),
            water_l: Some(2.0),
            activity: Some(0.5),
            temp_ok: true,
            co2_ok: true,
            nh3_ok: true,
            feed_ok: true,
            water_ok: true,
            activity_ok: true,
            alert: "OK".to_string(),
        }
    }

    fn find<'a>(actions: &'a [Action], actuator: ActuatorType) -> &'a Action {
        actions.iter().find(|a| a.actuator == actuator).expect("actuator present")
    }

    #[test]
    fn cold_barn_engages_heater_and_floors_fan() {
        let mut state = ZoneControlState::new();
        let config = config();
        let mut s = status(Some(18.0), Some(1000.0));
        s.co2_ppm = Some(1000.0);
        let actions = build_actions_from_status(&mut state, &s, &config, 1_000.0, 12.0);

        let heater = find(&actions, ActuatorType::Heater);
        match heater.command {
            ActuatorCommand::HeaterSet { level_pct, .. } => assert!(level_pct >= config.heater_min_level as i32),
            ref other => panic!("expected HeaterSet, got {other:?}"),
        }
        let fan = find(&actions, ActuatorType::Fan);
        match fan.command {
            ActuatorCommand::FanSet { level, .. } => assert!(level >= config.heater_min_fan as i32),
            ref other => panic!("expected FanSet, got {other:?}"),
        }
    }

    #[test]
    fn hot_barn_fan_is_proportional_to_temp_and_co2_error() {
        let mut state = ZoneControlState::new();
        let config = config();
        let s = status(Some(30.0), Some(1800.0));
        let actions = build_actions_from_status(&mut state, &s, &config, 0.0, 12.0);

        let fan = find(&actions, ActuatorType::Fan);
        match fan.command {
            ActuatorCommand::FanSet { level, .. } => assert_eq!(level, 46),
            ref other => panic!("expected FanSet, got {other:?}"),
        }
    }

    #[test]
    fn missing_temperature_and_co2_selects_fan_max() {
        let mut state = ZoneControlState::new();
        let config = config();
        let mut s = status(None, None);
        s.nh3_ppm = None;
        let actions = build_actions_from_status(&mut state, &s, &config, 0.0, 12.0);

        let fan = find(&actions, ActuatorType::Fan);
        match fan.command {
            ActuatorCommand::FanSet { level, .. } => assert_eq!(level, config.fan_max as i32),
            ref other => panic!("expected FanSet, got {other:?}"),
        }
    }

    #[test]
    fn missing_temperature_omits_heater_action() {
        let mut state = ZoneControlState::new();
        let config = config();
        let s = status(None, Some(1000.0));
        let actions = build_actions_from_status(&mut state, &s, &config, 0.0, 12.0);
        assert!(actions.iter().all(|a| a.actuator != ActuatorType::Heater));
    }

    #[test]
    fn night_floor_keeps_lights_above_day_minimum_requirement() {
        let mut state = ZoneControlState::new();
        let config = config();
        let mut s = status(Some(24.0), Some(1000.0));
        s.activity = None;
        let actions = build_actions_from_status(&mut state, &s, &config, 0.0, 2.0);
        let light = find(&actions, ActuatorType::Light);
        match light.command {
            ActuatorCommand::LightSet { level_pct, .. } => assert_eq!(level_pct, config.light_min_night_pct as i32),
            ref other => panic!("expected LightSet, got {other:?}"),
        }
    }

    #[test]
    fn actions_are_sorted_by_priority_ascending() {
        let mut state = ZoneControlState::new();
        let config = config();
        let s = status(Some(24.0), Some(1000.0));
        let actions = build_actions_from_status(&mut state, &s, &config, 0.0, 12.0);
        let priorities: Vec<i32> = actions.iter().map(|a| a.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }
}
