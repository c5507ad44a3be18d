//! The resolved `ZoneConfig` snapshot (~50 scalar parameters) and the
//! zone > farm > defaults > hard-coded-fallback precedence chain. Grounded
//! on `common/config.py`'s `get_config`, translated from a stringly-typed
//! key lookup into a typed struct-of-fields per spec §9's redesign note
//! ("module-level mutable caches... become an explicit dependency").

use serde::Deserialize;

/// Every field individually overridable at zone/farm/defaults scope. `None`
/// means "not set at this scope" — the precedence chain in [`resolve`]
/// climbs to the next scope until it finds `Some`, finally falling back to
/// the hard-coded defaults baked into [`resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ZoneConfigPartial {
    // -- Analyzer thresholds --
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub co2_max: Option<f64>,
    pub nh3_threshold: Option<f64>,
    pub feed_threshold: Option<f64>,
    pub water_threshold: Option<f64>,
    pub activity_min: Option<f64>,
    pub status_interval_s: Option<f64>,

    // -- Planner setpoints / gains --
    pub temp_setpoint: Option<f64>,
    pub co2_setpoint: Option<f64>,
    pub fan_kp_temp: Option<f64>,
    pub fan_kp_co2: Option<f64>,
    pub fan_max: Option<f64>,
    pub fan_min: Option<f64>,
    pub heater_kp_temp: Option<f64>,
    pub heater_deadband_c: Option<f64>,
    pub heater_min_on_s: Option<f64>,
    pub heater_min_off_s: Option<f64>,
    pub heater_min_level: Option<f64>,
    pub heater_min_fan: Option<f64>,
    pub fan_min_vent_pct: Option<f64>,
    pub inlet_min_pct: Option<f64>,
    pub fan_cold_max_pct: Option<f64>,
    pub inlet_cold_max_pct: Option<f64>,
    pub cold_vent_delta_c: Option<f64>,
    pub light_activity_high: Option<f64>,
    pub light_min_day_pct: Option<f64>,
    pub light_min_night_pct: Option<f64>,
    pub lights_on_h: Option<f64>,
    pub lights_off_h: Option<f64>,
    pub fan_rate_limit_per_min: Option<f64>,
    pub heater_rate_limit_per_min: Option<f64>,
    pub inlet_rate_limit_per_min: Option<f64>,
    pub light_rate_limit_per_min: Option<f64>,
    pub feed_refill_low_kg: Option<f64>,
    pub feed_refill_high_kg: Option<f64>,
    pub water_refill_low_l: Option<f64>,
    pub water_refill_high_l: Option<f64>,

    // -- Starvation planner --
    pub starvation_threshold_s: Option<f64>,
    pub min_action_interval_s: Option<f64>,

    // -- Simulator geometry / physics --
    pub volume_m3: Option<f64>,
    pub mass_factor: Option<f64>,
    pub ua_w_per_k: Option<f64>,
    pub base_infiltration_m3_s: Option<f64>,
    pub fan_max_flow_m3_s: Option<f64>,
    pub bird_count: Option<f64>,
    pub bird_heat_w: Option<f64>,
    pub bird_heat_w_activity: Option<f64>,
    pub heater_power_w: Option<f64>,
    pub auto_fan_level: Option<f64>,
    pub feed_activity_mult: Option<f64>,
    pub water_activity_mult: Option<f64>,
    pub feed_refill_flow_kg_s: Option<f64>,
    pub water_refill_flow_l_s: Option<f64>,
    pub co2_lps_per_bird: Option<f64>,
    pub co2_activity_mult: Option<f64>,
    pub outside_co2_ppm: Option<f64>,
    pub nh3_mg_per_bird_day: Option<f64>,
    pub nh3_activity_mult: Option<f64>,
    pub nh3_temp_coeff: Option<f64>,
    pub nh3_decay_per_s: Option<f64>,
    pub feed_kg_per_bird_day: Option<f64>,
    pub water_l_per_bird_day: Option<f64>,
    pub hopper_capacity_kg: Option<f64>,
    pub tank_capacity_l: Option<f64>,
    pub fan_ramp_per_min: Option<f64>,
    pub heater_ramp_per_min: Option<f64>,
    pub inlet_ramp_per_min: Option<f64>,
    pub light_ramp_per_min: Option<f64>,
    pub fan_min_on_s: Option<f64>,
    pub fan_min_off_s: Option<f64>,
    pub startup_override_s: Option<f64>,
    pub auto_control_timeout_s: Option<f64>,
    pub sensor_interval_s: Option<f64>,
    pub activity_tau_s: Option<f64>,
    pub fan_on_temp_c: Option<f64>,
    pub fan_off_temp_c: Option<f64>,
    pub heater_on_temp_c: Option<f64>,
    pub heater_off_temp_c: Option<f64>,
}

macro_rules! resolve_chain {
    ($zone:expr, $farm:expr, $defaults:expr, { $($field:ident = $fallback:expr),* $(,)? }) => {
        ZoneConfig {
            $($field: $zone.$field.or($farm.$field).or($defaults.$field).unwrap_or($fallback)),*
        }
    };
}

/// A fully-resolved, typed configuration snapshot for one `(farm, zone)`.
/// There is no cache invariant beyond "last read wins" — callers re-resolve
/// every cycle (spec §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneConfig {
    pub temp_min: f64,
    pub temp_max: f64,
    pub co2_max: f64,
    pub nh3_threshold: f64,
    pub feed_threshold: f64,
    pub water_threshold: f64,
    pub activity_min: f64,
    pub status_interval_s: f64,

    pub temp_setpoint: f64,
    pub co2_setpoint: f64,
    pub fan_kp_temp: f64,
    pub fan_kp_co2: f64,
    pub fan_max: f64,
    pub fan_min: f64,
    pub heater_kp_temp: f64,
    pub heater_deadband_c: f64,
    pub heater_min_on_s: f64,
    pub heater_min_off_s: f64,
    pub heater_min_level: f64,
    pub heater_min_fan: f64,
    pub fan_min_vent_pct: f64,
    pub inlet_min_pct: f64,
    pub fan_cold_max_pct: f64,
    pub inlet_cold_max_pct: f64,
    pub cold_vent_delta_c: f64,
    pub light_activity_high: f64,
    pub light_min_day_pct: f64,
    pub light_min_night_pct: f64,
    pub lights_on_h: f64,
    pub lights_off_h: f64,
    pub fan_rate_limit_per_min: f64,
    pub heater_rate_limit_per_min: f64,
    pub inlet_rate_limit_per_min: f64,
    pub light_rate_limit_per_min: f64,
    pub feed_refill_low_kg: f64,
    pub feed_refill_high_kg: f64,
    pub water_refill_low_l: f64,
    pub water_refill_high_l: f64,

    pub starvation_threshold_s: f64,
    pub min_action_interval_s: f64,

    pub volume_m3: f64,
    pub mass_factor: f64,
    pub ua_w_per_k: f64,
    pub base_infiltration_m3_s: f64,
    pub fan_max_flow_m3_s: f64,
    pub bird_count: f64,
    pub bird_heat_w: f64,
    pub bird_heat_w_activity: f64,
    pub heater_power_w: f64,
    pub auto_fan_level: f64,
    pub feed_activity_mult: f64,
    pub water_activity_mult: f64,
    pub feed_refill_flow_kg_s: f64,
    pub water_refill_flow_l_s: f64,
    pub co2_lps_per_bird: f64,
    pub co2_activity_mult: f64,
    pub outside_co2_ppm: f64,
    pub nh3_mg_per_bird_day: f64,
    pub nh3_activity_mult: f64,
    pub nh3_temp_coeff: f64,
    pub nh3_decay_per_s: f64,
    pub feed_kg_per_bird_day: f64,
    pub water_l_per_bird_day: f64,
    pub hopper_capacity_kg: f64,
    pub tank_capacity_l: f64,
    pub fan_ramp_per_min: f64,
    pub heater_ramp_per_min: f64,
    pub inlet_ramp_per_min: f64,
    pub light_ramp_per_min: f64,
    pub fan_min_on_s: f64,
    pub fan_min_off_s: f64,
    pub startup_override_s: f64,
    pub auto_control_timeout_s: f64,
    pub sensor_interval_s: f64,
    pub activity_tau_s: f64,
    pub fan_on_temp_c: f64,
    pub fan_off_temp_c: f64,
    pub heater_on_temp_c: f64,
    pub heater_off_temp_c: f64,
}

/// Resolve one field per zone > farm > defaults > hard-coded fallback
/// (spec §3, Open Question (a): config always overrides constants — the
/// hard-coded value here is only ever reached when all three config tiers
/// are silent).
pub fn resolve(
    zone: &ZoneConfigPartial,
    farm: &ZoneConfigPartial,
    defaults: &ZoneConfigPartial,
) -> ZoneConfig {
    resolve_chain!(zone, farm, defaults, {
        temp_min = 18.0,
        temp_max = 30.0,
        co2_max = 3000.0,
        nh3_threshold = 20.0,
        feed_threshold = 1.0,
        water_threshold = 1.0,
        activity_min = 0.2,
        status_interval_s = 5.0,

        temp_setpoint = 26.0,
        co2_setpoint = 1500.0,
        fan_kp_temp = 10.0,
        fan_kp_co2 = 0.02,
        fan_max = 100.0,
        fan_min = 0.0,
        heater_kp_temp = 15.0,
        heater_deadband_c = 0.4,
        heater_min_on_s = 120.0,
        heater_min_off_s = 120.0,
        heater_min_level = 20.0,
        heater_min_fan = 20.0,
        fan_min_vent_pct = 10.0,
        inlet_min_pct = 20.0,
        fan_cold_max_pct = 30.0,
        inlet_cold_max_pct = 30.0,
        cold_vent_delta_c = 2.0,
        light_activity_high = 0.8,
        light_min_day_pct = 40.0,
        light_min_night_pct = 0.0,
        lights_on_h = 6.0,
        lights_off_h = 20.0,
        fan_rate_limit_per_min = 80.0,
        heater_rate_limit_per_min = 60.0,
        inlet_rate_limit_per_min = 80.0,
        light_rate_limit_per_min = 100.0,
        feed_refill_low_kg = 1.5,
        feed_refill_high_kg = 2.5,
        water_refill_low_l = 1.5,
        water_refill_high_l = 2.5,

        starvation_threshold_s = 300.0,
        min_action_interval_s = 30.0,

        volume_m3 = 400.0,
        mass_factor = 1.2,
        ua_w_per_k = 250.0,
        base_infiltration_m3_s = 0.15,
        fan_max_flow_m3_s = 8.0,
        bird_count = 8000.0,
        bird_heat_w = 9.0,
        bird_heat_w_activity = 3.0,
        heater_power_w = 40000.0,
        auto_fan_level = 40.0,
        feed_activity_mult = 0.4,
        water_activity_mult = 0.5,
        feed_refill_flow_kg_s = 0.5,
        water_refill_flow_l_s = 0.5,
        co2_lps_per_bird = 0.0025,
        co2_activity_mult = 0.6,
        outside_co2_ppm = 420.0,
        nh3_mg_per_bird_day = 100.0,
        nh3_activity_mult = 0.5,
        nh3_temp_coeff = 0.03,
        nh3_decay_per_s = 0.0005,
        feed_kg_per_bird_day = 0.12,
        water_l_per_bird_day = 0.22,
        hopper_capacity_kg = 500.0,
        tank_capacity_l = 1000.0,
        fan_ramp_per_min = 60.0,
        heater_ramp_per_min = 50.0,
        inlet_ramp_per_min = 80.0,
        light_ramp_per_min = 100.0,
        fan_min_on_s = 30.0,
        fan_min_off_s = 30.0,
        startup_override_s = 60.0,
        auto_control_timeout_s = 120.0,
        sensor_interval_s = 5.0,
        activity_tau_s = 120.0,
        fan_on_temp_c = 28.0,
        fan_off_temp_c = 26.0,
        heater_on_temp_c = 24.0,
        heater_off_temp_c = 26.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_overrides_farm_overrides_defaults() {
        let zone = ZoneConfigPartial {
            temp_setpoint: Some(22.0),
            ..Default::default()
        };
        let farm = ZoneConfigPartial {
            temp_setpoint: Some(24.0),
            co2_setpoint: Some(1200.0),
            ..Default::default()
        };
        let defaults = ZoneConfigPartial {
            co2_setpoint: Some(1000.0),
            fan_max: Some(90.0),
            ..Default::default()
        };
        let resolved = resolve(&zone, &farm, &defaults);
        assert_eq!(resolved.temp_setpoint, 22.0); // zone wins
        assert_eq!(resolved.co2_setpoint, 1200.0); // farm wins over defaults
        assert_eq!(resolved.fan_max, 90.0); // defaults wins over fallback
    }

    #[test]
    fn falls_back_to_hardcoded_when_nothing_configured() {
        let empty = ZoneConfigPartial::default();
        let resolved = resolve(&empty, &empty, &empty);
        assert_eq!(resolved.temp_setpoint, 26.0);
        assert_eq!(resolved.heater_min_on_s, 120.0);
        assert_eq!(resolved.fan_rate_limit_per_min, 80.0);
    }
}
