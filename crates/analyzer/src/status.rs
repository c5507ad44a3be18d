//! `build_status`: the ok-flag and alert-phrase computation. Grounded on
//! `analyzer/analyzer_service.py`'s `build_status`, including the fixed
//! phrase table and its ordering (temperature, CO2, NH3, feed, water,
//! activity).

use poultry_common::model::{FarmId, ZoneId, ZoneStatus};
use poultry_config::ZoneConfig;

/// The six latest sensor values an Analyzer cycle reads from Knowledge
/// before computing a [`ZoneStatus`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Latest {
    pub temperature_c: Option<f64>,
    pub co2_ppm: Option<f64>,
    pub nh3_ppm: Option<f64>,
    pub feed_kg: Option<f64>,
    pub water_l: Option<f64>,
    pub activity: Option<f64>,
}

pub fn build_status(farm: &FarmId, zone: &ZoneId, latest: Latest, config: &ZoneConfig) -> ZoneStatus {
    let temp_ok = latest
        .temperature_c
        .is_some_and(|t| t >= config.temp_min && t <= config.temp_max);
    let co2_ok = latest.co2_ppm.is_some_and(|c| c <= config.co2_max);
    let nh3_ok = latest.nh3_ppm.is_some_and(|n| n <= config.nh3_threshold);
    let feed_ok = latest.feed_kg.is_some_and(|f| f >= config.feed_threshold);
    let water_ok = latest.water_l.is_some_and(|w| w >= config.water_threshold);
    let activity_ok = latest.activity.is_some_and(|a| a >= config.activity_min);

    let mut phrases: Vec<&'static str> = Vec::new();

    match latest.temperature_c {
        None => phrases.push("No temperature"),
        Some(t) if t < config.temp_min => phrases.push("Too cold"),
        Some(t) if t > config.temp_max => phrases.push("Too hot"),
        Some(_) => {}
    }
    match latest.co2_ppm {
        None => phrases.push("No CO2"),
        Some(_) if !co2_ok => phrases.push("High CO2"),
        Some(_) => {}
    }
    match latest.nh3_ppm {
        None => phrases.push("No NH3"),
        Some(_) if !nh3_ok => phrases.push("High NH3"),
        Some(_) => {}
    }
    match latest.feed_kg {
        None => phrases.push("No feed data"),
        Some(_) if !feed_ok => phrases.push("Low feed"),
        Some(_) => {}
    }
    match latest.water_l {
        None => phrases.push("No water data"),
        Some(_) if !water_ok => phrases.push("Low water"),
        Some(_) => {}
    }
    match latest.activity {
        None => phrases.push("No activity"),
        Some(_) if !activity_ok => phrases.push("Low activity"),
        Some(_) => {}
    }

    let alert = if phrases.is_empty() {
        "OK".to_string()
    } else {
        phrases.join(" & ")
    };

    ZoneStatus {
        farm_id: farm.clone(),
        zone: zone.clone(),
        temperature_c: latest.temperature_c,
        co2_ppm: latest.co2_ppm,
        nh3_ppm: latest.nh3_ppm,
        feed_kg: latest.feed_kg,
        water_l: latest.water_l,
        activity: latest.activity,
        temp_ok,
        co2_ok,
        nh3_ok,
        feed_ok,
        water_ok,
        activity_ok,
        alert,
    }
}
