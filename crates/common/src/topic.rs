//! `{farm}/{zone}/{kind}/[subkind]` topic construction and parsing, in the
//! style of `drewalth-irrigation`'s `extract_node_id`/`extract_zone_id`
//! helpers: small total functions over `&str`, exhaustively unit tested.

use crate::model::{FarmId, ZoneId};

pub fn sensors_topic(farm: &FarmId, zone: &ZoneId, group: &str) -> String {
    format!("{farm}/{zone}/sensors/{group}")
}

pub fn status_topic(farm: &FarmId, zone: &ZoneId) -> String {
    format!("{farm}/{zone}/status")
}

pub fn plan_topic(farm: &FarmId, zone: &ZoneId) -> String {
    format!("{farm}/{zone}/plan")
}

pub fn cmd_topic(farm: &FarmId, zone: &ZoneId, actuator: &str) -> String {
    format!("{farm}/{zone}/cmd/{actuator}")
}

/// Subscription wildcard for all sensor topics across every farm and zone.
pub const SENSORS_WILDCARD: &str = "+/+/sensors/+";
/// Subscription wildcard for all status topics.
pub const STATUS_WILDCARD: &str = "+/+/status";
/// Subscription wildcard for all plan topics.
pub const PLAN_WILDCARD: &str = "+/+/plan";
/// Subscription wildcard for all command topics, across actuators.
pub const CMD_WILDCARD: &str = "+/+/cmd/+";

/// Parses `{farm}/{zone}/sensors/{group}` into `(farm, zone, group)`.
pub fn parse_sensors_topic(topic: &str) -> Option<(FarmId, ZoneId, &str)> {
    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        [farm, zone, "sensors", group] if !farm.is_empty() && !zone.is_empty() => {
            Some((FarmId::from(*farm), ZoneId::from(*zone), *group))
        }
        _ => None,
    }
}

/// Parses `{farm}/{zone}/status` into `(farm, zone)`.
pub fn parse_status_topic(topic: &str) -> Option<(FarmId, ZoneId)> {
    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        [farm, zone, "status"] if !farm.is_empty() && !zone.is_empty() => {
            Some((FarmId::from(*farm), ZoneId::from(*zone)))
        }
        _ => None,
    }
}

/// Parses `{farm}/{zone}/plan` into `(farm, zone)`.
pub fn parse_plan_topic(topic: &str) -> Option<(FarmId, ZoneId)> {
    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        [farm, zone, "plan"] if !farm.is_empty() && !zone.is_empty() => {
            Some((FarmId::from(*farm), ZoneId::from(*zone)))
        }
        _ => None,
    }
}

/// Parses `{farm}/{zone}/cmd/{actuator}` into `(farm, zone, actuator)`.
pub fn parse_cmd_topic(topic: &str) -> Option<(FarmId, ZoneId, &str)> {
    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        [farm, zone, "cmd", actuator] if !farm.is_empty() && !zone.is_empty() => {
            Some((FarmId::from(*farm), ZoneId::from(*zone), *actuator))
        }
        _ => None,
    }
}
