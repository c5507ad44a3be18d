//! Wire and domain types shared across every component: identifiers, sensor
//! and actuator enums, and the tagged command/plan/status shapes that cross
//! the MQTT bus as JSON.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque farm identifier. Newtype over a cheaply-clonable string so zone
/// maps can't accidentally key on the wrong kind of string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FarmId(Arc<str>);

/// Opaque zone identifier, unique only in combination with a `FarmId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(Arc<str>);

macro_rules! id_newtype {
    ($ty:ident) => {
        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<String> for $ty {
            fn from(s: String) -> Self {
                Self(Arc::from(s.as_str()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(FarmId);
id_newtype!(ZoneId);

/// Uniquely identifies a controllable environment.
pub type ZoneKey = (FarmId, ZoneId);

// ---------------------------------------------------------------------------
// Sensor / actuator closed sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Temperature,
    Co2,
    Ammonia,
    FeedLevel,
    WaterLevel,
    Activity,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::Co2 => "co2",
            SensorType::Ammonia => "ammonia",
            SensorType::FeedLevel => "feed_level",
            SensorType::WaterLevel => "water_level",
            SensorType::Activity => "activity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorType {
    Fan,
    Heater,
    Inlet,
    FeedDispenser,
    WaterValve,
    Light,
}

impl ActuatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorType::Fan => "fan",
            ActuatorType::Heater => "heater",
            ActuatorType::Inlet => "inlet",
            ActuatorType::FeedDispenser => "feed_dispenser",
            ActuatorType::WaterValve => "water_valve",
            ActuatorType::Light => "light",
        }
    }
}

// ---------------------------------------------------------------------------
// SensorReading
// ---------------------------------------------------------------------------

/// A single physical-quantity observation. Immutable once written; `value`
/// is the raw physical quantity, never normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub farm: FarmId,
    pub zone: ZoneId,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub value: f64,
    pub timestamp: time::OffsetDateTime,
}

// ---------------------------------------------------------------------------
// Sensor group payloads (what the simulator actually publishes per topic)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirPayload {
    pub temperature_c: Option<f64>,
    pub co2_ppm: Option<f64>,
    pub nh3_ppm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedLevelPayload {
    pub feed_kg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterLevelPayload {
    pub water_l: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPayload {
    pub activity: Option<f64>,
}

/// Which sensor group a `{farm}/{zone}/sensors/{group}` message belongs to.
/// Unknown groups decode to `Unknown` rather than failing, keeping topic
/// parsing total; callers log-and-drop the `Unknown` arm.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorGroup {
    Air(AirPayload),
    FeedLevel(FeedLevelPayload),
    WaterLevel(WaterLevelPayload),
    Activity(ActivityPayload),
    Unknown,
}

impl SensorGroup {
    /// Decode a `sensors/{group}` payload, keyed on the group name already
    /// parsed from the topic (the group determines the payload shape; there
    /// is no discriminant field to sniff out of the JSON itself).
    pub fn decode_for(group: &str, payload: &[u8]) -> serde_json::Result<Self> {
        Ok(match group {
            "air" => SensorGroup::Air(serde_json::from_slice(payload)?),
            "feed_level" => SensorGroup::FeedLevel(serde_json::from_slice(payload)?),
            "water_level" => SensorGroup::WaterLevel(serde_json::from_slice(payload)?),
            "activity" => SensorGroup::Activity(serde_json::from_slice(payload)?),
            _ => SensorGroup::Unknown,
        })
    }

    /// Every `(SensorType, value)` pair actually present in this group,
    /// ready to hand to `KnowledgeStore::log_sensor` one at a time.
    pub fn readings(&self) -> Vec<(SensorType, f64)> {
        match self {
            SensorGroup::Air(payload) => [
                (SensorType::Temperature, payload.temperature_c),
                (SensorType::Co2, payload.co2_ppm),
                (SensorType::Ammonia, payload.nh3_ppm),
            ]
            .into_iter()
            .filter_map(|(sensor, value)| value.map(|value| (sensor, value)))
            .collect(),
            SensorGroup::FeedLevel(payload) => payload
                .feed_kg
                .map(|value| vec![(SensorType::FeedLevel, value)])
                .unwrap_or_default(),
            SensorGroup::WaterLevel(payload) => payload
                .water_l
                .map(|value| vec![(SensorType::WaterLevel, value)])
                .unwrap_or_default(),
            SensorGroup::Activity(payload) => payload
                .activity
                .map(|value| vec![(SensorType::Activity, value)])
                .unwrap_or_default(),
            SensorGroup::Unknown => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ZoneStatus
// ---------------------------------------------------------------------------

/// Produced once per status interval per zone by the Analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub farm_id: FarmId,
    pub zone: ZoneId,
    pub temperature_c: Option<f64>,
    pub co2_ppm: Option<f64>,
    pub nh3_ppm: Option<f64>,
    pub feed_kg: Option<f64>,
    pub water_l: Option<f64>,
    pub activity: Option<f64>,
    pub temp_ok: bool,
    pub co2_ok: bool,
    pub nh3_ok: bool,
    pub feed_ok: bool,
    pub water_ok: bool,
    pub activity_ok: bool,
    pub alert: String,
}

// ---------------------------------------------------------------------------
// ActuatorCommand — tagged sum type replacing the legacy dynamically-typed
// JSON payload (spec §9 redesign note).
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetTag {
    #[serde(rename = "SET")]
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnOffTag {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl OnOffTag {
    pub fn from_bool(on: bool) -> Self {
        if on {
            OnOffTag::On
        } else {
            OnOffTag::Off
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, OnOffTag::On)
    }
}

/// Per-actuator command shapes. `#[serde(untagged)]` is fine for *encoding*
/// (each variant serializes to its own distinct field set) but must not be
/// used to *decode* a payload on its own: `HeaterSet`/`LightSet` both carry
/// only `{action, level_pct}`, and `HeaterOnOff`/`FeedOnOff`/`WaterOnOff` all
/// carry only `{action}`, so untagged deserialization always resolves these
/// to whichever same-shaped variant is declared first (`HeaterSet`,
/// `HeaterOnOff`) regardless of which actuator the payload was actually for.
/// Decode with [`ActuatorCommand::decode_for`], which uses the actuator
/// already known from the `cmd` topic to pick the right variant. `Unknown`
/// keeps parsing total for forward-compatible or malformed payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActuatorCommand {
    FanSet { action: SetTag, level: i32 },
    HeaterSet { action: SetTag, level_pct: i32 },
    HeaterOnOff { action: OnOffTag },
    InletSet { action: SetTag, open_pct: i32 },
    LightSet { action: SetTag, level_pct: i32 },
    FeedOnOff { action: OnOffTag },
    FeedPulse { amount_g: f64 },
    WaterOnOff { action: OnOffTag },
    WaterPulse { duration_s: f64 },
    Unknown(serde_json::Value),
}

impl ActuatorCommand {
    pub fn fan_set(level: i32) -> Self {
        ActuatorCommand::FanSet {
            action: SetTag::Set,
            level: level.clamp(0, 100),
        }
    }

    pub fn heater_set(level_pct: i32) -> Self {
        ActuatorCommand::HeaterSet {
            action: SetTag::Set,
            level_pct: level_pct.clamp(0, 100),
        }
    }

    pub fn inlet_set(open_pct: i32) -> Self {
        ActuatorCommand::InletSet {
            action: SetTag::Set,
            open_pct: open_pct.clamp(0, 100),
        }
    }

    pub fn light_set(level_pct: i32) -> Self {
        ActuatorCommand::LightSet {
            action: SetTag::Set,
            level_pct: level_pct.clamp(0, 100),
        }
    }

    pub fn on_off(actuator: ActuatorType, on: bool) -> Self {
        let tag = OnOffTag::from_bool(on);
        match actuator {
            ActuatorType::Heater => ActuatorCommand::HeaterOnOff { action: tag },
            ActuatorType::FeedDispenser => ActuatorCommand::FeedOnOff { action: tag },
            ActuatorType::WaterValve => ActuatorCommand::WaterOnOff { action: tag },
            other => ActuatorCommand::Unknown(serde_json::json!({
                "action": if on { "ON" } else { "OFF" },
                "actuator": other.as_str(),
            })),
        }
    }

    /// Decode a `cmd` payload known to target `actuator`. Required instead of
    /// a bare untagged `from_slice`/`from_value` because several variants
    /// share an identical wire shape (see the enum's doc comment) and can
    /// only be told apart by which actuator the topic addressed.
    pub fn decode_for(actuator: ActuatorType, payload: &[u8]) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        Self::decode_value_for(actuator, value)
    }

    fn decode_value_for(actuator: ActuatorType, value: serde_json::Value) -> serde_json::Result<Self> {
        #[derive(Deserialize)]
        struct SetLevel {
            action: SetTag,
            level: i32,
        }
        #[derive(Deserialize)]
        struct SetLevelPct {
            action: SetTag,
            level_pct: i32,
        }
        #[derive(Deserialize)]
        struct SetOpenPct {
            action: SetTag,
            open_pct: i32,
        }
        #[derive(Deserialize)]
        struct OnOff {
            action: OnOffTag,
        }
        #[derive(Deserialize)]
        struct FeedPulseShape {
            amount_g: f64,
        }
        #[derive(Deserialize)]
        struct WaterPulseShape {
            duration_s: f64,
        }

        match actuator {
            ActuatorType::Fan => {
                let shape: SetLevel = serde_json::from_value(value)?;
                Ok(ActuatorCommand::FanSet { action: shape.action, level: shape.level })
            }
            ActuatorType::Heater => {
                if value.get("level_pct").is_some() {
                    let shape: SetLevelPct = serde_json::from_value(value)?;
                    Ok(ActuatorCommand::HeaterSet { action: shape.action, level_pct: shape.level_pct })
                } else {
                    let shape: OnOff = serde_json::from_value(value)?;
                    Ok(ActuatorCommand::HeaterOnOff { action: shape.action })
                }
            }
            ActuatorType::Inlet => {
                let shape: SetOpenPct = serde_json::from_value(value)?;
                Ok(ActuatorCommand::InletSet { action: shape.action, open_pct: shape.open_pct })
            }
            ActuatorType::Light => {
                let shape: SetLevelPct = serde_json::from_value(value)?;
                Ok(ActuatorCommand::LightSet { action: shape.action, level_pct: shape.level_pct })
            }
            ActuatorType::FeedDispenser => {
                if value.get("amount_g").is_some() {
                    let shape: FeedPulseShape = serde_json::from_value(value)?;
                    Ok(ActuatorCommand::FeedPulse { amount_g: shape.amount_g })
                } else {
                    let shape: OnOff = serde_json::from_value(value)?;
                    Ok(ActuatorCommand::FeedOnOff { action: shape.action })
                }
            }
            ActuatorType::WaterValve => {
                if value.get("duration_s").is_some() {
                    let shape: WaterPulseShape = serde_json::from_value(value)?;
                    Ok(ActuatorCommand::WaterPulse { duration_s: shape.duration_s })
                } else {
                    let shape: OnOff = serde_json::from_value(value)?;
                    Ok(ActuatorCommand::WaterOnOff { action: shape.action })
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Action / Plan
// ---------------------------------------------------------------------------

/// `{actuator, priority (lower = higher), command}`. `command` is
/// deserialized with [`ActuatorCommand::decode_for`] rather than derived
/// field-by-field: a plain derive would decode `command` in isolation,
/// hitting the same untagged-shape ambiguity `decode_for`'s doc comment
/// describes, even though `actuator` sits right next to it on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub actuator: ActuatorType,
    pub priority: i32,
    pub command: ActuatorCommand,
}

impl<'de> serde::Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            actuator: ActuatorType,
            priority: i32,
            command: serde_json::Value,
        }
        let wire = Wire::deserialize(deserializer)?;
        let command = ActuatorCommand::decode_value_for(wire.actuator, wire.command)
            .map_err(serde::de::Error::custom)?;
        Ok(Action {
            actuator: wire.actuator,
            priority: wire.priority,
            command,
        })
    }
}

/// Fixed priority tiers from the control law (spec §4.5 stage 8).
pub mod priority {
    pub const FAN: i32 = 1;
    pub const HEATER: i32 = 1;
    pub const INLET: i32 = 2;
    pub const FEED_WATER: i32 = 3;
    pub const LIGHT: i32 = 4;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub farm_id: FarmId,
    pub zone: ZoneId,
    pub actions: Vec<Action>,
}

impl Plan {
    /// Sorts actions ascending by priority, matching the control law's final
    /// stage. Ties preserve insertion order (stable sort).
    pub fn sort_by_priority(&mut self) {
        self.actions.sort_by_key(|a| a.priority);
    }
}
