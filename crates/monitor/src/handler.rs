//! Sensor-bus-to-Knowledge translation. Grounded on
//! `monitor/monitor_service.py`'s `on_message`: one `SensorReading` per
//! present field, malformed JSON or an unrecognized group dropped with a
//! log line, no batching.

use poultry_common::model::{FarmId, SensorGroup, ZoneId};
use poultry_knowledge::KnowledgeStore;
use time::OffsetDateTime;

/// Parses a `{farm}/{zone}/sensors/{group}` payload via [`SensorGroup`] and
/// writes every present field to `knowledge`. Returns the count of readings
/// written (0 for an unknown group, an empty payload, or a knowledge-write
/// failure that was logged and swallowed per component — callers don't need
/// the count to do anything but log it).
pub async fn handle_sensor_message(
    knowledge: &dyn KnowledgeStore,
    farm: &FarmId,
    zone: &ZoneId,
    group: &str,
    payload: &[u8],
    at: OffsetDateTime,
) -> usize {
    let parsed = match SensorGroup::decode_for(group, payload) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(farm = %farm, zone = %zone, group, error = %err, "invalid JSON on sensors topic");
            return 0;
        }
    };

    if matches!(parsed, SensorGroup::Unknown) {
        tracing::warn!(farm = %farm, zone = %zone, group, "unknown sensor group");
        return 0;
    }

    let mut written = 0;
    for (sensor, value) in parsed.readings() {
        match knowledge.log_sensor(farm, zone, sensor, value, at).await {
            Ok(()) => written += 1,
            Err(err) => {
                tracing::error!(farm = %farm, zone = %zone, sensor = sensor.as_str(), error = %err, "knowledge write failed");
            }
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use poultry_common::model::SensorType;
    use poultry_knowledge::InMemoryKnowledgeStore;
    use time::macros::datetime;

    fn farm_zone() -> (FarmId, ZoneId) {
        (FarmId::from("farm-a"), ZoneId::from("zone-1"))
    }

    #[tokio::test]
    async fn air_group_writes_up_to_three_readings() {
        let store = InMemoryKnowledgeStore::new();
        let (farm, zone) = farm_zone();
        let payload = br#"{"temperature_c": 24.5, "co2_ppm": 1200.0, "nh3_ppm": 8.0}"#;
        let written = handle_sensor_message(&store, &farm, &zone, "air", payload, datetime!(2026-01-01 00:00 UTC)).await;
        assert_eq!(written, 3);
        assert_eq!(
            store
                .latest_sensor_value(&farm, &zone, SensorType::Temperature, datetime!(2026-01-01 00:00 UTC), 600.0)
                .await
                .unwrap(),
            Some(24.5)
        );
    }

    #[tokio::test]
    async fn air_group_with_missing_fields_writes_only_present_ones() {
        let store = InMemoryKnowledgeStore::new();
        let (farm, zone) = farm_zone();
        let payload = br#"{"temperature_c": 24.5}"#;
        let written = handle_sensor_message(&store, &farm, &zone, "air", payload, datetime!(2026-01-01 00:00 UTC)).await;
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn air_group_with_no_fields_present_writes_nothing_and_is_not_an_error() {
        let store = InMemoryKnowledgeStore::new();
        let (farm, zone) = farm_zone();
        let written = handle_sensor_message(&store, &farm, &zone, "air", b"{}", datetime!(2026-01-01 00:00 UTC)).await;
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn single_field_groups_map_to_one_reading() {
        let store = InMemoryKnowledgeStore::new();
        let (farm, zone) = farm_zone();
        let written = handle_sensor_message(
            &store,
            &farm,
            &zone,
            "feed_level",
            br#"{"feed_kg": 410.0}"#,
            datetime!(2026-01-01 00:00 UTC),
        )
        .await;
        assert_eq!(written, 1);
        assert_eq!(
            store
                .latest_sensor_value(&farm, &zone, SensorType::FeedLevel, datetime!(2026-01-01 00:00 UTC), 600.0)
                .await
                .unwrap(),
            Some(410.0)
        );
    }

    #[tokio::test]
    async fn unknown_group_is_dropped_without_error() {
        let store = InMemoryKnowledgeStore::new();
        let (farm, zone) = farm_zone();
        let written = handle_sensor_message(&store, &farm, &zone, "weather", b"{}", datetime!(2026-01-01 00:00 UTC)).await;
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn malformed_json_is_dropped_without_error() {
        let store = InMemoryKnowledgeStore::new();
        let (farm, zone) = farm_zone();
        let written = handle_sensor_message(&store, &farm, &zone, "air", b"not json", datetime!(2026-01-01 00:00 UTC)).await;
        assert_eq!(written, 0);
    }
}
