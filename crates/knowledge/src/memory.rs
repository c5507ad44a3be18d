//! In-memory `KnowledgeStore`, the default used by every binary unless the
//! `sqlite` feature and a DSN are configured. Grounded on the same
//! trait as `sqlite.rs`; the teacher has no in-memory analogue for `Db`, so
//! this mirrors `crates/hub/src/state.rs`'s `Arc<Mutex<..>>`-owned-by-one-
//! process pattern instead, substituted with a bounded `VecDeque` per
//! series to keep memory use flat during long test runs.

use async_trait::async_trait;
use poultry_common::model::{ActuatorCommand, ActuatorType, FarmId, SensorType, ZoneId};
use std::collections::{HashMap, VecDeque};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::store::{KnowledgeStore, SensorSample};

const MAX_HISTORY_PER_SERIES: usize = 2048;

type SeriesKey = (FarmId, ZoneId, SensorType);

#[derive(Default)]
struct Inner {
    sensor_series: HashMap<SeriesKey, VecDeque<SensorSample>>,
    commands_logged: u64,
    symptoms_logged: u64,
    plans_logged: u64,
}

/// Holds every logged fact in process memory. Cheap to construct, safe to
/// share via `Arc`, and loses everything on restart — appropriate for tests
/// and for any deployment that doesn't need durability across restarts.
pub struct InMemoryKnowledgeStore {
    inner: Mutex<Inner>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Snapshot counters, for tests asserting write volume without
    /// inspecting series contents.
    pub async fn counts(&self) -> (u64, u64, u64) {
        let inner = self.inner.lock().await;
        (
            inner.commands_logged,
            inner.symptoms_logged,
            inner.plans_logged,
        )
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn log_sensor(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        sensor: SensorType,
        value: f64,
        at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        let series = inner
            .sensor_series
            .entry((farm.clone(), zone.clone(), sensor))
            .or_default();
        series.push_back(SensorSample { at, value });
        if series.len() > MAX_HISTORY_PER_SERIES {
            series.pop_front();
        }
        Ok(())
    }

    async fn log_actuator_command(
        &self,
        _farm: &FarmId,
        _zone: &ZoneId,
        _actuator: ActuatorType,
        _command: &ActuatorCommand,
        _at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.inner.lock().await.commands_logged += 1;
        Ok(())
    }

    async fn log_symptom(
        &self,
        _farm: &FarmId,
        _zone: &ZoneId,
        _symptom: &str,
        _severity: f64,
        _at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.inner.lock().await.symptoms_logged += 1;
        Ok(())
    }

    async fn log_plan(
        &self,
        _farm: &FarmId,
        _zone: &ZoneId,
        _actions: &[ActuatorCommand],
        _at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.inner.lock().await.plans_logged += 1;
        Ok(())
    }

    async fn latest_sensor_value(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        sensor: SensorType,
        now: OffsetDateTime,
        max_age_s: f64,
    ) -> anyhow::Result<Option<f64>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sensor_series
            .get(&(farm.clone(), zone.clone(), sensor))
            .and_then(|series| series.back())
            .filter(|sample| (now - sample.at).as_seconds_f64() <= max_age_s)
            .map(|sample| sample.value))
    }

    async fn sensor_history(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        sensor: SensorType,
        limit: usize,
    ) -> anyhow::Result<Vec<SensorSample>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sensor_series
            .get(&(farm.clone(), zone.clone(), sensor))
            .map(|series| series.iter().rev().take(limit).rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poultry_common::model::{FarmId, ZoneId};
    use time::macros::datetime;

    fn farm() -> FarmId {
        FarmId::from("farm-a")
    }
    fn zone() -> ZoneId {
        ZoneId::from("zone-1")
    }

    #[tokio::test]
    async fn latest_sensor_value_reflects_most_recent_write() {
        let store = InMemoryKnowledgeStore::new();
        store
            .log_sensor(&farm(), &zone(), SensorType::Temperature, 26.0, datetime!(2026-01-01 00:00 UTC))
            .await
            .unwrap();
        store
            .log_sensor(&farm(), &zone(), SensorType::Temperature, 27.5, datetime!(2026-01-01 00:05 UTC))
            .await
            .unwrap();
        let latest = store
            .latest_sensor_value(
                &farm(),
                &zone(),
                SensorType::Temperature,
                datetime!(2026-01-01 00:05 UTC),
                600.0,
            )
            .await
            .unwrap();
        assert_eq!(latest, Some(27.5));
    }

    #[tokio::test]
    async fn latest_sensor_value_outside_window_is_treated_as_missing() {
        let store = InMemoryKnowledgeStore::new();
        store
            .log_sensor(&farm(), &zone(), SensorType::Temperature, 26.0, datetime!(2026-01-01 00:00 UTC))
            .await
            .unwrap();
        let latest = store
            .latest_sensor_value(
                &farm(),
                &zone(),
                SensorType::Temperature,
                datetime!(2026-01-01 00:15 UTC),
                600.0,
            )
            .await
            .unwrap();
        assert_eq!(latest, None);
    }

    #[tokio::test]
    async fn sensor_history_respects_limit_and_order() {
        let store = InMemoryKnowledgeStore::new();
        for i in 0..5 {
            store
                .log_sensor(
                    &farm(),
                    &zone(),
                    SensorType::Co2,
                    1000.0 + i as f64,
                    datetime!(2026-01-01 00:00 UTC) + time::Duration::minutes(i),
                )
                .await
                .unwrap();
        }
        let history = store
            .sensor_history(&farm(), &zone(), SensorType::Co2, 3)
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().value, 1004.0);
    }

    #[tokio::test]
    async fn unrelated_zone_does_not_see_other_zones_history() {
        let store = InMemoryKnowledgeStore::new();
        store
            .log_sensor(&farm(), &zone(), SensorType::Temperature, 26.0, datetime!(2026-01-01 00:00 UTC))
            .await
            .unwrap();
        let other = store
            .latest_sensor_value(
                &farm(),
                &ZoneId::from("zone-2"),
                SensorType::Temperature,
                datetime!(2026-01-01 00:00 UTC),
                600.0,
            )
            .await
            .unwrap();
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn counts_increment_per_log_call() {
        let store = InMemoryKnowledgeStore::new();
        store
            .log_symptom(&farm(), &zone(), "temp_high", 0.8, datetime!(2026-01-01 00:00 UTC))
            .await
            .unwrap();
        store
            .log_plan(&farm(), &zone(), &[], datetime!(2026-01-01 00:00 UTC))
            .await
            .unwrap();
        let (commands, symptoms, plans) = store.counts().await;
        assert_eq!((commands, symptoms, plans), (0, 1, 1));
    }
}
