//! SQLite-backed `KnowledgeStore`, enabled by the `sqlite` feature.
//! Grounded on `crates/hub/src/db.rs::Db` (connect options: WAL journal,
//! `synchronous = NORMAL`, a small pool). Uses the runtime-checked
//! `sqlx::query`/`query_as` API rather than the teacher's `sqlx::query!`
//! macro, which validates against a live database or an `.sqlx` offline
//! cache at compile time — unavailable for this workspace.

use async_trait::async_trait;
use poultry_common::model::{ActuatorCommand, ActuatorType, FarmId, SensorType, ZoneId};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use time::OffsetDateTime;

use crate::store::{KnowledgeStore, SensorSample};

pub struct SqliteKnowledgeStore {
    pool: Pool<Sqlite>,
}

impl SqliteKnowledgeStore {
    /// `db_url` examples: `"sqlite:///var/lib/poultry/knowledge.db"`,
    /// `"sqlite::memory:"` (tests).
    pub async fn connect(db_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_readings (
                farm_id TEXT NOT NULL,
                zone_id TEXT NOT NULL,
                sensor TEXT NOT NULL,
                value REAL NOT NULL,
                at_unix_ns INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sensor_readings_series \
             ON sensor_readings (farm_id, zone_id, sensor, at_unix_ns)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS actuator_commands (
                farm_id TEXT NOT NULL,
                zone_id TEXT NOT NULL,
                actuator TEXT NOT NULL,
                command_json TEXT NOT NULL,
                at_unix_ns INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS symptoms (
                farm_id TEXT NOT NULL,
                zone_id TEXT NOT NULL,
                symptom TEXT NOT NULL,
                severity REAL NOT NULL,
                at_unix_ns INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plans (
                farm_id TEXT NOT NULL,
                zone_id TEXT NOT NULL,
                actions_json TEXT NOT NULL,
                at_unix_ns INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn to_unix_ns(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos()).min(i128::from(i64::MAX)) as i64
}

fn from_unix_ns(ns: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ns))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn log_sensor(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        sensor: SensorType,
        value: f64,
        at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO sensor_readings (farm_id, zone_id, sensor, value, at_unix_ns) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(farm.as_str())
        .bind(zone.as_str())
        .bind(sensor.as_str())
        .bind(value)
        .bind(to_unix_ns(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_actuator_command(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        actuator: ActuatorType,
        command: &ActuatorCommand,
        at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let command_json = serde_json::to_string(command)?;
        sqlx::query(
            "INSERT INTO actuator_commands (farm_id, zone_id, actuator, command_json, at_unix_ns) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(farm.as_str())
        .bind(zone.as_str())
        .bind(actuator.as_str())
        .bind(command_json)
        .bind(to_unix_ns(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_symptom(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        symptom: &str,
        severity: f64,
        at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO symptoms (farm_id, zone_id, symptom, severity, at_unix_ns) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(farm.as_str())
        .bind(zone.as_str())
        .bind(symptom)
        .bind(severity)
        .bind(to_unix_ns(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_plan(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        actions: &[ActuatorCommand],
        at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let actions_json = serde_json::to_string(actions)?;
        sqlx::query(
            "INSERT INTO plans (farm_id, zone_id, actions_json, at_unix_ns) VALUES (?, ?, ?, ?)",
        )
        .bind(farm.as_str())
        .bind(zone.as_str())
        .bind(actions_json)
        .bind(to_unix_ns(at))
        .execute(&self.pool)
        .await?;
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
        let cutoff_ns = to_unix_ns(now - time::Duration::seconds_f64(max_age_s));
        let row = sqlx::query(
            "SELECT value FROM sensor_readings \
             WHERE farm_id = ? AND zone_id = ? AND sensor = ? AND at_unix_ns >= ? \
             ORDER BY at_unix_ns DESC LIMIT 1",
        )
        .bind(farm.as_str())
        .bind(zone.as_str())
        .bind(sensor.as_str())
        .bind(cutoff_ns)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<f64, _>("value")))
    }

    async fn sensor_history(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        sensor: SensorType,
        limit: usize,
    ) -> anyhow::Result<Vec<SensorSample>> {
        let rows = sqlx::query(
            "SELECT value, at_unix_ns FROM sensor_readings \
             WHERE farm_id = ? AND zone_id = ? AND sensor = ? \
             ORDER BY at_unix_ns DESC LIMIT ?",
        )
        .bind(farm.as_str())
        .bind(zone.as_str())
        .bind(sensor.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut samples: Vec<SensorSample> = rows
            .into_iter()
            .map(|r| SensorSample {
                value: r.get::<f64, _>("value"),
                at: from_unix_ns(r.get::<i64, _>("at_unix_ns")),
            })
            .collect();
        samples.reverse();
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poultry_common::model::{FarmId, ZoneId};
    use time::macros::datetime;

    async fn store() -> SqliteKnowledgeStore {
        SqliteKnowledgeStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_sensor_reading() {
        let store = store().await;
        let farm = FarmId::from("farm-a");
        let zone = ZoneId::from("zone-1");
        store
            .log_sensor(&farm, &zone, SensorType::Temperature, 27.2, datetime!(2026-01-01 00:00 UTC))
            .await
            .unwrap();
        let latest = store
            .latest_sensor_value(&farm, &zone, SensorType::Temperature, datetime!(2026-01-01 00:05 UTC), 600.0)
            .await
            .unwrap();
        assert_eq!(latest, Some(27.2));
    }

    #[tokio::test]
    async fn latest_sensor_value_outside_window_is_none() {
        let store = store().await;
        let farm = FarmId::from("farm-a");
        let zone = ZoneId::from("zone-1");
        store
            .log_sensor(&farm, &zone, SensorType::Temperature, 27.2, datetime!(2026-01-01 00:00 UTC))
            .await
            .unwrap();
        let latest = store
            .latest_sensor_value(&farm, &zone, SensorType::Temperature, datetime!(2026-01-01 00:15 UTC), 600.0)
            .await
            .unwrap();
        assert_eq!(latest, None);
    }

    #[tokio::test]
    async fn history_returns_in_chronological_order() {
        let store = store().await;
        let farm = FarmId::from("farm-a");
        let zone = ZoneId::from("zone-1");
        for i in 0..3 {
            store
                .log_sensor(
                    &farm,
                    &zone,
                    SensorType::Co2,
                    1000.0 + i as f64,
                    datetime!(2026-01-01 00:00 UTC) + time::Duration::minutes(i),
                )
                .await
                .unwrap();
        }
        let history = store.sensor_history(&farm, &zone, SensorType::Co2, 10).await.unwrap();
        let values: Vec<f64> = history.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1000.0, 1001.0, 1002.0]);
    }
}
