//! The knowledge store contract every component depends on explicitly
//! (spec §1 names it an out-of-scope external collaborator; spec §9's
//! redesign note turns it into an injected dependency rather than a
//! module-level singleton). Grounded on `common/knowledge.py`'s
//! `KnowledgeStore` class, one method per historical fact it records.

use async_trait::async_trait;
use poultry_common::model::{ActuatorCommand, ActuatorType, FarmId, SensorType, ZoneId};
use time::OffsetDateTime;

/// One historical sensor sample, as returned by [`KnowledgeStore::sensor_history`].
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    pub at: OffsetDateTime,
    pub value: f64,
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn log_sensor(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        sensor: SensorType,
        value: f64,
        at: OffsetDateTime,
    ) -> anyhow::Result<()>;

    async fn log_actuator_command(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        actuator: ActuatorType,
        command: &ActuatorCommand,
        at: OffsetDateTime,
    ) -> anyhow::Result<()>;

    async fn log_symptom(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        symptom: &str,
        severity: f64,
        at: OffsetDateTime,
    ) -> anyhow::Result<()>;

    async fn log_plan(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        actions: &[ActuatorCommand],
        at: OffsetDateTime,
    ) -> anyhow::Result<()>;

    /// Latest value no older than `max_age_s` before `now`. A reading
    /// outside the window is treated the same as no reading at all (spec
    /// §4.4 step 2's 10-minute window; §7's "Knowledge read empty" kind).
    async fn latest_sensor_value(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        sensor: SensorType,
        now: OffsetDateTime,
        max_age_s: f64,
    ) -> anyhow::Result<Option<f64>>;

    async fn sensor_history(
        &self,
        farm: &FarmId,
        zone: &ZoneId,
        sensor: SensorType,
        limit: usize,
    ) -> anyhow::Result<Vec<SensorSample>>;
}
