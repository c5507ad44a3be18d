//! One zone's simulation task pair: a tick loop advancing the physics and
//! publishing sensor readings, plus the command-subscription handler that
//! feeds actuator commands in. Grounded on `environment/main.py`'s
//! `EnvironmentRunner` (tick/publish cadence, payload shapes) and on
//! `crates/node/src/main.rs`'s split between a spawned MQTT event-loop task
//! and a foreground sampling loop sharing state through an `Arc<Mutex<_>>`
//! (mirroring `crates/hub/src/state.rs`'s `SharedState`).

use std::sync::Arc;
use std::time::Duration;

use poultry_common::bus::Publisher;
use poultry_common::model::{
    ActuatorCommand, ActuatorType, AirPayload, ActivityPayload, FarmId, FeedLevelPayload,
    WaterLevelPayload, ZoneId,
};
use poultry_common::topic;
use poultry_config::ZoneConfig;
use poultry_knowledge::KnowledgeStore;
use tokio::sync::Mutex;
use tokio::time::interval;

use crate::model::EnvironmentState;
use crate::noise::gaussian;

/// Noise sigmas for the published (not the true) air readings (spec: Gaussian
/// noise σ=0.2/30/2 on temperature/co2/nh3).
const TEMPERATURE_NOISE_SIGMA_C: f64 = 0.2;
const CO2_NOISE_SIGMA_PPM: f64 = 30.0;
const NH3_NOISE_SIGMA_PPM: f64 = 2.0;

/// Shared per-zone state, cloned into both the tick task and the command
/// handler invoked from the MQTT dispatch loop.
pub struct ZoneWorker {
    pub farm: FarmId,
    pub zone: ZoneId,
    pub state: Arc<Mutex<EnvironmentState>>,
}

impl ZoneWorker {
    pub fn new(farm: FarmId, zone: ZoneId) -> Self {
        Self {
            farm,
            zone,
            state: Arc::new(Mutex::new(EnvironmentState::default())),
        }
    }

    /// Apply an actuator command decoded off `{farm}/{zone}/cmd/{actuator}`.
    pub async fn apply_command(&self, actuator: ActuatorType, command: &ActuatorCommand) {
        let mut state = self.state.lock().await;
        state.apply_command(actuator, command);
    }

    /// Runs forever: advances physics every `dt_s` and publishes the four
    /// sensor groups every `sensor_interval_s`, logging each reading to the
    /// knowledge store the way the Monitor does for live sensor traffic
    /// (the simulator is both the plant and, for the purposes of bootstrap
    /// testing, its own first-hop telemetry source).
    pub async fn run(
        &self,
        config_source: impl Fn() -> ZoneConfig + Send + Sync + 'static,
        publisher: Arc<dyn Publisher>,
        knowledge: Arc<dyn KnowledgeStore>,
        dt_s: f64,
    ) {
        let sensor_interval_s = config_source().sensor_interval_s.max(1.0);
        let mut ticks = interval(Duration::from_secs_f64(dt_s));
        let mut since_publish = 0.0_f64;

        loop {
            ticks.tick().await;
            let config = config_source();

            let snapshot = {
                let mut state = self.state.lock().await;
                state.step(&config, dt_s);
                state.clone()
            };

            since_publish += dt_s;
            if since_publish + 1e-9 < sensor_interval_s {
                continue;
            }
            since_publish = 0.0;

            if let Err(err) = self.publish_sensors(&snapshot, publisher.as_ref(), knowledge.as_ref()).await {
                tracing::error!(farm = %self.farm, zone = %self.zone, error = %err, "failed to publish sensors");
            }
        }
    }

    /// Air readings are published (and archived) with Gaussian noise on top
    /// of the true physical state; feed/water/activity are published as-is.
    async fn publish_sensors(
        &self,
        state: &EnvironmentState,
        publisher: &dyn Publisher,
        knowledge: &dyn KnowledgeStore,
    ) -> anyhow::Result<()> {
        use poultry_common::model::SensorType;
        let now = time::OffsetDateTime::now_utc();

        let noised_temperature_c = gaussian(state.temperature_c, TEMPERATURE_NOISE_SIGMA_C);
        let noised_co2_ppm = gaussian(state.co2_ppm, CO2_NOISE_SIGMA_PPM).max(0.0);
        let noised_nh3_ppm = gaussian(state.nh3_ppm, NH3_NOISE_SIGMA_PPM).max(0.0);

        let air = AirPayload {
            temperature_c: Some(noised_temperature_c),
            co2_ppm: Some(noised_co2_ppm),
            nh3_ppm: Some(noised_nh3_ppm),
        };
        publisher
            .publish(&topic::sensors_topic(&self.farm, &self.zone, "air"), serde_json::to_vec(&air)?)
            .await?;

        let feed = FeedLevelPayload {
            feed_kg: Some(state.feed_kg),
        };
        publisher
            .publish(
                &topic::sensors_topic(&self.farm, &self.zone, "feed_level"),
                serde_json::to_vec(&feed)?,
            )
            .await?;

        let water = WaterLevelPayload {
            water_l: Some(state.water_l),
        };
        publisher
            .publish(
                &topic::sensors_topic(&self.farm, &self.zone, "water_level"),
                serde_json::to_vec(&water)?,
            )
            .await?;

        let activity = ActivityPayload {
            activity: Some(state.activity),
        };
        publisher
            .publish(
                &topic::sensors_topic(&self.farm, &self.zone, "activity"),
                serde_json::to_vec(&activity)?,
            )
            .await?;

        knowledge
            .log_sensor(&self.farm, &self.zone, SensorType::Temperature, noised_temperature_c, now)
            .await?;
        knowledge
            .log_sensor(&self.farm, &self.zone, SensorType::Co2, noised_co2_ppm, now)
            .await?;
        knowledge
            .log_sensor(&self.farm, &self.zone, SensorType::Ammonia, noised_nh3_ppm, now)
            .await?;
        knowledge
            .log_sensor(&self.farm, &self.zone, SensorType::FeedLevel, state.feed_kg, now)
            .await?;
        knowledge
            .log_sensor(&self.farm, &self.zone, SensorType::WaterLevel, state.water_l, now)
            .await?;
        knowledge
            .log_sensor(&self.farm, &self.zone, SensorType::Activity, state.activity, now)
            .await?;

        Ok(())
    }
}
