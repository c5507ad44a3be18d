//! Analyzer process: every `status_interval_s`, recomputes a `ZoneStatus`
//! per zone from the latest Knowledge readings and publishes it, logging a
//! symptom row per ok-flag plus the alert text. Grounded on
//! `analyzer/analyzer_service.py`'s `start_analyzer` loop-and-publish shape.

mod status;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use poultry_common::bus::{MqttPublisher, Publisher};
use poultry_common::model::{FarmId, SensorType, ZoneId};
use poultry_common::topic;
use poultry_config::{HotReload, Topology};
use poultry_knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
use rumqttc::{AsyncClient, MqttOptions};

use crate::status::{build_status, Latest};

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// A reading more than this many seconds old is treated as missing
/// (spec §4.4 step 2's 10-minute freshness window).
const SENSOR_WINDOW_S: f64 = 600.0;

async fn latest_of(
    knowledge: &dyn KnowledgeStore,
    farm: &FarmId,
    zone: &ZoneId,
    sensor: SensorType,
    now: time::OffsetDateTime,
) -> Option<f64> {
    match knowledge.latest_sensor_value(farm, zone, sensor, now, SENSOR_WINDOW_S).await {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(farm = %farm, zone = %zone, sensor = sensor.as_str(), error = %err, "knowledge read failed, treating as missing");
            None
        }
    }
}

async fn run_cycle(
    topology: &Topology,
    publisher: &dyn Publisher,
    knowledge: &dyn KnowledgeStore,
) {
    for (farm_str, zone_str) in topology.zone_keys() {
        let farm = FarmId::from(farm_str.as_str());
        let zone = ZoneId::from(zone_str.as_str());
        let config = topology.resolve(farm.as_str(), zone.as_str());
        let now = time::OffsetDateTime::now_utc();

        let latest = Latest {
            temperature_c: latest_of(knowledge, &farm, &zone, SensorType::Temperature, now).await,
            co2_ppm: latest_of(knowledge, &farm, &zone, SensorType::Co2, now).await,
            nh3_ppm: latest_of(knowledge, &farm, &zone, SensorType::Ammonia, now).await,
            feed_kg: latest_of(knowledge, &farm, &zone, SensorType::FeedLevel, now).await,
            water_l: latest_of(knowledge, &farm, &zone, SensorType::WaterLevel, now).await,
            activity: latest_of(knowledge, &farm, &zone, SensorType::Activity, now).await,
        };

        let zone_status = build_status(&farm, &zone, latest, &config);

        let payload = match serde_json::to_vec(&zone_status) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(farm = %farm, zone = %zone, error = %err, "failed to serialize status");
                continue;
            }
        };
        if let Err(err) = publisher.publish(&topic::status_topic(&farm, &zone), payload).await {
            tracing::error!(farm = %farm, zone = %zone, error = %err, "failed to publish status");
        }

        let symptoms: &[(&str, bool)] = &[
            ("temp_ok", zone_status.temp_ok),
            ("co2_ok", zone_status.co2_ok),
            ("nh3_ok", zone_status.nh3_ok),
            ("feed_ok", zone_status.feed_ok),
            ("water_ok", zone_status.water_ok),
            ("activity_ok", zone_status.activity_ok),
        ];
        for (name, ok) in symptoms {
            let severity = if *ok { 0.0 } else { 1.0 };
            if let Err(err) = knowledge.log_symptom(&farm, &zone, name, severity, now).await {
                tracing::error!(farm = %farm, zone = %zone, symptom = name, error = %err, "knowledge write failed");
            }
        }
        if let Err(err) = knowledge.log_symptom(&farm, &zone, &zone_status.alert, 0.0, now).await {
            tracing::error!(farm = %farm, zone = %zone, error = %err, "knowledge write failed for alert symptom");
        }

        tracing::debug!(farm = %farm, zone = %zone, alert = %zone_status.alert, "status published");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    poultry_common::logging::init();

    let broker = env_or("MQTT_HOST", "127.0.0.1");
    let port: u16 = env_parse("MQTT_PORT", 1883);
    let topology_path = env_or("TOPOLOGY_PATH", "system_config.json");

    let client_id = format!("poultry-analyzer-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if let (Ok(user), Ok(pass)) = (env::var("MQTT_USER"), env::var("MQTT_PASS")) {
        mqtt_options.set_credentials(user, pass);
    }
    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);
    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                tracing::error!(error = %err, "mqtt connection error — retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });
    let publisher: Arc<dyn Publisher> = Arc::new(MqttPublisher(client));
    let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());

    let mut reload = HotReload::new(topology_path);
    let mut topology = Topology::default();

    loop {
        match reload.poll() {
            Ok(Some(fresh)) => topology = fresh,
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "topology poll failed, keeping prior state"),
        }
        let status_interval_s = topology
            .zone_keys()
            .first()
            .map(|(farm, zone)| topology.resolve(farm, zone).status_interval_s)
            .unwrap_or(5.0);

        run_cycle(&topology, publisher.as_ref(), knowledge.as_ref()).await;
        tokio::time::sleep(Duration::from_secs_f64(status_interval_s.max(0.1))).await;
    }
}
