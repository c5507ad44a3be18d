//! Planner process: on each `{farm}/{zone}/status` message, resolves that
//! zone's config, runs it through the status-driven control law with a
//! per-zone [`ZoneControlState`], publishes the resulting `Plan`, and logs it
//! to Knowledge. Grounded on `planner/planner_service.py`'s `start_planner`.

mod control_law;
mod starvation;
mod state;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use poultry_common::bus::{MqttPublisher, Publisher};
use poultry_common::model::{FarmId, Plan, ZoneId, ZoneStatus};
use poultry_common::topic;
use poultry_config::{HotReload, Topology};
use poultry_knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::Mutex;

use crate::control_law::build_actions_from_status;
use crate::state::ZoneControlState;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn hour_of_day(now: time::OffsetDateTime) -> f64 {
    now.hour() as f64 + now.minute() as f64 / 60.0
}

async fn handle_status(
    farm: FarmId,
    zone: ZoneId,
    payload: &[u8],
    topology: &Topology,
    states: &Mutex<HashMap<(FarmId, ZoneId), ZoneControlState>>,
    publisher: &dyn Publisher,
    knowledge: &dyn KnowledgeStore,
) {
    let status: ZoneStatus = match serde_json::from_slice(payload) {
        Ok(status) => status,
        Err(err) => {
            tracing::warn!(farm = %farm, zone = %zone, error = %err, "malformed status payload, dropping");
            return;
        }
    };

    let config = topology.resolve(farm.as_str(), zone.as_str());
    let now_wall = time::OffsetDateTime::now_utc();
    let now = now_wall.unix_timestamp() as f64;
    let time_of_day_h = hour_of_day(now_wall);

    let actions = {
        let mut states = states.lock().await;
        let state = states.entry((farm.clone(), zone.clone())).or_default();
        build_actions_from_status(state, &status, &config, now, time_of_day_h)
    };

    let plan = Plan {
        farm_id: farm.clone(),
        zone: zone.clone(),
        actions,
    };

    let commands: Vec<_> = plan.actions.iter().map(|a| a.command.clone()).collect();
    if let Err(err) = knowledge.log_plan(&farm, &zone, &commands, now_wall).await {
        tracing::error!(farm = %farm, zone = %zone, error = %err, "knowledge write failed for plan");
    }

    let payload = match serde_json::to_vec(&plan) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(farm = %farm, zone = %zone, error = %err, "failed to serialize plan");
            return;
        }
    };
    if let Err(err) = publisher.publish(&topic::plan_topic(&farm, &zone), payload).await {
        tracing::error!(farm = %farm, zone = %zone, error = %err, "failed to publish plan");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    poultry_common::logging::init();

    let broker = env_or("MQTT_HOST", "127.0.0.1");
    let port: u16 = env_parse("MQTT_PORT", 1883);
    let topology_path = env_or("TOPOLOGY_PATH", "system_config.json");

    let client_id = format!("poultry-planner-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if let (Ok(user), Ok(pass)) = (env::var("MQTT_USER"), env::var("MQTT_PASS")) {
        mqtt_options.set_credentials(user, pass);
    }
    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);
    let subscribe_client = client.clone();

    let publisher: Arc<dyn Publisher> = Arc::new(MqttPublisher(client));
    let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());
    let states: Arc<Mutex<HashMap<(FarmId, ZoneId), ZoneControlState>>> = Arc::new(Mutex::new(HashMap::new()));

    let mut reload = HotReload::new(topology_path);
    let topology: Arc<Mutex<Topology>> = Arc::new(Mutex::new(Topology::default()));
    {
        let topology = topology.clone();
        tokio::spawn(async move {
            loop {
                match reload.poll() {
                    Ok(Some(fresh)) => *topology.lock().await = fresh,
                    Ok(None) => {}
                    Err(err) => tracing::warn!(error = %err, "topology poll failed, keeping prior state"),
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        });
    }

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("planner connected to mqtt broker");
                if let Err(err) = subscribe_client.subscribe(topic::STATUS_WILDCARD, QoS::AtLeastOnce).await {
                    tracing::error!(error = %err, "failed to subscribe to {}", topic::STATUS_WILDCARD);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match topic::parse_status_topic(&publish.topic) {
                    Some((farm, zone)) => {
                        let topology = topology.lock().await.clone();
                        handle_status(
                            farm,
                            zone,
                            &publish.payload,
                            &topology,
                            states.as_ref(),
                            publisher.as_ref(),
                            knowledge.as_ref(),
                        )
                        .await;
                    }
                    None => tracing::debug!(topic = %publish.topic, "ignoring non-status topic"),
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "mqtt connection error — retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
