//! Executor process: cold-boots every zone's actuators to an explicit OFF
//! state, then on each incoming plan publishes each action verbatim to
//! `{farm}/{zone}/cmd/{actuator}` and archives it to Knowledge. Grounded on
//! `executor/executor_service.py`'s `start_executor` and its translation
//! table for the archived `state_str`.

mod translate;

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use poultry_common::bus::{MqttPublisher, Publisher};
use poultry_common::model::{ActuatorCommand, ActuatorType, FarmId, Plan, ZoneId};
use poultry_common::topic;
use poultry_knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};

use crate::translate::describe_command;

const ALL_ACTUATORS: [ActuatorType; 6] = [
    ActuatorType::Fan,
    ActuatorType::Heater,
    ActuatorType::Inlet,
    ActuatorType::FeedDispenser,
    ActuatorType::WaterValve,
    ActuatorType::Light,
];

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// The cold-boot safe state for every actuator: fully off.
fn all_off_command(actuator: ActuatorType) -> ActuatorCommand {
    match actuator {
        ActuatorType::Fan => ActuatorCommand::fan_set(0),
        ActuatorType::Heater => ActuatorCommand::heater_set(0),
        ActuatorType::Inlet => ActuatorCommand::inlet_set(0),
        ActuatorType::Light => ActuatorCommand::light_set(0),
        ActuatorType::FeedDispenser => ActuatorCommand::on_off(ActuatorType::FeedDispenser, false),
        ActuatorType::WaterValve => ActuatorCommand::on_off(ActuatorType::WaterValve, false),
    }
}

async fn execute_action(
    farm: &FarmId,
    zone: &ZoneId,
    actuator: ActuatorType,
    command: &ActuatorCommand,
    at: time::OffsetDateTime,
    publisher: &dyn Publisher,
    knowledge: &dyn KnowledgeStore,
) {
    let payload = match serde_json::to_vec(command) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(farm = %farm, zone = %zone, actuator = actuator.as_str(), error = %err, "failed to serialize command");
            return;
        }
    };
    if let Err(err) = publisher
        .publish(&topic::cmd_topic(farm, zone, actuator.as_str()), payload)
        .await
    {
        tracing::error!(farm = %farm, zone = %zone, actuator = actuator.as_str(), error = %err, "failed to publish command");
    }
    if let Err(err) = knowledge.log_actuator_command(farm, zone, actuator, command, at).await {
        tracing::error!(farm = %farm, zone = %zone, actuator = actuator.as_str(), error = %err, "knowledge write failed for command");
    }
    tracing::info!(
        farm = %farm,
        zone = %zone,
        actuator = actuator.as_str(),
        state = %describe_command(actuator, command),
        "command executed"
    );
}

async fn cold_boot(topology_path: &str, publisher: &dyn Publisher, knowledge: &dyn KnowledgeStore) {
    let topology = match poultry_config::load(Path::new(topology_path)) {
        Ok(topology) => topology,
        Err(err) => {
            tracing::warn!(error = %err, "topology unreadable at startup, skipping cold-boot sweep");
            return;
        }
    };
    let now = time::OffsetDateTime::now_utc();
    for (farm_str, zone_str) in topology.zone_keys() {
        let farm = FarmId::from(farm_str.as_str());
        let zone = ZoneId::from(zone_str.as_str());
        for &actuator in ALL_ACTUATORS.iter() {
            let command = all_off_command(actuator);
            execute_action(&farm, &zone, actuator, &command, now, publisher, knowledge).await;
        }
    }
}

async fn handle_plan(topic: &str, payload: &[u8], publisher: &dyn Publisher, knowledge: &dyn KnowledgeStore) {
    let plan: Plan = match serde_json::from_slice(payload) {
        Ok(plan) => plan,
        Err(err) => {
            tracing::warn!(topic, error = %err, "malformed plan payload, dropping");
            return;
        }
    };
    let (farm, zone) = topic::parse_plan_topic(topic).unwrap_or_else(|| (plan.farm_id.clone(), plan.zone.clone()));
    let now = time::OffsetDateTime::now_utc();
    for action in &plan.actions {
        execute_action(&farm, &zone, action.actuator, &action.command, now, publisher, knowledge).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    poultry_common::logging::init();

    let broker = env_or("MQTT_HOST", "127.0.0.1");
    let port: u16 = env_parse("MQTT_PORT", 1883);
    let topology_path = env_or("TOPOLOGY_PATH", "system_config.json");

    let client_id = format!("poultry-executor-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if let (Ok(user), Ok(pass)) = (env::var("MQTT_USER"), env::var("MQTT_PASS")) {
        mqtt_options.set_credentials(user, pass);
    }
    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);
    let subscribe_client = client.clone();

    let publisher: Arc<dyn Publisher> = Arc::new(MqttPublisher(client));
    let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());

    cold_boot(&topology_path, publisher.as_ref(), knowledge.as_ref()).await;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("executor connected to mqtt broker");
                if let Err(err) = subscribe_client.subscribe(topic::PLAN_WILDCARD, QoS::AtLeastOnce).await {
                    tracing::error!(error = %err, "failed to subscribe to {}", topic::PLAN_WILDCARD);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_plan(&publish.topic, &publish.payload, publisher.as_ref(), knowledge.as_ref()).await;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "mqtt connection error — retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poultry_common::bus::InMemoryBus;

    #[tokio::test]
    async fn handle_plan_publishes_and_archives_every_action() {
        let bus = InMemoryBus::new();
        let mut rx = bus.subscribe();
        let knowledge = InMemoryKnowledgeStore::new();

        let plan = Plan {
            farm_id: FarmId::from("farm-a"),
            zone: ZoneId::from("zone-1"),
            actions: vec![poultry_common::model::Action {
                actuator: ActuatorType::Fan,
                priority: poultry_common::model::priority::FAN,
                command: ActuatorCommand::fan_set(60),
            }],
        };
        let payload = serde_json::to_vec(&plan).unwrap();
        handle_plan("farm-a/zone-1/plan", &payload, &bus, &knowledge).await;

        let (topic, published) = rx.recv().await.unwrap();
        assert_eq!(topic, "farm-a/zone-1/cmd/fan");
        let command = ActuatorCommand::decode_for(ActuatorType::Fan, &published).unwrap();
        assert_eq!(command, ActuatorCommand::fan_set(60));

        let history = knowledge
            .sensor_history(&FarmId::from("farm-a"), &ZoneId::from("zone-1"), poultry_common::model::SensorType::Temperature, 10)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn malformed_plan_payload_is_dropped_without_panicking() {
        let bus = InMemoryBus::new();
        let knowledge = InMemoryKnowledgeStore::new();
        handle_plan("farm-a/zone-1/plan", b"not json", &bus, &knowledge).await;
    }

    #[tokio::test]
    async fn topic_farm_zone_takes_precedence_over_payload() {
        let bus = InMemoryBus::new();
        let mut rx = bus.subscribe();
        let knowledge = InMemoryKnowledgeStore::new();

        let plan = Plan {
            farm_id: FarmId::from("payload-farm"),
            zone: ZoneId::from("payload-zone"),
            actions: vec![poultry_common::model::Action {
                actuator: ActuatorType::Light,
                priority: poultry_common::model::priority::LIGHT,
                command: ActuatorCommand::light_set(10),
            }],
        };
        let payload = serde_json::to_vec(&plan).unwrap();
        handle_plan("topic-farm/topic-zone/plan", &payload, &bus, &knowledge).await;

        let (topic, _) = rx.recv().await.unwrap();
        assert_eq!(topic, "topic-farm/topic-zone/cmd/light");
    }
}
