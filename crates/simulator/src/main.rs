//! Simulator + Supervisor process: runs the physically-based barn model for
//! every zone in the topology file and re-reads that file on an interval to
//! pick up added/removed zones. Grounded on `crates/node/src/main.rs`'s
//! env-config-then-MQTT-wiring shape, generalized from one sensor node to a
//! supervisor owning many.

mod model;
mod noise;
mod supervisor;
mod worker;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use poultry_common::bus::MqttPublisher;
use poultry_common::model::{ActuatorCommand, ActuatorType};
use poultry_common::topic;
use poultry_knowledge::InMemoryKnowledgeStore;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};

use crate::supervisor::Supervisor;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn actuator_from_str(s: &str) -> Option<ActuatorType> {
    match s {
        "fan" => Some(ActuatorType::Fan),
        "heater" => Some(ActuatorType::Heater),
        "inlet" => Some(ActuatorType::Inlet),
        "feed_dispenser" => Some(ActuatorType::FeedDispenser),
        "water_valve" => Some(ActuatorType::WaterValve),
        "light" => Some(ActuatorType::Light),
        _ => None,
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    poultry_common::logging::init();

    let broker = env_or("MQTT_HOST", "127.0.0.1");
    let port: u16 = env_parse("MQTT_PORT", 1883);
    let topology_path = env_or("TOPOLOGY_PATH", "system_config.json");
    let dt_s: f64 = env_parse("SIM_DT_S", 1.0);

    let client_id = format!("poultry-simulator-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if let (Ok(user), Ok(pass)) = (env::var("MQTT_USER"), env::var("MQTT_PASS")) {
        mqtt_options.set_credentials(user, pass);
    }

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);
    let publisher = Arc::new(MqttPublisher(client.clone()));
    let knowledge = Arc::new(InMemoryKnowledgeStore::new());

    let supervisor = Arc::new(Supervisor::new(topology_path, publisher, knowledge, dt_s));

    let dispatch_supervisor = Arc::clone(&supervisor);
    let dispatch_client = client.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("simulator connected to mqtt broker");
                    if let Err(err) = dispatch_client.subscribe(topic::CMD_WILDCARD, QoS::AtLeastOnce).await {
                        tracing::error!(error = %err, "failed to subscribe to {}", topic::CMD_WILDCARD);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Some((farm, zone, actuator)) = topic::parse_cmd_topic(&publish.topic) {
                        let Some(actuator_type) = actuator_from_str(actuator) else {
                            tracing::debug!(actuator, "unknown actuator in cmd topic — ignoring");
                            continue;
                        };
                        let command = match ActuatorCommand::decode_for(actuator_type, &publish.payload) {
                            Ok(command) => command,
                            Err(err) => {
                                tracing::warn!(error = %err, topic = %publish.topic, "invalid command payload");
                                continue;
                            }
                        };
                        if let Some(worker) = dispatch_supervisor.worker(&farm, &zone).await {
                            worker.apply_command(actuator_type, &command).await;
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = %err, "mqtt connection error — retrying");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    supervisor.run().await
}
