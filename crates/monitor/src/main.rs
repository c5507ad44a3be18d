//! Monitor process: subscribes to every zone's sensor topics and writes
//! readings to Knowledge. No outbound publishing — translation only.

mod handler;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use poultry_common::topic;
use poultry_knowledge::InMemoryKnowledgeStore;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    poultry_common::logging::init();

    let broker = env_or("MQTT_HOST", "127.0.0.1");
    let port: u16 = env_parse("MQTT_PORT", 1883);

    let client_id = format!("poultry-monitor-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if let (Ok(user), Ok(pass)) = (env::var("MQTT_USER"), env::var("MQTT_PASS")) {
        mqtt_options.set_credentials(user, pass);
    }

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);
    let knowledge = Arc::new(InMemoryKnowledgeStore::new());

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("monitor connected to mqtt broker");
                if let Err(err) = client.subscribe(topic::SENSORS_WILDCARD, QoS::AtLeastOnce).await {
                    tracing::error!(error = %err, "failed to subscribe to {}", topic::SENSORS_WILDCARD);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some((farm, zone, group)) = topic::parse_sensors_topic(&publish.topic) else {
                    tracing::warn!(topic = %publish.topic, "unexpected topic structure on sensors subscription");
                    continue;
                };
                let now = time::OffsetDateTime::now_utc();
                let written = handler::handle_sensor_message(
                    knowledge.as_ref(),
                    &farm,
                    &zone,
                    group,
                    &publish.payload,
                    now,
                )
                .await;
                tracing::debug!(farm = %farm, zone = %zone, group, written, "sensor message processed");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "mqtt connection error — retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
