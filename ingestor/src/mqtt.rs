use crate::errors::{Error, Result};
use crate::ingest::Ingestion;
use crate::metrics::{INVALID_REPORTS_TOTAL, REPORTS_TOTAL};
use crate::model::{Ack, RawReport};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, Publish, QoS};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const TOPIC_FILTER: &str = "telemetry/#";
const TOPIC_PREFIX: &str = "telemetry/";

/// Feeds MQTT publishes on `telemetry/#` through the same ingestion path as HTTP.
pub async fn run_mqtt(
    broker: String,
    port: u16,
    client_id: String,
    ingestion: Ingestion,
) -> Result<()> {
    info!("Connecting to MQTT broker at {}:{}", broker, port);

    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(std::time::Duration::from_secs(30));
    mqtt_options.set_clean_session(false);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10000);

    client
        .subscribe(TOPIC_FILTER, QoS::AtLeastOnce)
        .await
        .map_err(Error::Mqtt)?;

    info!("Subscribed to {} with QoS 1", TOPIC_FILTER);

    loop {
        match eventloop.poll().await {
            Ok(notification) => {
                if let Event::Incoming(Packet::Publish(publish)) = notification {
                    debug!(
                        "Received message on topic {}, size: {} bytes",
                        publish.topic,
                        publish.payload.len()
                    );

                    spawn_report(publish, ingestion.clone());
                }
            }
            Err(e) => {
                error!("MQTT error: {}", e);
                // rumqttc reconnects on the next poll
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Ingests a publish off the event loop, so a stalled store never holds up `poll()`.
/// Publishes carry no ordering; duplicates from the broker become duplicate rows.
fn spawn_report(publish: Publish, ingestion: Ingestion) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = process_message(&publish.topic, &publish.payload, &ingestion).await {
            warn!("Dropped MQTT report on {}: {}", publish.topic, e);
        }
    })
}

/// Parses one publish and ingests it. A report without `uid` takes it from the topic.
async fn process_message(topic: &str, payload: &[u8], ingestion: &Ingestion) -> Result<Ack> {
    let mut report = match serde_json::from_slice::<RawReport>(payload) {
        Ok(report) => report,
        Err(e) => {
            REPORTS_TOTAL.inc();
            INVALID_REPORTS_TOTAL.inc();
            return Err(Error::Validation(format!("JSON parse error: {}", e)));
        }
    };

    if matches!(report.uid, None | Some(Value::Null)) {
        report.uid = uid_from_topic(topic).map(|uid| Value::String(uid.to_string()));
    }

    ingestion.ingest(report).await
}

fn uid_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TOPIC_PREFIX)
        .filter(|uid| !uid.is_empty() && !uid.contains('/'))
}
