mod telemetry;

use clap::{Parser, ValueEnum};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::{Duration, Instant};
use telemetry::{read_plc, Report};
use tracing::{error, info, warn};

/// Edge gateway simulator: posts one report per interval, forever.
#[derive(Debug, Parser)]
#[command(name = "simulator", version)]
struct Args {
    /// Ingestion endpoint for the HTTP transport
    #[arg(long, env = "SERVER_URL", default_value = "http://127.0.0.1:8080/api/v1/telemetry/")]
    server_url: String,

    /// Registered device uid to report as
    #[arg(long, env = "DEVICE_UID", default_value = "SIM001")]
    uid: String,

    #[arg(long, env = "INTERVAL_MS", default_value_t = 2000)]
    interval_ms: u64,

    #[arg(long, env = "TRANSPORT", value_enum, default_value_t = Transport::Http)]
    transport: Transport,

    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    port: u16,

    /// Chance per tick of attaching a fire alarm flag
    #[arg(long, env = "ALARM_PROBABILITY", default_value_t = 0.05, value_parser = parse_probability)]
    alarm_probability: f64,
}

fn parse_probability(raw: &str) -> Result<f64, String> {
    let p: f64 = raw.parse().map_err(|e| format!("{}", e))?;
    if !(0.0..=1.0).contains(&p) {
        return Err(format!("{} is not a probability in [0, 1]", raw));
    }
    Ok(p)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Http,
    Mqtt,
}

const HTTP_TIMEOUT: Duration = Duration::from_secs(2);

enum Sink {
    Http(ureq::Agent),
    Mqtt(AsyncClient),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting edge gateway simulator | device: {}", args.uid);

    let sink = match args.transport {
        Transport::Http => {
            info!("Posting to {}", args.server_url);
            Sink::Http(ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build())
        }
        Transport::Mqtt => {
            info!("Publishing to {}:{}", args.broker, args.port);
            Sink::Mqtt(connect_mqtt(&args.broker, args.port).await)
        }
    };

    let interval = Duration::from_millis(args.interval_ms.max(1));
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Simulator stopped");
                return;
            }
        }

        let reading = read_plc(&mut rand::thread_rng(), args.alarm_probability);
        if reading.alarm.is_some() {
            warn!("Vision check flagged a fire hazard");
        }
        let report = Report {
            uid: args.uid.clone(),
            data: reading,
        };

        // Failures are transient: log and try again on the next tick.
        match &sink {
            Sink::Http(agent) => post_http(agent.clone(), args.server_url.clone(), report).await,
            Sink::Mqtt(client) => publish_mqtt(client, report).await,
        }
    }
}

async fn post_http(agent: ureq::Agent, url: String, report: Report) {
    let start = Instant::now();
    let data = report.data.clone();

    let result = tokio::task::spawn_blocking(move || agent.post(&url).send_json(&report)).await;

    match result {
        Ok(Ok(response)) => {
            info!(
                "Uploaded in {:.0}ms (HTTP {}) | {:?}",
                start.elapsed().as_secs_f64() * 1000.0,
                response.status(),
                data
            );
        }
        Ok(Err(ureq::Error::Status(code, response))) => {
            let body = response.into_string().unwrap_or_default();
            warn!("Server rejected report: {} {}", code, body);
        }
        Ok(Err(ureq::Error::Transport(e))) => {
            warn!("Could not reach server: {}", e);
        }
        Err(e) => {
            error!("HTTP task failed: {}", e);
        }
    }
}

async fn connect_mqtt(broker: &str, port: u16) -> AsyncClient {
    let client_id = format!("sim-{}", uuid::Uuid::new_v4());
    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!("MQTT eventloop error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    client
}

async fn publish_mqtt(client: &AsyncClient, report: Report) {
    let topic = format!("telemetry/{}", report.uid);
    let payload = match serde_json::to_vec(&report) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to serialize report: {}", e);
            return;
        }
    };

    match client.publish(&topic, QoS::AtLeastOnce, false, payload).await {
        Ok(()) => info!("Published to {} | {:?}", topic, report.data),
        Err(e) => warn!("Failed to publish: {}", e),
    }
}
