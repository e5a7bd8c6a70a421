use ingestor::cache::RedisStore;
use ingestor::config::Config;
use ingestor::db::{self, PgStore};
use ingestor::{build_state, metrics, mqtt, rest};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting IoT Ingestor");
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.redacted_database_url());
    info!(
        "Identity TTL: {:?}, liveness TTL: {:?}",
        config.identity_ttl, config.liveness_ttl
    );

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
        std::process::exit(1);
    }

    let pool = match db::make_pool(&config.database_url, config.db_max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let kv = match RedisStore::connect(&config.redis_url).await {
        Ok(kv) => kv,
        Err(e) => {
            error!("Failed to connect to Redis: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(PgStore::new(pool));
    let state = build_state(&config, Arc::new(kv), store.clone(), store);

    let mqtt_handle = match config.mqtt_broker.clone() {
        Some(broker) => {
            info!("MQTT broker: {}:{}", broker, config.mqtt_port);
            let client_id = format!("ingestor-{}", uuid::Uuid::new_v4());
            let ingestion = state.ingestion.clone();
            let port = config.mqtt_port;
            Some(tokio::spawn(async move {
                if let Err(e) = mqtt::run_mqtt(broker, port, client_id, ingestion).await {
                    error!("MQTT task failed: {}", e);
                }
            }))
        }
        None => {
            info!("MQTT_BROKER not set, MQTT bridge disabled");
            None
        }
    };

    let app = rest::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    let mqtt_done = async {
        match mqtt_handle {
            Some(handle) => {
                let _ = handle.await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = mqtt_done => {
            error!("MQTT task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}
