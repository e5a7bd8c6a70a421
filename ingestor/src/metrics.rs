use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref REPORTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_reports_total",
        "Total telemetry reports received over HTTP and MQTT"
    ))
    .unwrap();
    pub static ref ACCEPTED_REPORTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_accepted_reports_total",
        "Total reports durably stored and acknowledged"
    ))
    .unwrap();
    pub static ref INVALID_REPORTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_invalid_reports_total",
        "Total reports rejected by validation"
    ))
    .unwrap();
    pub static ref UNREGISTERED_REPORTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_unregistered_reports_total",
        "Total reports from uids missing in the device registry"
    ))
    .unwrap();
    pub static ref IDENTITY_CACHE_HITS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_identity_cache_hits_total",
        "Identity resolutions served from the expiring cache"
    ))
    .unwrap();
    pub static ref IDENTITY_CACHE_MISSES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_identity_cache_misses_total",
        "Identity resolutions that fell through to the registry"
    ))
    .unwrap();
    pub static ref LIVENESS_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_liveness_failures_total",
        "Liveness marker writes that failed"
    ))
    .unwrap();
    pub static ref STORE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_store_failures_total",
        "Durable store reads or writes that failed or timed out"
    ))
    .unwrap();
    pub static ref CHART_QUERIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_chart_queries_total",
        "Window queries served to the dashboard"
    ))
    .unwrap();
    pub static ref APPEND_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "ingestor_append_latency_seconds",
            "Time taken to append one reading to the telemetry store"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(REPORTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACCEPTED_REPORTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INVALID_REPORTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UNREGISTERED_REPORTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(IDENTITY_CACHE_HITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(IDENTITY_CACHE_MISSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LIVENESS_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHART_QUERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(APPEND_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
