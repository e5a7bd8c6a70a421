use crate::errors::{Error, Result, StoreError};
use crate::identity::IdentityCache;
use crate::metrics::{CHART_QUERIES_TOTAL, STORE_FAILURES_TOTAL};
use crate::model::{ChartData, Payload, Reading};
use crate::store::TelemetryStore;
use serde_json::{Number, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::error;

/// Label format for the chart's x axis.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Recent-window reads for the dashboard chart.
#[derive(Clone)]
pub struct WindowQuery {
    identity: IdentityCache,
    telemetry: Arc<dyn TelemetryStore>,
    field: String,
    store_timeout: Duration,
}

impl WindowQuery {
    pub fn new(
        identity: IdentityCache,
        telemetry: Arc<dyn TelemetryStore>,
        field: impl Into<String>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            telemetry,
            field: field.into(),
            store_timeout,
        }
    }

    /// Oldest-to-newest series of the configured field over the last `limit` readings.
    /// Unknown uids yield empty data, not an error.
    pub async fn chart_data(&self, uid: &str, limit: usize) -> Result<ChartData> {
        CHART_QUERIES_TOTAL.inc();

        let device_id = match self.identity.resolve(uid).await {
            Ok(Some(id)) => id,
            Ok(None) => return Ok(ChartData::default()),
            Err(e) => return Err(self.read_failure(uid, e)),
        };

        if limit == 0 {
            return Ok(ChartData::default());
        }

        let window = timeout(self.store_timeout, self.telemetry.recent_window(device_id, limit))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.store_timeout)))
            .map_err(|e| self.read_failure(uid, e))?;

        Ok(chronological(window, limit, &self.field))
    }

    fn read_failure(&self, uid: &str, e: StoreError) -> Error {
        STORE_FAILURES_TOTAL.inc();
        error!(uid, "Window query failed: {}", e);
        Error::StoreRead(e)
    }
}

/// Turns a newest-first window into chart order.
fn chronological(mut window: Vec<Reading>, limit: usize, field: &str) -> ChartData {
    window.truncate(limit);
    window.reverse();

    let times = window
        .iter()
        .map(|r| r.timestamp.format(TIME_FORMAT).to_string())
        .collect();
    let series = window.iter().map(|r| field_value(&r.payload, field)).collect();

    ChartData { times, series }
}

/// Numeric value of `field`, or 0 when missing or not numeric.
pub fn field_value(payload: &Payload, field: &str) -> Number {
    match payload.get(field) {
        Some(Value::Number(n)) => n.clone(),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .unwrap_or_else(|| Number::from(0)),
        _ => Number::from(0),
    }
}
