use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

/// Open-schema telemetry body, e.g. `{"temp": 60, "rpm": 1500}`.
pub type Payload = Map<String, Value>;

/// Primary key of a registered device in the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct DeviceId(pub i64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(DeviceId)
    }
}

/// Registered edge device. Created administratively; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub uid: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// One stored telemetry sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub device_id: DeviceId,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

/// Inbound report exactly as posted; nothing is trusted until validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawReport {
    #[serde(default)]
    pub uid: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A report that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidReport {
    pub uid: String,
    pub payload: Payload,
}

/// Acknowledgement returned for an accepted report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
    pub device: String,
}

impl Ack {
    pub fn received(uid: impl Into<String>) -> Self {
        Self {
            status: "received".to_string(),
            device: uid.into(),
        }
    }
}

/// Chart-ready window: oldest sample first, values aligned with `times`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub times: Vec<String>,
    #[serde(rename = "temps")]
    pub series: Vec<Number>,
}

/// Liveness view served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub uid: String,
    pub online: bool,
}
