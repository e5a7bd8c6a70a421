use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fields read from the simulated PLC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temp: f64,
    pub rpm: u32,
    pub voltage: f64,
    /// Set when the simulated vision check flags a fire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm: Option<String>,
}

/// Wire format expected by the ingestor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub uid: String,
    pub data: Reading,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn read_plc(rng: &mut impl Rng, alarm_probability: f64) -> Reading {
    let alarm = rng
        .gen_bool(alarm_probability.clamp(0.0, 1.0))
        .then(|| "fire_detected".to_string());

    Reading {
        temp: round_to(60.0 + rng.gen_range(-5.0..=5.0), 2),
        rpm: rng.gen_range(1000..=3000),
        voltage: round_to(220.0 + rng.gen_range(-2.0..=2.0), 1),
        alarm,
    }
}
