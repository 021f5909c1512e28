/// Wire encodings for the aggregator API (JSON) and the time-series database (line protocol)
use serde::Serialize;
use std::fmt::Write;

use crate::models::{ClimateReading, ParticulateAverages};

pub const MEASUREMENT: &str = "AirQuality";

/// Which sensor a push to the aggregator describes, sent as the `X-PIN` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Particulate,
    Climate,
}

impl PayloadKind {
    pub fn pin(&self) -> &'static str {
        match self {
            PayloadKind::Particulate => "1",
            PayloadKind::Climate => "11",
        }
    }
}

#[derive(Serialize)]
struct AggregatorPayload<'a> {
    software_version: &'a str,
    sensordatavalues: Vec<SensorDataValue>,
}

#[derive(Serialize)]
struct SensorDataValue {
    value_type: &'static str,
    value: String,
}

fn aggregator_json(
    software_version: &str,
    values: &[(&'static str, f32)],
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&AggregatorPayload {
        software_version,
        sensordatavalues: values
            .iter()
            .map(|&(value_type, value)| SensorDataValue {
                value_type,
                value: value.to_string(),
            })
            .collect(),
    })
}

/// P2 is PM2.5 and P1 is PM10 in the aggregator's vocabulary
pub fn particulate_json(
    software_version: &str,
    averages: &ParticulateAverages,
) -> Result<String, serde_json::Error> {
    aggregator_json(
        software_version,
        &[("P2", averages.pm25), ("P1", averages.pm10)],
    )
}

/// Pressure goes out in Pa, as read
pub fn climate_json(
    software_version: &str,
    climate: &ClimateReading,
) -> Result<String, serde_json::Error> {
    aggregator_json(
        software_version,
        &[
            ("temperature", climate.temperature),
            ("humidity", climate.humidity),
            ("pressure", climate.pressure),
        ],
    )
}

/// A single line-protocol point
#[derive(Debug, Clone)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, f32)>,
}

impl Point {
    pub fn new(measurement: &str) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }

    pub fn field(mut self, key: &str, value: f32) -> Self {
        self.fields.push((key.to_string(), value));
        self
    }

    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            let _ = write!(
                line,
                ",{}={}",
                escape(key, &[',', '=', ' ']),
                escape(value, &[',', '=', ' '])
            );
        }

        let fields = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape(key, &[',', '=', ' ']), value))
            .collect::<Vec<_>>()
            .join(",");
        line.push(' ');
        line.push_str(&fields);
        line
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build the cycle's time-series point; pressures are converted to hPa.
/// PM fields are left out when the cycle produced no particulate averages.
pub fn time_series_point(
    device_id: &str,
    climate: &ClimateReading,
    averages: Option<&ParticulateAverages>,
) -> Point {
    let mut point = Point::new(MEASUREMENT)
        .tag("device", device_id)
        .field("temperature", climate.temperature)
        .field("humidity", climate.humidity)
        .field("pressure", climate.pressure / 100.0)
        .field("relativepressure", climate.sea_level_pressure / 100.0);

    if let Some(avg) = averages {
        point = point.field("pm2_5", avg.pm25).field("pm10", avg.pm10);
    }
    point
}
