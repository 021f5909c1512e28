/// BME280 climate sensor read through the Linux IIO driver (bmp280 module)
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{ClimateSensor, SensorError};
use crate::models::ClimateSample;

const TEMPERATURE_FILE: &str = "in_temp_input"; // milli °C
const HUMIDITY_FILE: &str = "in_humidityrelative_input"; // milli %RH
const PRESSURE_FILE: &str = "in_pressure_input"; // kPa

pub struct IioBme280 {
    device_dir: PathBuf,
}

impl IioBme280 {
    pub fn new<P: AsRef<Path>>(device_dir: P) -> Self {
        Self {
            device_dir: device_dir.as_ref().to_path_buf(),
        }
    }

    async fn read_channel(&self, file: &str) -> Result<f32, SensorError> {
        let path = self.device_dir.join(file);
        let raw = tokio::fs::read_to_string(&path).await?;
        parse_channel(&path.display().to_string(), &raw)
    }
}

/// Parse one IIO attribute value
pub fn parse_channel(source_name: &str, raw: &str) -> Result<f32, SensorError> {
    raw.trim().parse::<f32>().map_err(|_| SensorError::Parse {
        source_name: source_name.to_string(),
        value: raw.trim().to_string(),
    })
}

#[async_trait]
impl ClimateSensor for IioBme280 {
    async fn read(&mut self) -> Result<ClimateSample, SensorError> {
        // Each attribute read triggers a fresh conversion in the driver
        let temperature = self.read_channel(TEMPERATURE_FILE).await? / 1000.0;
        let humidity = self.read_channel(HUMIDITY_FILE).await? / 1000.0;
        let pressure = self.read_channel(PRESSURE_FILE).await? * 1000.0;

        Ok(ClimateSample {
            temperature,
            humidity,
            pressure,
        })
    }
}
