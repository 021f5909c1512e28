pub mod bme280;
pub mod sds011;

pub use bme280::IioBme280;
pub use sds011::Sds011;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ClimateReading, ClimateSample, ParticulateReading};

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("sensor did not answer in time")]
    Timeout,

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("unparsable value '{value}' in {source_name}")]
    Parse { source_name: String, value: String },
}

/// Particulate matter sensor with explicit power control
#[async_trait]
pub trait ParticulateSensor: Send {
    /// Power up the fan and laser; harmless if already awake
    async fn wake(&mut self) -> Result<(), SensorError>;

    async fn sleep(&mut self) -> Result<(), SensorError>;

    /// Ask for one measurement. Transport problems come back as an invalid reading.
    async fn query_reading(&mut self) -> ParticulateReading;
}

/// Temperature/humidity/pressure sensor
#[async_trait]
pub trait ClimateSensor: Send {
    async fn read(&mut self) -> Result<ClimateSample, SensorError>;

    fn sea_level_pressure(&self, pressure: f32, altitude_m: f32) -> f32 {
        sea_level_pressure(pressure, altitude_m)
    }
}

/// Barometric formula: station pressure (Pa) reduced to sea level for a given altitude (m)
pub fn sea_level_pressure(pressure: f32, altitude_m: f32) -> f32 {
    pressure / (1.0 - altitude_m / 44330.0).powf(5.255)
}

/// Single-shot climate read with the altitude correction applied
pub async fn read_climate(
    sensor: &mut dyn ClimateSensor,
    altitude_m: f32,
) -> Result<ClimateReading, SensorError> {
    let sample = sensor.read().await?;
    Ok(ClimateReading {
        temperature: sample.temperature,
        humidity: sample.humidity,
        pressure: sample.pressure,
        sea_level_pressure: sensor.sea_level_pressure(sample.pressure, altitude_m),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Journal, MockClimate};

    #[test]
    fn sea_level_pressure_at_zero_altitude_is_unchanged() {
        assert_eq!(sea_level_pressure(101325.0, 0.0), 101325.0);
    }

    #[test]
    fn sea_level_pressure_rises_with_altitude() {
        // roughly 12 Pa per metre near sea level
        let corrected = sea_level_pressure(100000.0, 17.0);
        assert!(corrected > 100190.0 && corrected < 100220.0, "{}", corrected);
    }

    #[tokio::test]
    async fn read_climate_applies_altitude() {
        let journal = Journal::default();
        let mut sensor = MockClimate::new(&journal, 21.5, 48.2, 101325.0);
        let reading = read_climate(&mut sensor, 17.0).await.unwrap();
        assert_eq!(reading.temperature, 21.5);
        assert_eq!(reading.humidity, 48.2);
        assert_eq!(reading.pressure, 101325.0);
        assert_eq!(reading.sea_level_pressure, sea_level_pressure(101325.0, 17.0));
        assert_eq!(journal.entries(), vec!["climate:read"]);
    }
}
