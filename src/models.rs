/// Reading and report types shared across the sampling and publishing pipeline

/// A single PM2.5/PM10 pair as reported by the particulate sensor
///
/// `valid` is the sensor's own verdict on the frame; invalid readings carry
/// zeroed values and must never reach an averaging window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticulateReading {
    pub pm25: f32,
    pub pm10: f32,
    pub valid: bool,
}

impl ParticulateReading {
    pub fn valid(pm25: f32, pm10: f32) -> Self {
        Self {
            pm25,
            pm10,
            valid: true,
        }
    }

    pub fn invalid() -> Self {
        Self {
            pm25: 0.0,
            pm10: 0.0,
            valid: false,
        }
    }
}

/// Raw climate sample straight from the sensor, before altitude correction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateSample {
    pub temperature: f32, // °C
    pub humidity: f32,    // %RH
    pub pressure: f32,    // Pa
}

/// Climate reading for one cycle, including sea-level pressure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub sea_level_pressure: f32,
}

/// Particulate window means for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticulateAverages {
    pub pm25: f32,
    pub pm10: f32,
    pub samples: usize,
}

/// Outcome summary of one completed cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub accepted: usize,
    pub rejected: usize,
    pub averages: Option<ParticulateAverages>,
    pub climate: Option<ClimateReading>,
    pub particulate_published: bool,
    pub time_series_written: bool,
    pub climate_published: bool,
}
