use log::info;
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_AGGREGATOR_URL: &str = "https://api.sensor.community/v1/push-sensor-data/";

const MAX_ALTITUDE_M: f32 = 44330.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("{key} is not a valid URL: {source}")]
    Url {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone)]
pub struct InfluxCredentials {
    pub user: String,
    pub password: String,
}

/// Agent configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Scheduler tick period
    pub publish_interval: Duration,
    /// How often the idle main loop checks the due flag
    pub poll_interval: Duration,
    /// Valid particulate samples averaged per cycle
    pub sample_count: usize,
    /// Cap on invalid particulate reads per cycle, `None` retries forever
    pub max_invalid_reads: Option<u32>,
    /// Site altitude in metres for sea-level pressure
    pub altitude_m: f32,
    /// Per-request timeout for both sinks
    pub http_timeout: Duration,
    /// Pause between the time-series write and the climate aggregator push
    pub climate_publish_delay: Duration,
    pub aggregator_url: Url,
    pub software_version: String,
    /// Prefix of the `X-Sensor` header, e.g. `esp8266` or `raspi`
    pub sensor_prefix: String,
    pub influx_url: Url,
    pub influx_database: String,
    pub influx_credentials: Option<InfluxCredentials>,
    /// Overrides the hardware-derived device identity
    pub device_id: Option<String>,
    pub sds011_port: String,
    pub bme280_path: String,
    /// sysfs LED name under /sys/class/leds
    pub status_led: Option<String>,
    /// Interface whose operstate decides whether the link is up
    pub network_interface: String,
    /// Saved NetworkManager profile to bring up when the link drops
    pub wifi_connection: Option<String>,
}

impl AgentConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        let config = Self::from_lookup(|key| env::var(key).ok())?;
        info!(
            "Configuration loaded: interval={}s, samples={}, altitude={}m, interface={}",
            config.publish_interval.as_secs(),
            config.sample_count,
            config.altitude_m,
            config.network_interface
        );
        Ok(config)
    }

    /// Build the configuration from an arbitrary variable source
    ///
    /// # Arguments
    /// * `lookup` - Returns the raw value of a variable, `None` when unset
    ///
    /// # Returns
    /// The validated configuration, or the first missing or out-of-range variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let sample_count: usize = non_zero(&get, "PM_SAMPLE_COUNT", 25)?;
        let publish_interval = Duration::from_secs(non_zero(&get, "PUBLISH_INTERVAL_SECS", 270)?);
        let http_timeout = Duration::from_secs(non_zero(&get, "HTTP_TIMEOUT_SECS", 20)?);

        // sea-level correction divides by (1 - alt/44330)^5.255
        let altitude_m: f32 = parse_or(&get, "SITE_ALTITUDE_M", 17.0)?;
        if !altitude_m.is_finite() || altitude_m >= MAX_ALTITUDE_M {
            return Err(ConfigError::Invalid {
                key: "SITE_ALTITUDE_M",
                value: altitude_m.to_string(),
            });
        }

        let max_invalid_reads = match get("PM_MAX_INVALID_READS") {
            Some(v) => Some(parse_value("PM_MAX_INVALID_READS", &v)?),
            None => None,
        };

        let influx_url = get("INFLUXDB_URL").ok_or(ConfigError::Missing("INFLUXDB_URL"))?;
        let influx_database =
            get("INFLUXDB_DATABASE").ok_or(ConfigError::Missing("INFLUXDB_DATABASE"))?;

        let influx_credentials = match (get("INFLUXDB_USER"), get("INFLUXDB_PASSWORD")) {
            (Some(user), Some(password)) => Some(InfluxCredentials { user, password }),
            _ => None,
        };

        Ok(AgentConfig {
            publish_interval,
            poll_interval: Duration::from_millis(parse_or(&get, "LOOP_POLL_MS", 500)?),
            sample_count,
            max_invalid_reads,
            altitude_m,
            http_timeout,
            climate_publish_delay: Duration::from_millis(parse_or(
                &get,
                "CLIMATE_PUBLISH_DELAY_MS",
                1000,
            )?),
            aggregator_url: parse_url(
                "AGGREGATOR_URL",
                &get("AGGREGATOR_URL").unwrap_or_else(|| DEFAULT_AGGREGATOR_URL.to_string()),
            )?,
            software_version: get("SOFTWARE_VERSION")
                .unwrap_or_else(|| "custom-hardware".to_string()),
            sensor_prefix: get("SENSOR_PREFIX").unwrap_or_else(|| "esp8266".to_string()),
            influx_url: parse_url("INFLUXDB_URL", &influx_url)?,
            influx_database,
            influx_credentials,
            device_id: get("DEVICE_ID"),
            sds011_port: get("SDS011_PORT").unwrap_or_else(|| "/dev/ttyUSB0".to_string()),
            bme280_path: get("BME280_IIO_PATH")
                .unwrap_or_else(|| "/sys/bus/iio/devices/iio:device0".to_string()),
            status_led: get("STATUS_LED"),
            network_interface: get("NETWORK_INTERFACE").unwrap_or_else(|| "wlan0".to_string()),
            wifi_connection: get("WIFI_CONNECTION"),
        })
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&'static str) -> Option<String>,
{
    match get(key) {
        Some(v) => parse_value(key, &v),
        None => Ok(default),
    }
}

fn non_zero<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
    G: Fn(&'static str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: get(key).unwrap_or_default(),
        });
    }
    Ok(value)
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::Url { key, source })
}
