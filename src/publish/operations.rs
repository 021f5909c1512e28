/// Publishing encoded readings to the aggregator API and the time-series database
use log::debug;
use url::Url;

use crate::config::AgentConfig;
use crate::models::{ClimateReading, ParticulateAverages};
use crate::publish::encode::{climate_json, particulate_json, time_series_point, PayloadKind};
use crate::publish::transport::{Delivery, PublishError, Transport};

/// Pushes JSON documents to the crowd-sourced air-quality API
///
/// Every push carries `X-Sensor: <prefix>-<device id>` and an `X-PIN`
/// header telling the API which physical sensor the values came from.
pub struct AggregatorPublisher {
    endpoint: Url,
    sensor_header: String,
    software_version: String,
}

impl AggregatorPublisher {
    pub fn new(config: &AgentConfig, device_id: &str) -> Self {
        Self {
            endpoint: config.aggregator_url.clone(),
            sensor_header: format!("{}-{}", config.sensor_prefix, device_id),
            software_version: config.software_version.clone(),
        }
    }

    /// Push the cycle's particulate averages
    ///
    /// # Arguments
    /// * `transport` - Delivery channel for the request
    /// * `averages` - PM2.5/PM10 means, sent as `P2`/`P1` with `X-PIN: 1`
    ///
    /// # Returns
    /// Result indicating whether the API accepted the push
    pub async fn publish_particulate(
        &self,
        transport: &dyn Transport,
        averages: &ParticulateAverages,
    ) -> Result<(), PublishError> {
        let body = particulate_json(&self.software_version, averages)?;
        self.push(transport, PayloadKind::Particulate, body).await
    }

    pub async fn publish_climate(
        &self,
        transport: &dyn Transport,
        climate: &ClimateReading,
    ) -> Result<(), PublishError> {
        let body = climate_json(&self.software_version, climate)?;
        self.push(transport, PayloadKind::Climate, body).await
    }

    async fn push(
        &self,
        transport: &dyn Transport,
        kind: PayloadKind,
        body: String,
    ) -> Result<(), PublishError> {
        debug!("Aggregator push (pin {}): {}", kind.pin(), body);

        let delivery = Delivery::post(self.endpoint.clone(), body)
            .header("Content-Type", "application/json")
            .header("X-Sensor", self.sensor_header.as_str())
            .header("X-PIN", kind.pin());

        let response = transport.deliver(delivery).await?;
        debug!("Aggregator answered {}", response.status);
        Ok(())
    }
}

/// Writes line-protocol points to an InfluxDB v1 compatible endpoint
pub struct TimeSeriesPublisher {
    ping_url: Url,
    write_url: Url,
    device_id: String,
}

impl TimeSeriesPublisher {
    pub fn new(config: &AgentConfig, device_id: &str) -> Result<Self, PublishError> {
        // Url::join drops the last path segment unless it ends with '/'
        let mut base = config.influx_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let ping_url = base.join("ping")?;
        let mut write_url = base.join("write")?;
        {
            let mut query = write_url.query_pairs_mut();
            query.append_pair("db", &config.influx_database);
            if let Some(credentials) = &config.influx_credentials {
                query.append_pair("u", &credentials.user);
                query.append_pair("p", &credentials.password);
            }
        }

        Ok(Self {
            ping_url,
            write_url,
            device_id: device_id.to_string(),
        })
    }

    /// Validate the server with a ping, then write the cycle's point
    ///
    /// A failed ping skips the write and is reported like any write failure.
    ///
    /// # Arguments
    /// * `transport` - Delivery channel for both requests
    /// * `climate` - Climate reading, always written
    /// * `averages` - Particulate means; `pm2_5`/`pm10` fields are omitted when `None`
    ///
    /// # Returns
    /// Result of the ping, or of the write when the ping succeeded
    pub async fn write(
        &self,
        transport: &dyn Transport,
        climate: &ClimateReading,
        averages: Option<&ParticulateAverages>,
    ) -> Result<(), PublishError> {
        let line = time_series_point(&self.device_id, climate, averages).to_line_protocol();
        debug!("Writing: {}", line);

        transport.deliver(Delivery::get(self.ping_url.clone())).await?;

        let delivery = Delivery::post(self.write_url.clone(), line)
            .header("Content-Type", "text/plain; charset=utf-8");
        let response = transport.deliver(delivery).await?;
        debug!("Time-series database answered {}", response.status);
        Ok(())
    }
}
