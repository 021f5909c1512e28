/// Sampling-and-publish cycle controller
///
/// One cycle: wake and warm up the particulate sensor, collect the averaging
/// windows, put the sensor to sleep, push particulate averages to the
/// aggregator, read climate, write the time-series point, push climate to the
/// aggregator. Every publish is best effort: a failure is logged and the
/// remaining steps still run. A failed publish is retried only by the next cycle.
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::sleep;

use crate::average::RollingAverage;
use crate::config::AgentConfig;
use crate::indicator::StatusIndicator;
use crate::models::{CycleReport, ParticulateAverages};
use crate::network::{LinkStatus, Network};
use crate::publish::{AggregatorPublisher, PublishError, TimeSeriesPublisher, Transport};
use crate::sampler::{ParticulateSampler, SamplerError};
use crate::sensors::{read_climate, ClimateSensor, ParticulateSensor};
use crate::utils::{duration_to_seconds, format_datetime};

/// "Publish due" signal shared between the scheduler tick and the controller
///
/// A single atomic word: raising it twice before it is taken still yields
/// one pending cycle.
#[derive(Debug, Clone, Default)]
pub struct DueFlag(Arc<AtomicBool>);

impl DueFlag {
    pub fn new(raised: bool) -> Self {
        Self(Arc::new(AtomicBool::new(raised)))
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clear the flag and report whether it was raised
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    WarmingUp,
    Sampling,
    PublishingParticulate,
    ReadingClimate,
    PublishingClimate,
}

/// What one `poll` of the controller did
#[derive(Debug)]
pub enum PollOutcome {
    /// Link was down; a reconnect was attempted and no cycle ran
    Reconnecting(LinkStatus),
    NotDue,
    Completed(CycleReport),
}

/// The external collaborators a controller drives
pub struct Capabilities {
    pub particulate: Box<dyn ParticulateSensor>,
    pub climate: Box<dyn ClimateSensor>,
    pub network: Box<dyn Network>,
    pub transport: Box<dyn Transport>,
    pub indicator: Box<dyn StatusIndicator>,
}

pub struct CycleController {
    due: DueFlag,
    state: CycleState,
    sampler: ParticulateSampler,
    pm25: RollingAverage,
    pm10: RollingAverage,
    aggregator: AggregatorPublisher,
    time_series: TimeSeriesPublisher,
    altitude_m: f32,
    climate_publish_delay: Duration,
    caps: Capabilities,
}

impl CycleController {
    /// # Arguments
    /// * `config` - Sample count, altitude, publish delay and sink endpoints
    /// * `device_id` - Identity used in the `X-Sensor` header and the `device` tag
    /// * `due` - Flag shared with the scheduler
    /// * `caps` - Sensors, network, transport and indicator to drive
    pub fn new(
        config: &AgentConfig,
        device_id: &str,
        due: DueFlag,
        caps: Capabilities,
    ) -> Result<Self, PublishError> {
        Ok(Self {
            due,
            state: CycleState::Idle,
            sampler: ParticulateSampler::from_config(config),
            pm25: RollingAverage::new(config.sample_count),
            pm10: RollingAverage::new(config.sample_count),
            aggregator: AggregatorPublisher::new(config, device_id),
            time_series: TimeSeriesPublisher::new(config, device_id)?,
            altitude_m: config.altitude_m,
            climate_publish_delay: config.climate_publish_delay,
            caps,
        })
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// One main-loop iteration: check the link, then run a cycle if one is due
    ///
    /// The due flag is only consumed with the link up and the controller idle,
    /// so a tick that lands mid-cycle stays pending for the next poll.
    ///
    /// # Returns
    /// `Reconnecting` with the link state after a reconnect attempt, `NotDue`
    /// when no tick is pending, or the finished cycle's report
    pub async fn poll(&mut self) -> PollOutcome {
        if self.caps.network.status().await == LinkStatus::Disconnected {
            warn!("Network disconnected, reconnecting");
            self.caps.indicator.toggle();
            let status = self.caps.network.connect().await;
            match status {
                LinkStatus::Connected => info!("Network connected"),
                LinkStatus::Disconnected => warn!("Reconnect attempt failed"),
            }
            return PollOutcome::Reconnecting(status);
        }

        if !self.due.take() {
            return PollOutcome::NotDue;
        }

        PollOutcome::Completed(self.run_cycle().await)
    }

    fn enter(&mut self, state: CycleState) {
        debug!("Cycle state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn averages(&self) -> Option<ParticulateAverages> {
        Some(ParticulateAverages {
            pm25: self.pm25.mean()?,
            pm10: self.pm10.mean()?,
            samples: self.pm25.len(),
        })
    }

    async fn run_cycle(&mut self) -> CycleReport {
        let started = OffsetDateTime::now_utc();
        info!("Starting cycle at: {}", format_datetime(&started));
        self.caps.indicator.set_active(true);

        let mut report = CycleReport::default();

        self.enter(CycleState::WarmingUp);
        self.sampler.warm_up(&mut *self.caps.particulate).await;

        self.enter(CycleState::Sampling);
        let sampled = self
            .sampler
            .collect(&mut *self.caps.particulate, &mut self.pm25, &mut self.pm10)
            .await;
        self.sampler.finish(&mut *self.caps.particulate).await;

        match sampled {
            Ok(stats) => {
                report.accepted = stats.accepted;
                report.rejected = stats.rejected;
            }
            Err(e) => {
                let SamplerError::RetryLimit {
                    accepted, rejected, ..
                } = e;
                warn!("Particulate sampling incomplete: {}", e);
                report.accepted = accepted;
                report.rejected = rejected;
            }
        }

        let averages = self.averages();
        report.averages = averages;

        self.enter(CycleState::PublishingParticulate);
        match &averages {
            Some(avg) => {
                info!(
                    "Average pm2.5 = {:.1} pm10 = {:.1} over {} samples",
                    avg.pm25, avg.pm10, avg.samples
                );
                let result = self
                    .aggregator
                    .publish_particulate(&*self.caps.transport, avg)
                    .await;
                report.particulate_published = log_outcome("Particulate aggregator push", result);
            }
            None => warn!("No valid particulate samples, skipping particulate push"),
        }

        self.enter(CycleState::ReadingClimate);
        match read_climate(&mut *self.caps.climate, self.altitude_m).await {
            Ok(climate) => {
                info!(
                    "Temperature {:.2}°C, humidity {:.2}%, pressure {:.2} hPa (sea level {:.2} hPa)",
                    climate.temperature,
                    climate.humidity,
                    climate.pressure / 100.0,
                    climate.sea_level_pressure / 100.0
                );
                report.climate = Some(climate);

                self.enter(CycleState::PublishingClimate);
                let result = self
                    .time_series
                    .write(&*self.caps.transport, &climate, averages.as_ref())
                    .await;
                report.time_series_written = log_outcome("Time-series write", result);

                sleep(self.climate_publish_delay).await;

                let result = self
                    .aggregator
                    .publish_climate(&*self.caps.transport, &climate)
                    .await;
                report.climate_published = log_outcome("Climate aggregator push", result);
            }
            Err(e) => error!("Climate read failed, skipping climate publishes: {}", e),
        }

        self.caps.indicator.set_active(false);
        self.enter(CycleState::Idle);

        let finished = OffsetDateTime::now_utc();
        info!(
            "Cycle complete at: {} ({}s)",
            format_datetime(&finished),
            duration_to_seconds(finished - started)
        );
        info!(
            "  Samples: {} accepted, {} rejected, {} averaged",
            report.accepted,
            report.rejected,
            report.averages.map_or(0, |avg| avg.samples)
        );
        info!(
            "  Published: particulate={}, time-series={}, climate={}",
            report.particulate_published, report.time_series_written, report.climate_published
        );

        report
    }
}

fn log_outcome(step: &str, result: Result<(), PublishError>) -> bool {
    match result {
        Ok(()) => {
            info!("{} succeeded", step);
            true
        }
        Err(e) => {
            error!("{} failed: {}", step, e);
            false
        }
    }
}
