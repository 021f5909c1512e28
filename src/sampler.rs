/// Particulate sampling: warmup, retrying acquisition into averaging windows, sleep
use log::{debug, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::average::RollingAverage;
use crate::config::AgentConfig;
use crate::sensors::ParticulateSensor;

/// Settling time after waking the particulate sensor; readings before it are not trusted
pub const WARMUP: Duration = Duration::from_secs(20);

const INVALID_READ_WARN_EVERY: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamplerError {
    #[error("gave up after {rejected} invalid reads with {accepted} of {wanted} samples")]
    RetryLimit {
        accepted: usize,
        rejected: usize,
        wanted: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleStats {
    pub accepted: usize,
    pub rejected: usize,
}

pub struct ParticulateSampler {
    warmup: Duration,
    samples: usize,
    max_invalid_reads: Option<u32>,
}

impl ParticulateSampler {
    pub fn new(warmup: Duration, samples: usize, max_invalid_reads: Option<u32>) -> Self {
        Self {
            warmup,
            samples,
            max_invalid_reads,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(WARMUP, config.sample_count, config.max_invalid_reads)
    }

    /// Wake the sensor and hold it awake for the settling time
    pub async fn warm_up(&self, sensor: &mut dyn ParticulateSensor) {
        if let Err(e) = sensor.wake().await {
            warn!("Particulate sensor wake failed: {}", e);
        }
        debug!("Warming up particulate sensor for {}s", self.warmup.as_secs());
        sleep(self.warmup).await;
    }

    /// Clear both windows and fill them with exactly `samples` valid readings
    ///
    /// Invalid readings are discarded and retried. Without a retry cap this
    /// does not return until enough valid readings arrive.
    ///
    /// # Arguments
    /// * `sensor` - Awake particulate sensor
    /// * `pm25` - PM2.5 averaging window, cleared first
    /// * `pm10` - PM10 averaging window, cleared first
    ///
    /// # Returns
    /// Accepted and rejected counts, or `RetryLimit` with the windows holding
    /// whatever was accepted before the cap was hit
    pub async fn collect(
        &self,
        sensor: &mut dyn ParticulateSensor,
        pm25: &mut RollingAverage,
        pm10: &mut RollingAverage,
    ) -> Result<SampleStats, SamplerError> {
        pm25.clear();
        pm10.clear();

        let mut stats = SampleStats {
            accepted: 0,
            rejected: 0,
        };

        while stats.accepted < self.samples {
            let reading = sensor.query_reading().await;
            if reading.valid {
                debug!("PM2.5 = {}, PM10 = {}", reading.pm25, reading.pm10);
                pm25.push(reading.pm25);
                pm10.push(reading.pm10);
                stats.accepted += 1;
                continue;
            }

            stats.rejected += 1;
            if stats.rejected % INVALID_READ_WARN_EVERY == 0 {
                warn!(
                    "{} invalid particulate reads so far ({} of {} accepted)",
                    stats.rejected, stats.accepted, self.samples
                );
            }
            if let Some(limit) = self.max_invalid_reads {
                if stats.rejected >= limit as usize {
                    return Err(SamplerError::RetryLimit {
                        accepted: stats.accepted,
                        rejected: stats.rejected,
                        wanted: self.samples,
                    });
                }
            }
            // Let the scheduler and signal handlers run between retries
            tokio::task::yield_now().await;
        }

        info!(
            "Collected {} particulate samples ({} invalid reads discarded)",
            stats.accepted, stats.rejected
        );
        Ok(stats)
    }

    pub async fn finish(&self, sensor: &mut dyn ParticulateSensor) {
        if let Err(e) = sensor.sleep().await {
            warn!("Particulate sensor sleep failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticulateReading;
    use crate::testing::{Journal, MockParticulate};
    use tokio::time::Instant;

    fn windows(n: usize) -> (RollingAverage, RollingAverage) {
        (RollingAverage::new(n), RollingAverage::new(n))
    }

    async fn run(
        sampler: &ParticulateSampler,
        sensor: &mut MockParticulate,
        pm25: &mut RollingAverage,
        pm10: &mut RollingAverage,
    ) -> Result<SampleStats, SamplerError> {
        sampler.warm_up(sensor).await;
        let result = sampler.collect(sensor, pm25, pm10).await;
        sampler.finish(sensor).await;
        result
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_reads_are_retried_and_not_counted() {
        let journal = Journal::default();
        let mut sensor = MockParticulate::scripted(
            &journal,
            vec![
                ParticulateReading::invalid(),
                ParticulateReading::invalid(),
                ParticulateReading::valid(1.0, 1.0),
                ParticulateReading::valid(2.0, 2.0),
                ParticulateReading::valid(3.0, 3.0),
                ParticulateReading::valid(4.0, 4.0),
                ParticulateReading::valid(5.0, 5.0),
            ],
        );
        let (mut pm25, mut pm10) = windows(5);
        let sampler = ParticulateSampler::new(Duration::from_secs(20), 5, None);

        let stats = run(&sampler, &mut sensor, &mut pm25, &mut pm10).await.unwrap();

        assert_eq!(stats, SampleStats { accepted: 5, rejected: 2 });
        assert_eq!(pm25.mean(), Some(3.0));
        assert_eq!(pm10.mean(), Some(3.0));
        assert_eq!(journal.count("pm:query"), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn warmup_precedes_first_query_and_sleep_follows_last() {
        let journal = Journal::default();
        let mut sensor = MockParticulate::constant(&journal, 10.0, 20.0);
        let (mut pm25, mut pm10) = windows(3);
        let sampler = ParticulateSampler::new(Duration::from_secs(20), 3, None);

        let started = Instant::now();
        run(&sampler, &mut sensor, &mut pm25, &mut pm10).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(20));
        assert_eq!(
            journal.entries(),
            vec!["pm:wake", "pm:query", "pm:query", "pm:query", "pm:sleep"]
        );
        assert_eq!(pm25.mean(), Some(10.0));
        assert_eq!(pm10.mean(), Some(20.0));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_sampler_always_warms_up_for_twenty_seconds() {
        let journal = Journal::default();
        let mut sensor = MockParticulate::constant(&journal, 1.0, 1.0);
        let sampler = ParticulateSampler::from_config(&crate::testing::test_config());

        let started = Instant::now();
        sampler.warm_up(&mut sensor).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= WARMUP && elapsed < WARMUP + Duration::from_secs(1));
        assert_eq!(WARMUP, Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn windows_are_cleared_before_sampling() {
        let journal = Journal::default();
        let mut sensor = MockParticulate::constant(&journal, 8.0, 8.0);
        let (mut pm25, mut pm10) = windows(2);
        pm25.push(100.0);
        pm10.push(100.0);

        let sampler = ParticulateSampler::new(Duration::ZERO, 2, None);
        sampler.collect(&mut sensor, &mut pm25, &mut pm10).await.unwrap();

        assert_eq!(pm25.mean(), Some(8.0));
        assert_eq!(pm10.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_cap_gives_up_but_still_sleeps_sensor() {
        let journal = Journal::default();
        let mut sensor = MockParticulate::scripted(
            &journal,
            vec![ParticulateReading::valid(6.0, 12.0)],
        )
        .then_invalid();
        let (mut pm25, mut pm10) = windows(5);
        let sampler = ParticulateSampler::new(Duration::from_secs(20), 5, Some(4));

        let err = run(&sampler, &mut sensor, &mut pm25, &mut pm10)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SamplerError::RetryLimit {
                accepted: 1,
                rejected: 4,
                wanted: 5
            }
        );
        assert_eq!(pm25.mean(), Some(6.0));
        assert_eq!(journal.entries().last().map(String::as_str), Some("pm:sleep"));
    }
}
