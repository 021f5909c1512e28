//! Recording test doubles for the capability traits
//!
//! All doubles append to a shared `Journal` so tests can assert call order
//! across sensors, network and sinks.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::AgentConfig;
use crate::indicator::StatusIndicator;
use crate::models::{ClimateSample, ParticulateReading};
use crate::network::{LinkStatus, Network};
use crate::publish::transport::{Delivery, PublishError, Response, Transport};
use crate::sensors::{ClimateSensor, ParticulateSensor, SensorError};

/// Header lookup for asserting on recorded deliveries
pub trait DeliveryExt {
    fn header_value(&self, name: &str) -> Option<&str>;
}

impl DeliveryExt for Delivery {
    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    /// Entries other than individual particulate queries
    pub fn milestones(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e != "pm:query")
            .collect()
    }
}

pub fn test_config() -> AgentConfig {
    let vars: HashMap<&str, &str> = [
        ("INFLUXDB_URL", "http://influx.local:8086"),
        ("INFLUXDB_DATABASE", "air"),
        ("PM_SAMPLE_COUNT", "5"),
    ]
    .into_iter()
    .collect();
    AgentConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

type Hook = Box<dyn FnMut() + Send>;

pub struct MockParticulate {
    journal: Journal,
    script: VecDeque<ParticulateReading>,
    fallback: ParticulateReading,
    on_wake: Option<Hook>,
}

impl MockParticulate {
    /// Plays `readings` in order, then keeps answering with a valid 1.0/1.0
    pub fn scripted(journal: &Journal, readings: Vec<ParticulateReading>) -> Self {
        Self {
            journal: journal.clone(),
            script: readings.into(),
            fallback: ParticulateReading::valid(1.0, 1.0),
            on_wake: None,
        }
    }

    pub fn constant(journal: &Journal, pm25: f32, pm10: f32) -> Self {
        Self::scripted(journal, Vec::new()).with_fallback(ParticulateReading::valid(pm25, pm10))
    }

    pub fn then_invalid(self) -> Self {
        self.with_fallback(ParticulateReading::invalid())
    }

    fn with_fallback(mut self, fallback: ParticulateReading) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn on_wake(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_wake = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl ParticulateSensor for MockParticulate {
    async fn wake(&mut self) -> Result<(), SensorError> {
        self.journal.record("pm:wake");
        if let Some(hook) = self.on_wake.as_mut() {
            hook();
        }
        Ok(())
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.journal.record("pm:sleep");
        Ok(())
    }

    async fn query_reading(&mut self) -> ParticulateReading {
        self.journal.record("pm:query");
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

pub struct MockClimate {
    journal: Journal,
    sample: Option<ClimateSample>,
}

impl MockClimate {
    pub fn new(journal: &Journal, temperature: f32, humidity: f32, pressure: f32) -> Self {
        Self {
            journal: journal.clone(),
            sample: Some(ClimateSample {
                temperature,
                humidity,
                pressure,
            }),
        }
    }

    pub fn failing(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            sample: None,
        }
    }
}

#[async_trait]
impl ClimateSensor for MockClimate {
    async fn read(&mut self) -> Result<ClimateSample, SensorError> {
        self.journal.record("climate:read");
        self.sample.ok_or(SensorError::Timeout)
    }
}

pub struct MockNetwork {
    journal: Journal,
    link: Arc<AtomicBool>,
}

impl MockNetwork {
    pub fn new(journal: &Journal, connected: bool) -> Self {
        Self {
            journal: journal.clone(),
            link: Arc::new(AtomicBool::new(connected)),
        }
    }

    /// Handle for flipping the link state from the test
    pub fn link(&self) -> Arc<AtomicBool> {
        self.link.clone()
    }

    fn current(&self) -> LinkStatus {
        if self.link.load(Ordering::SeqCst) {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        }
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn status(&mut self) -> LinkStatus {
        self.current()
    }

    async fn connect(&mut self) -> LinkStatus {
        self.journal.record("net:connect");
        self.current()
    }
}

type FailRule = Box<dyn Fn(&Delivery) -> bool + Send + Sync>;

/// Journals each request as "<METHOD> <path>[ pin=<X-PIN>]"
pub struct MockTransport {
    journal: Journal,
    sent: Arc<Mutex<Vec<Delivery>>>,
    fail_when: FailRule,
}

impl MockTransport {
    pub fn new(journal: &Journal) -> Self {
        Self::failing(journal, |_| false)
    }

    /// Answers 500 to every request matching `rule`
    pub fn failing(journal: &Journal, rule: impl Fn(&Delivery) -> bool + Send + Sync + 'static) -> Self {
        Self {
            journal: journal.clone(),
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_when: Box::new(rule),
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.sent.lock().unwrap().clone()
    }

    /// Shared view of sent requests that survives moving the transport into a controller
    pub fn sent(&self) -> Arc<Mutex<Vec<Delivery>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn deliver(&self, delivery: Delivery) -> Result<Response, PublishError> {
        let mut entry = format!("{} {}", delivery.method, delivery.url.path());
        if let Some(pin) = delivery.header_value("X-PIN") {
            entry.push_str(&format!(" pin={}", pin));
        }
        self.journal.record(entry);

        let fail = (self.fail_when)(&delivery);
        self.sent.lock().unwrap().push(delivery);

        if fail {
            return Err(PublishError::Status {
                status: 500,
                body: "injected failure".into(),
            });
        }
        Ok(Response { status: 204 })
    }
}

pub struct MockIndicator {
    journal: Journal,
    active: bool,
}

impl MockIndicator {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            active: false,
        }
    }
}

impl StatusIndicator for MockIndicator {
    fn set_active(&mut self, active: bool) {
        self.active = active;
        self.journal.record(if active { "led:on" } else { "led:off" });
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
