//! Translator - turns local sensor payloads into throttled remote publishes
//!
//! For each inbound payload: parse `<sensor> <value>`, count it, and every
//! `threshold` valid readings forward the value to the remote publisher under
//! the configured remote topic. Bad payloads are dropped without touching the
//! counter. Publisher failures are logged and contained here; `handle` never
//! fails.

use crate::domain::reading::{ParseError, Reading};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::remote::{RemoteError, RemotePublisher};
use crate::services::throttle::Throttle;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to one inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload could not be parsed
    Dropped(ParseError),
    /// Reading came from a sensor other than the configured one
    Filtered { sensor: String },
    /// Reading counted, no forward yet
    Counted { count: u64 },
    /// Threshold reached and the value was handed to the publisher
    Forwarded { value: i64 },
    /// Threshold reached and the value is waiting in the forward queue
    Enqueued { value: i64 },
    /// Threshold reached but the publisher failed; the reading is lost
    ForwardFailed { value: i64, error: RemoteError },
}

pub struct Translator {
    throttle: Throttle,
    publisher: Arc<dyn RemotePublisher>,
    remote_topic: String,
    sensor_filter: Option<String>,
    metrics: Arc<Metrics>,
}

impl Translator {
    pub fn new(
        config: &Config,
        publisher: Arc<dyn RemotePublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            throttle: Throttle::new(config.throttle_threshold(), config.throttle_initial_count()),
            publisher,
            remote_topic: config.remote().topic.clone(),
            sensor_filter: config.local().sensor.clone(),
            metrics,
        }
    }

    /// Current throttle count
    pub fn count(&self) -> u64 {
        self.throttle.count()
    }

    /// Handle one raw payload from the local broker
    pub async fn handle(&mut self, payload: &[u8]) -> Outcome {
        self.metrics.record_received();

        let reading = match Reading::parse(payload) {
            Ok(reading) => reading,
            Err(e) => {
                if matches!(e, ParseError::Decode(_)) {
                    self.metrics.record_decode_failed();
                } else {
                    self.metrics.record_parse_failed();
                }
                warn!(error = %e, "reading_dropped");
                return Outcome::Dropped(e);
            }
        };

        if let Some(ref wanted) = self.sensor_filter {
            if *wanted != reading.sensor {
                self.metrics.record_filtered();
                debug!(sensor = %reading.sensor, "reading_filtered");
                return Outcome::Filtered { sensor: reading.sensor };
            }
        }

        self.metrics.record_counted();
        if !self.throttle.record() {
            debug!(
                sensor = %reading.sensor,
                value = %reading.value,
                count = %self.throttle.count(),
                "reading_counted"
            );
            return Outcome::Counted { count: self.throttle.count() };
        }

        self.forward(reading).await
    }

    async fn forward(&self, reading: Reading) -> Outcome {
        let value = reading.value;
        self.metrics.record_forward_attempt();
        info!(
            sensor = %reading.sensor,
            value = %value,
            topic = %self.remote_topic,
            "reading_forwarding"
        );

        let start = Instant::now();
        let result = self.publisher.publish(value, &self.remote_topic).await;
        let latency_us = start.elapsed().as_micros() as u64;

        if self.publisher.is_queued() && result.is_ok() {
            // The worker records the session result and its latency
            self.metrics.record_forward_enqueued();
            debug!(value = %value, topic = %self.remote_topic, "reading_enqueued");
            return Outcome::Enqueued { value };
        }
        self.metrics.record_forward_result(result.is_ok(), latency_us);

        match result {
            Ok(()) => {
                info!(
                    value = %value,
                    topic = %self.remote_topic,
                    latency_us = %latency_us,
                    "reading_forwarded"
                );
                Outcome::Forwarded { value }
            }
            Err(e) => {
                error!(
                    value = %value,
                    topic = %self.remote_topic,
                    error = %e,
                    "reading_forward_failed"
                );
                Outcome::ForwardFailed { value, error: e }
            }
        }
    }
}
