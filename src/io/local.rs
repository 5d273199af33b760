//! MQTT subscriber for the local sensor broker
//!
//! Keeps one persistent session, re-subscribes on every ConnAck so that
//! reconnects keep delivering, and passes each payload to the translator.
//! Messages are handled one at a time in the eventloop task.

use crate::infra::config::LocalConfig;
use crate::infra::metrics::Metrics;
use crate::services::translator::{Outcome, Translator};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum LocalError {
    #[error("local broker connection failed: {0}")]
    Connection(String),
    #[error("local broker did not answer within {0}ms")]
    ConnectTimeout(u64),
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

fn qos_from_level(level: u8) -> QoS {
    match level {
        2 => QoS::ExactlyOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::AtMostOnce,
    }
}

pub struct LocalSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    host: String,
    topic: String,
    qos: QoS,
    metrics: Arc<Metrics>,
}

impl LocalSubscriber {
    /// Connect to the local broker and subscribe
    ///
    /// Waits for the first ConnAck. Failure here is fatal for the bridge;
    /// later disconnects are retried by the run loop.
    pub async fn connect(
        config: &LocalConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, LocalError> {
        let mut mqttoptions = MqttOptions::new(&config.client_id, &config.host, config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        mqttoptions.set_clean_session(true);

        // Set credentials if configured
        if let Some(username) = config.username.as_deref() {
            mqttoptions.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);
        let mut subscriber = Self {
            client,
            eventloop,
            host: config.host.clone(),
            topic: config.topic.clone(),
            qos: qos_from_level(config.qos),
            metrics,
        };

        let timeout_ms = config.connect_timeout_ms;
        match timeout(Duration::from_millis(timeout_ms), subscriber.wait_for_connack()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(LocalError::ConnectTimeout(timeout_ms)),
        }

        subscriber.on_connected()?;
        Ok(subscriber)
    }

    async fn wait_for_connack(&mut self) -> Result<(), LocalError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(LocalError::Connection(e.to_string())),
            }
        }
    }

    /// Called on every ConnAck: (re-)register the subscription
    fn on_connected(&self) -> Result<(), LocalError> {
        self.metrics.record_local_connect();
        info!(host = %self.host, topic = %self.topic, "local_connected");

        // try_subscribe: the eventloop is not being polled while we are here
        self.client.try_subscribe(&self.topic, self.qos).map_err(|e| LocalError::Subscribe {
            topic: self.topic.clone(),
            reason: e.to_string(),
        })
    }

    /// Drive the eventloop until shutdown, handing payloads to the translator
    pub async fn run(mut self, mut translator: Translator, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.topic, "local_subscriber_started");

        loop {
            tokio::select! {
                // Check for shutdown signal
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("local_shutdown");
                        let _ = self.client.try_disconnect();
                        return;
                    }
                }
                // Process MQTT events
                result = self.eventloop.poll() => {
                    match result {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let outcome = translator.handle(&publish.payload).await;
                            if let Outcome::Counted { count } = outcome {
                                debug!(topic = %publish.topic, count = %count, "local_message");
                            }
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            if let Err(e) = self.on_connected() {
                                error!(error = %e, "local_resubscribe_failed");
                            }
                        }
                        Ok(Event::Incoming(Packet::SubAck(ack))) => {
                            debug!(pkid = %ack.pkid, "local_subscribed");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // rumqttc reconnects on the next poll
                            warn!(error = %e, "local_connection_error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_from_level() {
        assert_eq!(qos_from_level(0), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2), QoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn test_unreachable_local_broker_fails_connect() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = LocalConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: 2000,
            ..Default::default()
        };

        let result = LocalSubscriber::connect(&config, Arc::new(Metrics::new())).await;

        assert!(matches!(result, Err(LocalError::Connection(_))));
    }
}
