//! Remote publisher - one short-lived MQTT session per forwarded reading
//!
//! Each forward opens a fresh session to the cloud broker, sends a single
//! QoS 0 publish and disconnects. Nothing is kept open between forwards and
//! nothing is retried. Every phase is bounded by a timeout so an unreachable
//! broker cannot stall the caller indefinitely.
//!
//! After a publish timeout the session is dropped without polling it again:
//! the request may still be queued in the client, and driving the eventloop
//! would let it reach the broker after `Timeout` was already reported.

use crate::infra::config::RemoteConfig;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

/// Request channel capacity for the short-lived client
const SESSION_CAP: usize = 10;

/// How long to wait for the DISCONNECT to be written before dropping the socket
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote connection failed: {0}")]
    Connection(String),
    #[error("remote publish failed: {0}")]
    Publish(String),
    #[error("remote {phase} timed out after {timeout_ms}ms")]
    Timeout { phase: &'static str, timeout_ms: u64 },
    #[error("forward queue full")]
    QueueFull,
    #[error("forward worker stopped")]
    WorkerStopped,
}

/// Sends one value to one topic on the remote broker
#[async_trait]
pub trait RemotePublisher: Send + Sync {
    async fn publish(&self, value: i64, topic: &str) -> Result<(), RemoteError>;

    /// True when `publish` only hands the value off and the session runs later
    fn is_queued(&self) -> bool {
        false
    }
}

/// Hooks called around each remote session
pub trait SessionObserver: Send + Sync {
    fn on_connect(&self, _host: &str) {}
    fn on_disconnect(&self, _host: &str) {}
}

/// Default observer: does nothing
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Observer that logs session boundaries at info level
pub struct LoggingObserver;

impl SessionObserver for LoggingObserver {
    fn on_connect(&self, host: &str) {
        info!(host = %host, "remote_connected");
    }

    fn on_disconnect(&self, host: &str) {
        info!(host = %host, "remote_disconnected");
    }
}

/// Lifecycle of one forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Publishing,
    Disconnecting,
}

/// Substitute `{username}` and `{topic}` into the wire topic template
pub fn render_topic(template: &str, username: &str, topic: &str) -> String {
    template.replace("{username}", username).replace("{topic}", topic)
}

/// Short client id (MQTT 3.1.1 brokers must accept up to 23 bytes)
fn session_client_id() -> String {
    let id = Uuid::now_v7().simple().to_string();
    // v7 leads with the timestamp, the random bits are at the end
    format!("sb{}", &id[id.len() - 20..])
}

/// Publisher that opens a new rumqttc session for every forward
pub struct MqttRemotePublisher {
    config: RemoteConfig,
    observer: Arc<dyn SessionObserver>,
}

impl MqttRemotePublisher {
    pub fn new(config: &RemoteConfig) -> Self {
        Self { config: config.clone(), observer: Arc::new(NoopObserver) }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Topic actually published on the wire for a feed name
    pub fn wire_topic(&self, topic: &str) -> String {
        render_topic(&self.config.topic_template, &self.config.username, topic)
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut mqttoptions =
            MqttOptions::new(session_client_id(), &self.config.host, self.config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        mqttoptions.set_clean_session(true);
        if !self.config.username.is_empty() {
            mqttoptions.set_credentials(&self.config.username, &self.config.key);
        }
        mqttoptions
    }

    fn transition(&self, state: &mut SessionState, next: SessionState) {
        debug!(host = %self.config.host, from = ?state, to = ?next, "remote_session_state");
        *state = next;
    }

    async fn connect(&self, eventloop: &mut EventLoop) -> Result<(), RemoteError> {
        let timeout_ms = self.config.connect_timeout_ms;
        match timeout(Duration::from_millis(timeout_ms), wait_for_connack(eventloop)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout { phase: "connect", timeout_ms }),
        }
    }

    async fn send(
        &self,
        client: &AsyncClient,
        eventloop: &mut EventLoop,
        wire_topic: &str,
        value: i64,
    ) -> Result<(), RemoteError> {
        client
            .publish(wire_topic, QoS::AtMostOnce, false, value.to_string())
            .await
            .map_err(|e| RemoteError::Publish(e.to_string()))?;

        let timeout_ms = self.config.publish_timeout_ms;
        match timeout(Duration::from_millis(timeout_ms), wait_for_publish_written(eventloop)).await
        {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout { phase: "publish", timeout_ms }),
        }
    }

    async fn disconnect(&self, client: &AsyncClient, eventloop: &mut EventLoop) {
        if let Err(e) = client.disconnect().await {
            debug!(error = %e, "remote_disconnect_request_failed");
            return;
        }
        if timeout(DISCONNECT_TIMEOUT, wait_for_disconnect_written(eventloop)).await.is_err() {
            debug!(host = %self.config.host, "remote_disconnect_timeout");
        }
    }
}

#[async_trait]
impl RemotePublisher for MqttRemotePublisher {
    async fn publish(&self, value: i64, topic: &str) -> Result<(), RemoteError> {
        let wire_topic = self.wire_topic(topic);
        let (client, mut eventloop) = AsyncClient::new(self.mqtt_options(), SESSION_CAP);
        let mut state = SessionState::Idle;

        self.transition(&mut state, SessionState::Connecting);
        self.connect(&mut eventloop).await?;
        self.transition(&mut state, SessionState::Connected);
        self.observer.on_connect(&self.config.host);

        self.transition(&mut state, SessionState::Publishing);
        debug!(value = %value, topic = %wire_topic, "remote_publish_sending");
        let result = self.send(&client, &mut eventloop, &wire_topic, value).await;

        // Always close the session, whatever happened to the publish
        self.transition(&mut state, SessionState::Disconnecting);
        if graceful_disconnect(&result) {
            self.disconnect(&client, &mut eventloop).await;
        } else {
            debug!(host = %self.config.host, "remote_session_abandoned");
        }
        drop(eventloop);
        self.observer.on_disconnect(&self.config.host);
        self.transition(&mut state, SessionState::Idle);

        result
    }
}

/// Whether the session may still be polled to send a DISCONNECT
fn graceful_disconnect(result: &Result<(), RemoteError>) -> bool {
    !matches!(result, Err(RemoteError::Timeout { .. }))
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), RemoteError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(RemoteError::Connection(e.to_string())),
        }
    }
}

async fn wait_for_publish_written(eventloop: &mut EventLoop) -> Result<(), RemoteError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Publish(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(RemoteError::Publish(e.to_string())),
        }
    }
}

async fn wait_for_disconnect_written(eventloop: &mut EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => return,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "remote_disconnect_closed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::net::TcpListener;

    #[derive(Default)]
    struct RecordingObserver {
        calls: Mutex<Vec<&'static str>>,
    }

    impl SessionObserver for RecordingObserver {
        fn on_connect(&self, _host: &str) {
            self.calls.lock().push("connect");
        }

        fn on_disconnect(&self, _host: &str) {
            self.calls.lock().push("disconnect");
        }
    }

    /// A local port with nothing listening on it
    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    fn unreachable_config() -> RemoteConfig {
        RemoteConfig {
            host: "127.0.0.1".to_string(),
            port: closed_port(),
            username: "tester".to_string(),
            key: "secret".to_string(),
            connect_timeout_ms: 2000,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_topic_adafruit_feed() {
        assert_eq!(
            render_topic("{username}/feeds/{topic}", "alice", "lightsensor"),
            "alice/feeds/lightsensor"
        );
    }

    #[test]
    fn test_render_topic_bare() {
        assert_eq!(render_topic("{topic}", "alice", "lightsensor"), "lightsensor");
    }

    #[test]
    fn test_wire_topic_uses_config() {
        let config = RemoteConfig { username: "bob".to_string(), ..Default::default() };
        let publisher = MqttRemotePublisher::new(&config);
        assert_eq!(publisher.wire_topic("lightsensor"), "bob/feeds/lightsensor");
    }

    #[test]
    fn test_session_client_id_is_short_and_unique() {
        let a = session_client_id();
        let b = session_client_id();
        assert!(a.len() <= 23);
        assert_ne!(a, b);
    }

    #[test]
    fn test_publish_timeout_skips_graceful_disconnect() {
        let timed_out = Err(RemoteError::Timeout { phase: "publish", timeout_ms: 5000 });
        assert!(!graceful_disconnect(&timed_out));
        assert!(graceful_disconnect(&Ok(())));
        assert!(graceful_disconnect(&Err(RemoteError::Publish("closed".to_string()))));
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_connection_error() {
        let observer = Arc::new(RecordingObserver::default());
        let publisher =
            MqttRemotePublisher::new(&unreachable_config()).with_observer(observer.clone());

        let result = publisher.publish(100, "lightsensor").await;

        assert!(matches!(result, Err(RemoteError::Connection(_))));
        // Never connected, so neither hook fires
        assert!(observer.calls.lock().is_empty());
    }
}
