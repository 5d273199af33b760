//! Forward worker - runs remote sessions off the local receive path
//!
//! With `remote.queued` set, the translator hands forwards to a
//! `QueuedPublisher` which only enqueues them. The worker drains the queue and
//! runs the real publisher one forward at a time, so a slow or unreachable
//! cloud broker never holds up the local eventloop.

use crate::infra::metrics::Metrics;
use crate::io::remote::{RemoteError, RemotePublisher};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};

/// A forward waiting for the worker
#[derive(Debug)]
pub struct ForwardCmd {
    pub value: i64,
    pub topic: String,
    /// When the forward was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Publisher front that enqueues instead of publishing
pub struct QueuedPublisher {
    tx: mpsc::Sender<ForwardCmd>,
}

#[async_trait]
impl RemotePublisher for QueuedPublisher {
    async fn publish(&self, value: i64, topic: &str) -> Result<(), RemoteError> {
        let cmd = ForwardCmd { value, topic: topic.to_string(), enqueued_at: Instant::now() };
        self.tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => RemoteError::QueueFull,
            TrySendError::Closed(_) => RemoteError::WorkerStopped,
        })
    }

    fn is_queued(&self) -> bool {
        true
    }
}

/// Worker that runs queued forwards against the real publisher
pub struct ForwardWorker {
    publisher: Arc<dyn RemotePublisher>,
    cmd_rx: mpsc::Receiver<ForwardCmd>,
    metrics: Arc<Metrics>,
}

impl ForwardWorker {
    /// Run the worker, processing forwards until the channel closes
    pub async fn run(mut self) {
        info!("forward_worker_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            let queue_delay_us = cmd.enqueued_at.elapsed().as_micros() as u64;

            let send_start = Instant::now();
            let result = self.publisher.publish(cmd.value, &cmd.topic).await;
            let send_us = send_start.elapsed().as_micros() as u64;

            self.metrics.record_worker_result(result.is_ok(), send_us);
            match result {
                Ok(()) => info!(
                    value = %cmd.value,
                    topic = %cmd.topic,
                    queue_delay_us = %queue_delay_us,
                    send_us = %send_us,
                    "forward_processed"
                ),
                Err(e) => error!(
                    value = %cmd.value,
                    topic = %cmd.topic,
                    error = %e,
                    "forward_failed"
                ),
            }

            // More than a second in the queue means forwards are backing up
            if queue_delay_us > 1_000_000 {
                warn!(queue_delay_us = %queue_delay_us, "forward_queue_delay_high");
            }
        }

        info!("forward_worker_stopped");
    }
}

/// Create the queued publisher and its worker
///
/// Returns the publisher (for the translator) and the worker (to be spawned)
pub fn create_forward_worker(
    publisher: Arc<dyn RemotePublisher>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (QueuedPublisher, ForwardWorker) {
    let (tx, cmd_rx) = mpsc::channel(buffer_size.max(1));
    (QueuedPublisher { tx }, ForwardWorker { publisher, cmd_rx, metrics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl RemotePublisher for RecordingPublisher {
        async fn publish(&self, value: i64, topic: &str) -> Result<(), RemoteError> {
            self.sent.lock().push((value, topic.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_drains_queue_in_order() {
        let inner = Arc::new(RecordingPublisher::default());
        let metrics = Arc::new(Metrics::new());
        let (queued, worker) = create_forward_worker(inner.clone(), metrics.clone(), 8);

        queued.publish(1, "lightsensor").await.unwrap();
        queued.publish(2, "lightsensor").await.unwrap();
        drop(queued);

        // Channel closed after drop, so run() returns once drained
        worker.run().await;

        assert_eq!(
            *inner.sent.lock(),
            vec![(1, "lightsensor".to_string()), (2, "lightsensor".to_string())]
        );
        assert_eq!(metrics.report().worker_succeeded, 2);
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let inner = Arc::new(RecordingPublisher::default());
        let (queued, _worker) = create_forward_worker(inner, Arc::new(Metrics::new()), 1);

        queued.publish(1, "lightsensor").await.unwrap();
        let result = queued.publish(2, "lightsensor").await;
        assert_eq!(result, Err(RemoteError::QueueFull));
    }

    #[tokio::test]
    async fn test_stopped_worker_rejects() {
        let inner = Arc::new(RecordingPublisher::default());
        let (queued, worker) = create_forward_worker(inner, Arc::new(Metrics::new()), 4);
        drop(worker);

        let result = queued.publish(1, "lightsensor").await;
        assert_eq!(result, Err(RemoteError::WorkerStopped));
    }
}
