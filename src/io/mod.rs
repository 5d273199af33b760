//! IO modules - broker connections
//!
//! - `local` - persistent subscriber on the local sensor broker
//! - `remote` - short-lived publisher sessions to the cloud broker

pub mod local;
pub mod remote;

// Re-export commonly used types
pub use local::{LocalError, LocalSubscriber};
pub use remote::{
    LoggingObserver, MqttRemotePublisher, NoopObserver, RemoteError, RemotePublisher,
    SessionObserver,
};
