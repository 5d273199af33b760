//! Services - translation and throttling
//!
//! - `translator` - parses local payloads and decides when to forward
//! - `throttle` - count-based forward throttle
//! - `forward_worker` - optional queue that runs remote sessions off the receive path

pub mod forward_worker;
pub mod throttle;
pub mod translator;

// Re-export commonly used types
pub use forward_worker::{create_forward_worker, ForwardWorker, QueuedPublisher};
pub use throttle::Throttle;
pub use translator::{Outcome, Translator};
