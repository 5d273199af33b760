//! Domain types - what travels across the bridge
//!
//! - `Reading` - a sensor name and integer value parsed from a local payload
//! - `ParseError` - why a payload was rejected

pub mod reading;

pub use reading::{ParseError, Reading};
