//! Tracing subscriber setup shared by the relay and edge binaries.

mod subscriber;

pub use subscriber::{init_subscriber, TelemetryConfig};
