//! Streaming relay for persona-driven code analysis.
//!
//! An inbound `POST /debug` or `POST /generate-docs` passes through
//! [`admission`] (shared-secret check, per-client rate limit, schema and
//! size validation) before any upstream cost is incurred. The admitted
//! request is handed to the [`relay`], which opens one streaming completion
//! and forwards every delta to the caller as it arrives.

pub mod admission;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod testing;

pub use admission::{Admission, Endpoint};
pub use config::RelayConfig;
pub use error::RelayError;
pub use relay::{Relay, RelayPhase, RelayStream, StreamOutcome};
pub use server::RelayServer;
