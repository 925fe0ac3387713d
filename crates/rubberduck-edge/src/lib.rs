//! Edge forwarder.
//!
//! The browser-facing entry point. Each request is re-issued to the relay
//! with the shared service key attached, and the relay's response stream is
//! piped back without buffering. The only translation is for rate limiting,
//! which becomes a user-legible 429 the UI can special-case.

pub mod config;
pub mod error;
pub mod server;

pub use config::EdgeConfig;
pub use error::EdgeError;
pub use server::EdgeServer;
