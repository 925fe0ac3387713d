//! Rubberduck Providers - upstream chat-completion adapter
//!
//! Wraps a single configured OpenAI-compatible provider and exposes one
//! operation: open a streaming completion for a system prompt plus user
//! content and hand back a [`DeltaStream`] of text fragments.
//!
//! The stream is a cancellable producer/consumer channel. A background task
//! reads the provider's SSE body and pushes [`DeltaChunk`]s into a bounded
//! channel; dropping (or cancelling) the [`DeltaStream`] stops that task and
//! releases the upstream connection.
//!
//! [`DeltaChunk`]: rubberduck_types::DeltaChunk

mod config;
mod error;
mod openai;
mod stream;
mod traits;

pub use config::{
    resolve_credential, ProviderConfig, CREDENTIAL_SOURCES, DEFAULT_BASE_URL,
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL,
};
pub use error::ProviderError;
pub use openai::OpenAIClient;
pub use secrecy::SecretString;
pub use stream::{delta_channel, DeltaResult, DeltaSender, DeltaStream};
pub use traits::{CompletionClient, ProviderResult};
