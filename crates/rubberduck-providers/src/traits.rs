//! Completion client trait

use async_trait::async_trait;

use crate::{DeltaStream, ProviderError};

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A single upstream chat-completion provider.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open a streaming completion.
    ///
    /// Sends a system-role message holding `system_prompt` and a user-role
    /// message holding `user_content`. Returns as soon as the provider has
    /// accepted the call; deltas arrive on the returned stream.
    async fn start_completion(
        &self,
        system_prompt: &str,
        user_content: &str,
    ) -> ProviderResult<DeltaStream>;

    /// Get the model identifier
    fn model(&self) -> &str;

    /// Get the provider name
    fn provider(&self) -> &str;
}
