use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::Message;

/// Completion service. The one external collaborator every agent node talks to.
///
/// Implementations are injected per graph build, never held as process-wide
/// state, so tests can substitute a scripted fake.
pub trait CompletionClient: Send + Sync + 'static {
    /// Send the message log and receive the assistant's reply text.
    fn complete(
        &self,
        config: &ModelConfig,
        messages: Vec<Message>,
    ) -> BoxFuture<'_, Result<String>>;

    /// Constrained completion: the response must be a JSON object matching
    /// `schema`. Routing, validation, and planning nodes use this to get
    /// machine-parseable decisions.
    fn complete_structured(
        &self,
        config: &ModelConfig,
        messages: Vec<Message>,
        schema: &serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Tool: a named collaborator taking a string and returning a string.
///
/// Tools never error across the node boundary: transient failures are retried
/// internally and a final failure comes back as an error-describing string.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in prompts and logs).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Invoke the tool with a free-text input.
    fn invoke(&self, input: &str) -> BoxFuture<'_, String>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}
