pub mod openai;
pub mod parse;
pub mod retry;

use std::sync::Arc;

use retort_core::config::RetryConfig;
use retort_core::traits::CompletionClient;

pub use openai::OpenAiClient;
pub use parse::extract_json;
pub use retry::RetryingClient;

/// Create a completion client with retry behaviour layered on top.
pub fn create_client(retry_config: RetryConfig) -> Arc<dyn CompletionClient> {
    Arc::new(RetryingClient::new(OpenAiClient::new(), retry_config))
}
