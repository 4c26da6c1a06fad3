use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use retort_core::config::{ModelConfig, RetryConfig};
use retort_core::error::{Result, RetortError};
use retort_core::traits::CompletionClient;
use retort_core::types::Message;

/// A completion client that retries failed requests with exponential backoff.
pub struct RetryingClient<C> {
    inner: C,
    retry_config: RetryConfig,
}

impl<C: CompletionClient> RetryingClient<C> {
    pub fn new(inner: C, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn is_retryable(e: &RetortError) -> bool {
    match e {
        RetortError::CompletionRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl<C: CompletionClient> CompletionClient for RetryingClient<C> {
    fn complete(
        &self,
        config: &ModelConfig,
        messages: Vec<Message>,
    ) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;
            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.inner.complete(&config, messages.clone()).await {
                    Ok(text) => return Ok(text),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying completion request"
                        );
                        tokio::time::sleep(backoff).await;
                        last_err = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(last_err
                .unwrap_or_else(|| RetortError::CompletionRequest("all retries failed".into())))
        })
    }

    fn complete_structured(
        &self,
        config: &ModelConfig,
        messages: Vec<Message>,
        schema: &serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let config = config.clone();
        let schema = schema.clone();
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;
            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self
                    .inner
                    .complete_structured(&config, messages.clone(), &schema)
                    .await
                {
                    Ok(value) => return Ok(value),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying structured completion request"
                        );
                        tokio::time::sleep(backoff).await;
                        last_err = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(last_err
                .unwrap_or_else(|| RetortError::CompletionRequest("all retries failed".into())))
        })
    }
}
