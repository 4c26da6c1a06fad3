//! Scripted completion client for node tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use retort_core::config::ModelConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::CompletionClient;
use retort_core::types::Message;

/// Completion client that replays scripted responses and records every call.
pub struct FakeCompletion {
    replies: Mutex<VecDeque<String>>,
    structured: Mutex<VecDeque<serde_json::Value>>,
    pub calls: AtomicUsize,
    pub structured_calls: AtomicUsize,
    /// Message logs observed per call, latest last.
    pub seen: Mutex<Vec<Vec<Message>>>,
    /// Model ids observed per call, latest last.
    pub models: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            structured: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            structured_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            models: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(text.into());
        self
    }

    pub fn structured_reply(self, value: serde_json::Value) -> Self {
        self.structured.lock().unwrap().push_back(value);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst) + self.structured_calls.load(Ordering::SeqCst)
    }
}

impl CompletionClient for FakeCompletion {
    fn complete(
        &self,
        config: &ModelConfig,
        messages: Vec<Message>,
    ) -> BoxFuture<'_, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().unwrap().push(config.model_id.clone());
        self.seen.lock().unwrap().push(messages);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "ok".to_string());
        Box::pin(async move { Ok(reply) })
    }

    fn complete_structured(
        &self,
        config: &ModelConfig,
        messages: Vec<Message>,
        _schema: &serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().unwrap().push(config.model_id.clone());
        self.seen.lock().unwrap().push(messages);
        let value = self.structured.lock().unwrap().pop_front();
        Box::pin(async move {
            value.ok_or_else(|| {
                RetortError::StructuredOutput("no scripted structured reply".to_string())
            })
        })
    }
}

pub fn test_model() -> ModelConfig {
    ModelConfig {
        model_id: "test-model".to_string(),
        api_key: None,
        base_url: "http://localhost:8000/v1".to_string(),
        max_tokens: 512,
        temperature: 0.0,
        retry: None,
    }
}
