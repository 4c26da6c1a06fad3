use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use retort_core::config::ModelConfig;
use retort_core::error::{Result, RetortError};
use retort_core::traits::CompletionClient;
use retort_core::types::{Message, Role};

use crate::parse::extract_json;

/// OpenAI-compatible client. Works with OpenAI, vLLM, Ollama, and Groq;
/// the pipelines were developed against a self-hosted vLLM endpoint.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    async fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<Message>,
        response_format: Option<serde_json::Value>,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: config.model_id.clone(),
            messages: messages.iter().map(convert_message).collect(),
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            response_format,
        };

        let mut builder = self.http.post(&url).json(&request);
        if let Some(ref key) = config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RetortError::CompletionRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetortError::CompletionRequest(format!(
                "{status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RetortError::CompletionParse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RetortError::CompletionParse("response carried no content".into()))
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(
        &self,
        config: &ModelConfig,
        messages: Vec<Message>,
    ) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();
        Box::pin(async move { self.chat(&config, messages, None).await })
    }

    fn complete_structured(
        &self,
        config: &ModelConfig,
        messages: Vec<Message>,
        schema: &serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let config = config.clone();
        let format = serde_json::json!({
            "type": "json_schema",
            "json_schema": { "name": "decision", "strict": true, "schema": schema },
        });
        Box::pin(async move {
            let text = self.chat(&config, messages, Some(format)).await?;
            // Some endpoints wrap constrained output in code fences anyway.
            serde_json::from_str(extract_json(&text))
                .map_err(|e| RetortError::StructuredOutput(format!("{e}: {text}")))
        })
    }
}

// Request types

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

fn convert_message(msg: &Message) -> OaiMessage {
    // Tool-role messages carry research/tool evidence; OpenAI's tool role
    // needs call ids we do not track, so they travel as named user messages.
    let role = match msg.role {
        Role::System => "system",
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    };
    OaiMessage {
        role,
        content: msg.content.clone(),
        name: msg.name.clone(),
    }
}

// Response types

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_maps_tool_role_to_named_user() {
        let msg = Message::tool("arXiv results").named("researcher");
        let oai = convert_message(&msg);
        assert_eq!(oai.role, "user");
        assert_eq!(oai.name.as_deref(), Some("researcher"));
    }

    #[test]
    fn chat_response_parses_minimal_payload() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
    }
}
