//! HTTP clients for the language models the producer can call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::application::generation::{GenerationError, TextGenerator};
use crate::config::{GenerationConfig, ProviderKind};
use crate::infra::error::InfraError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Build the generator selected by `config.provider`.
pub fn build_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>, InfraError> {
    let client = Client::builder()
        .user_agent(user_agent())
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|err| InfraError::http_client(err.to_string()))?;

    let generator: Arc<dyn TextGenerator> = match config.provider {
        ProviderKind::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                InfraError::configuration("generation.api_key is required for openai")
            })?;
            Arc::new(OpenAiResponsesGenerator {
                client,
                base_url: config.base_url.clone(),
                api_key,
                model: config.model.clone(),
                max_output_tokens: config.max_output_tokens.get(),
            })
        }
        ProviderKind::Local => Arc::new(LocalChatGenerator {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_output_tokens.get(),
        }),
    };
    Ok(generator)
}

fn user_agent() -> &'static str {
    concat!("slopfeed/", env!("CARGO_PKG_VERSION"))
}

/// Hosted model behind the OpenAI Responses API.
pub struct OpenAiResponsesGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<ResponsesOutput>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutput {
    #[serde(default)]
    content: Vec<ResponsesContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAiResponsesGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/responses", self.base_url);
        debug!(target = "slopfeed::generation", %url, model = %self.model, "requesting completion");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&ResponsesRequest {
                model: &self.model,
                input: prompt,
                max_output_tokens: self.max_output_tokens,
            })
            .send()
            .await
            .map_err(request_error)?;

        let body: ResponsesBody = handle(response).await?;
        responses_text(body)
    }
}

fn responses_text(body: ResponsesBody) -> Result<String, GenerationError> {
    let text = body
        .output
        .into_iter()
        .flat_map(|item| item.content)
        .filter(|content| content.kind == "output_text")
        .filter_map(|content| content.text)
        .collect::<Vec<_>>()
        .join("");
    non_empty(text)
}

/// OpenAI-compatible chat-completions server, typically running on the same host.
pub struct LocalChatGenerator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for LocalChatGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(target = "slopfeed::generation", %url, model = %self.model, "requesting completion");

        let mut request = self.client.post(url).json(&ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        });
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(request_error)?;
        let body: ChatBody = handle(response).await?;
        chat_text(body)
    }
}

fn chat_text(body: ChatBody) -> Result<String, GenerationError> {
    let text = body
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    non_empty(text)
}

async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, GenerationError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(request_error)?;
    if !status.is_success() {
        let body: String = String::from_utf8_lossy(&bytes)
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect();
        return Err(GenerationError::Status {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_slice(&bytes)
        .map_err(|err| GenerationError::Request(format!("failed to parse body: {err}")))
}

fn request_error(err: reqwest::Error) -> GenerationError {
    GenerationError::Request(err.to_string())
}

fn non_empty(text: String) -> Result<String, GenerationError> {
    if text.trim().is_empty() {
        Err(GenerationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_text_joins_output_text_items() {
        let body: ResponsesBody = serde_json::from_value(serde_json::json!({
            "output": [
                { "type": "reasoning", "content": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "title: Hello\n" },
                    { "type": "refusal", "refusal": "no" },
                    { "type": "output_text", "text": "self_text: World" }
                ]}
            ]
        }))
        .expect("parse");

        assert_eq!(
            responses_text(body).expect("text"),
            "title: Hello\nself_text: World"
        );
    }

    #[test]
    fn responses_without_text_are_empty() {
        let body: ResponsesBody =
            serde_json::from_value(serde_json::json!({ "output": [] })).expect("parse");
        assert!(matches!(
            responses_text(body),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn chat_text_takes_first_choice() {
        let body: ChatBody = serde_json::from_value(serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "title: First" } },
                { "message": { "role": "assistant", "content": "title: Second" } }
            ]
        }))
        .expect("parse");

        assert_eq!(chat_text(body).expect("text"), "title: First");
    }

    #[test]
    fn chat_with_null_content_is_empty() {
        let body: ChatBody = serde_json::from_value(serde_json::json!({
            "choices": [ { "message": { "role": "assistant", "content": null } } ]
        }))
        .expect("parse");

        assert!(matches!(chat_text(body), Err(GenerationError::EmptyResponse)));
    }
}
