//! Chat-completion client.
//!
//! [`LlmClient`] is the seam between the stages and the network. The
//! production implementation talks to any OpenAI-compatible endpoint with a
//! blocking HTTP client; tests substitute a mock.

use crate::{
    config::{API_KEY_ENV, ApiKey, Config},
    error::{Error, Result},
};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const MAX_ERROR_BODY: usize = 2_000;

/// One request to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Instruction sent as the system message
    pub system: String,
    /// Prompt sent as the user message
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Creates a request using the configured sampling settings.
    #[must_use]
    pub fn new(config: &Config, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: config.temperature,
            max_tokens: config.max_response_tokens,
        }
    }
}

/// A text-generation service.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
pub trait LlmClient {
    /// Sends one request and returns the generated text.
    ///
    /// # Errors
    ///
    /// Returns a request error on transport, authentication, rate limit or
    /// HTTP failures, and a parse error if the response has no content.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug)]
pub struct OpenAiClient {
    client: Client,
    api_key: Option<ApiKey>,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    /// Creates a client from configuration.
    ///
    /// A missing API key is reported by [`LlmClient::complete`], so stages
    /// that make no request can share the client.
    ///
    /// # Errors
    ///
    /// Returns a request error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }

    /// Returns the model this client requests.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl LlmClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = request.prompt.len()))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::missing_credential(API_KEY_ENV))?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!("POST {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key.expose())
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| Error::parse(format!("response is not a chat completion: {e}")))?;

        extract_content(parsed)
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::request(format!("authentication rejected ({status}); check the API key"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            Error::request(format!("rate limited ({status}): {}", truncate(body)))
        }
        _ => Error::Api {
            status: status.as_u16(),
            body: truncate(body).to_string(),
        },
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn extract_content(response: ChatResponse) -> Result<String> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::parse("response contains no choices"))?;

    if content.trim().is_empty() {
        return Err(Error::parse("response content is empty"));
    }

    Ok(content)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
