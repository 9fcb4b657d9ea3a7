//! Client side of the language-model oracle used for layout classification,
//! vision extraction, column mapping and gambling detection.
//!
//! Every component that needs the oracle takes a `&dyn Oracle`; there is no
//! process-wide client.
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::logging::ORACLE_CALLS;

pub mod prompts;

const MAX_HTTP_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("oracle returned empty content")]
    EmptyContent,

    #[error("oracle output is not valid JSON ({source}): {content}")]
    MalformedModelOutput {
        content: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited after {retries} retries")]
    RateLimited { retries: u32 },
}

/// One oracle call: a system instruction, a user message and optionally an
/// image to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub instruction: String,
    pub message: String,
    /// `data:` or http(s) URL of a page image.
    pub image_url: Option<String>,
    /// Ask the backend to constrain output to a JSON object.
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
}

impl OracleRequest {
    pub fn text(instruction: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            message: message.into(),
            image_url: None,
            json_mode: false,
            max_tokens: None,
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

pub trait Oracle: Send + Sync {
    /// Returns the raw text the model produced.
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

impl<T: Oracle + ?Sized> Oracle for &T {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        (**self).complete(request)
    }
}

impl<T: Oracle + ?Sized> Oracle for Box<T> {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        (**self).complete(request)
    }
}

/// Calls the oracle and deserialises its answer as JSON, tolerating a
/// markdown code fence around it.
pub fn complete_json<T: DeserializeOwned>(
    oracle: &dyn Oracle,
    request: &OracleRequest,
) -> Result<T, OracleError> {
    let content = oracle.complete(request)?;
    let stripped = strip_code_fence(&content);
    if stripped.is_empty() {
        return Err(OracleError::EmptyContent);
    }
    serde_json::from_str(stripped).map_err(|source| {
        warn!(target: ORACLE_CALLS, %source, "malformed oracle output");
        OracleError::MalformedModelOutput {
            content: content.clone(),
            source,
        }
    })
}

/// Strips a surrounding ```` ```json ```` or ```` ``` ```` fence.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) if rest[..newline].chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[newline + 1..]
        }
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint.
/// Retries 429 and 5xx answers with exponential backoff.
#[derive(Clone)]
pub struct OpenAiOracle {
    client: Client,
    config: OracleConfig,
}

impl std::fmt::Debug for OpenAiOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiOracle")
            .field("base_url", &self.config.base_url)
            .field("chat_model", &self.config.chat_model)
            .field("vision_model", &self.config.vision_model)
            .finish_non_exhaustive()
    }
}

impl OpenAiOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn body<'a>(&'a self, request: &OracleRequest) -> ChatRequest<'a> {
        let user_content = match &request.image_url {
            Some(url) => json!([
                { "type": "text", "text": request.message },
                { "type": "image_url", "image_url": { "url": url } },
            ]),
            None => Value::String(request.message.clone()),
        };
        let mut messages = Vec::with_capacity(2);
        if !request.instruction.is_empty() {
            messages.push(json!({ "role": "system", "content": request.instruction }));
        }
        messages.push(json!({ "role": "user", "content": user_content }));

        let model = if request.image_url.is_some() {
            &self.config.vision_model
        } else {
            &self.config.chat_model
        };

        ChatRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            response_format: request
                .json_mode
                .then(|| json!({ "type": "json_object" })),
        }
    }
}

impl Oracle for OpenAiOracle {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let body = self.body(request);
        let mut last_error: Option<OracleError> = None;

        for attempt in 0..MAX_HTTP_ATTEMPTS {
            if attempt > 0 {
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    target: ORACLE_CALLS,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "oracle call failed, retrying"
                );
                std::thread::sleep(delay);
            }

            let response = match self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
            {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(OracleError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let message = response.text().unwrap_or_default();
                warn!(target: ORACLE_CALLS, status = status.as_u16(), "oracle unavailable");
                last_error = Some(OracleError::Api {
                    status: status.as_u16(),
                    message,
                });
                continue;
            }
            if !status.is_success() {
                let text = response.text().unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                    .map(|e| e.error.message)
                    .unwrap_or(text);
                return Err(OracleError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: ChatResponse = response.json()?;
            if let Some(usage) = &parsed.usage {
                debug!(
                    target: ORACLE_CALLS,
                    model = body.model,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "oracle call succeeded"
                );
            }
            return parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or(OracleError::EmptyContent);
        }

        Err(last_error.unwrap_or(OracleError::RateLimited {
            retries: MAX_HTTP_ATTEMPTS,
        }))
    }
}
