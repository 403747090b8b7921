//! OpenRouter Provider Implementation
//!
//! Sends each source image to a vision model through OpenRouter's
//! OpenAI-compatible chat-completions endpoint.
//!
//! # Features
//!
//! - Base64 data-URL image payloads with MIME type from the file extension
//! - One HTTP client shared by every model in the priority list
//! - HTTP status and transport failures classified into provider error tags
//!
//! Retries, backoff and model fallback are not done here; the dispatcher
//! owns that policy.
//!
//! # Examples
//!
//! ```no_run
//! use gleaner_provider::OpenRouterProvider;
//!
//! let provider = OpenRouterProvider::new("sk-or-...").unwrap();
//! ```

use crate::ProviderSetupError;
use base64::Engine;
use gleaner_domain::traits::{ExtractionProvider, ProviderRequest};
use gleaner_domain::{Extraction, ProviderError, SourceRef};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default OpenRouter chat-completions endpoint
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default connect timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const REFERER: &str = "https://github.com/your-org/gleaner";
const TITLE: &str = "Gleaner";

/// OpenRouter API provider for vision extraction
pub struct OpenRouterProvider {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

/// Request body for the chat-completions API
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

/// Response from the chat-completions API
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: String,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or the HTTP client cannot
    /// be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderSetupError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderSetupError::Credentials("API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderSetupError::Client(e.to_string()))?;

        Ok(Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
            client,
        })
    }

    /// Use a different endpoint (e.g. a local proxy)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Endpoint requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: ProviderRequest<'_>) -> Result<Extraction, ProviderError> {
        let data_url = encode_image(request.source).await?;

        let body = ChatRequest {
            model: request.provider.as_str(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: &request.prompt.prompt,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            temperature: request.prompt.temperature,
            max_tokens: request.prompt.max_tokens,
        };

        debug!(
            provider = %request.provider,
            item = %request.item,
            "Sending extraction request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let mut err = classify_status(status, &text);
            if let Some(delay) = retry_after {
                err = err.with_retry_after(delay);
            }
            return Err(err);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::server_error(format!("Failed to parse response: {}", e)))?;

        into_extraction(parsed)
    }
}

impl ExtractionProvider for OpenRouterProvider {
    async fn call(&self, request: ProviderRequest<'_>) -> Result<Extraction, ProviderError> {
        self.send(request).await
    }
}

/// MIME type for an image path, by extension
fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Read the asset and build a `data:` URL; unreadable assets are fatal
async fn encode_image(source: &SourceRef) -> Result<String, ProviderError> {
    let bytes = tokio::fs::read(source.path())
        .await
        .map_err(|e| ProviderError::fatal(format!("Failed to read image {}: {}", source, e)))?;

    if bytes.is_empty() {
        return Err(ProviderError::fatal(format!("Image {} is empty", source)));
    }

    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{};base64,{}", mime_type(source.path()), encoded))
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map an HTTP status onto a provider error tag
fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("HTTP {}: {}", status, body);
    match status.as_u16() {
        429 => ProviderError::rate_limited(message),
        408 | 504 => ProviderError::timeout(message),
        400 | 401 | 402 | 403 | 404 | 413 | 422 => ProviderError::bad_request(message),
        _ if status.is_server_error() => ProviderError::server_error(message),
        _ => ProviderError::bad_request(message),
    }
}

/// Map a transport failure onto a provider error tag
fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(format!("Request timed out: {}", err))
    } else if err.is_decode() || err.is_body() {
        ProviderError::server_error(format!("Malformed response: {}", err))
    } else {
        ProviderError::network(format!("Request failed: {}", err))
    }
}

fn into_extraction(response: ChatResponse) -> Result<Extraction, ProviderError> {
    // OpenRouter can report upstream failures inside a 200 body
    if let Some(api_error) = response.error {
        let status = api_error
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        return Err(classify_status(status, &api_error.message));
    }

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ProviderError::server_error("No content in API response"))?;

    Ok(Extraction {
        text,
        model: response.model,
        total_tokens: response.usage.and_then(|usage| usage.total_tokens),
    })
}
