use crate::error::{BackendError, ConfigError, FailureClass};
use crate::generation::GenerationBackend;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const API_KEY_HEADER: &str = "x-goog-api-key";
const GENERATE_CONTENT: &str = "generateContent";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8_192,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

impl From<GenerationSettings> for GenerationConfig {
    fn from(value: GenerationSettings) -> Self {
        Self {
            temperature: value.temperature,
            top_p: value.top_p,
            top_k: value.top_k,
            max_output_tokens: value.max_output_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|method| method == GENERATE_CONTENT)
    }
}

/// Gemini `generateContent` REST backend. The API key travels only in a
/// request header and is never logged.
pub struct GeminiBackend {
    client: Client,
    base_url: Url,
    settings: GenerationSettings,
}

impl GeminiBackend {
    pub fn new(api_key: &str, settings: GenerationSettings, timeout: Duration) -> Result<Self, ConfigError> {
        Self::with_base_url(api_key, settings, timeout, DEFAULT_GEMINI_BASE_URL)
    }

    pub fn with_base_url(
        api_key: &str,
        settings: GenerationSettings,
        timeout: Duration,
        base_url: &str,
    ) -> Result<Self, ConfigError> {
        let mut key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| ConfigError::Endpoint("api key contains invalid characters".to_string()))?;
        key.set_sensitive(true);
        let headers = HeaderMap::from_iter([(HeaderName::from_static(API_KEY_HEADER), key)]);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|error| ConfigError::Endpoint(error.to_string()))?;

        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|error| ConfigError::Endpoint(error.to_string()))?;

        Ok(Self {
            client,
            base_url,
            settings,
        })
    }

    fn model_url(&self, identifier: &str) -> Result<Url, BackendError> {
        let model = identifier.strip_prefix("models/").unwrap_or(identifier);
        self.base_url
            .join(&format!("models/{model}:{GENERATE_CONTENT}"))
            .map_err(|error| BackendError::new(identifier, FailureClass::InvalidRequest, error.to_string()))
    }

    /// Models available to this key that accept `generateContent` requests.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self
                .base_url
                .join("models")
                .map_err(|error| BackendError::new("models", FailureClass::InvalidRequest, error.to_string()))?;
            url.query_pairs_mut().append_pair("pageSize", "1000");
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|error| transport_error("models", &error))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|error| transport_error("models", &error))?;
            if !status.is_success() {
                return Err(status_error("models", status.as_u16(), &body));
            }

            let page: ModelList = serde_json::from_str(&body)
                .map_err(|error| BackendError::new("models", FailureClass::Other, error.to_string()))?;
            models.extend(page.models.into_iter().filter(ModelInfo::supports_generation));

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate(&self, identifier: &str, prompt: &str) -> Result<String, BackendError> {
        let url = self.model_url(identifier)?;
        let payload = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: self.settings.into(),
        };

        debug!(backend = identifier, prompt_bytes = prompt.len(), "sending generateContent");
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| transport_error(identifier, &error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| transport_error(identifier, &error))?;

        if !status.is_success() {
            return Err(status_error(identifier, status.as_u16(), &body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|error| {
            BackendError::new(identifier, FailureClass::Other, format!("invalid response: {error}"))
        })?;
        response_text(identifier, parsed)
    }
}

fn response_text(identifier: &str, response: GenerateResponse) -> Result<String, BackendError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(BackendError::new(
            identifier,
            FailureClass::ContentBlocked,
            format!("prompt blocked: {reason}"),
        ));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(BackendError::new(identifier, FailureClass::Other, "response had no candidates"));
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if !text.trim().is_empty() {
        return Ok(text);
    }

    match candidate.finish_reason.as_deref() {
        Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => Err(
            BackendError::new(identifier, FailureClass::ContentBlocked, format!("answer blocked: {reason}")),
        ),
        reason => Err(BackendError::new(
            identifier,
            FailureClass::Other,
            format!("empty answer (finish reason {})", reason.unwrap_or("unknown")),
        )),
    }
}

fn transport_error(identifier: &str, error: &reqwest::Error) -> BackendError {
    let class = if error.is_timeout() {
        FailureClass::Timeout
    } else if error.is_connect() || error.is_request() || error.is_body() {
        FailureClass::Transient
    } else {
        FailureClass::Other
    };
    BackendError::new(identifier, class, error.to_string())
}

/// Gemini answers an invalid key with 400 rather than 401.
fn status_error(identifier: &str, status: u16, body: &str) -> BackendError {
    let class = if status == 400 && (body.contains("API_KEY_INVALID") || body.contains("API key not valid")) {
        FailureClass::Auth
    } else {
        FailureClass::from_status(status)
    };
    BackendError::new(identifier, class, format!("HTTP {status}: {}", body.trim()))
}
