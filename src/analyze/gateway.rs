//! Model gateway: provider abstraction over the external generative model.
//!
//! A call takes an ordered list of parts (image bytes and text blocks) and returns the
//! model's raw text reply. No retries or timeouts here; the orchestrator owns that policy.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::AiConfig;

/// MIME type declared for every uploaded image.
pub const IMAGE_MIME: &str = "image/jpeg";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// One element of the ordered request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Image { mime_type: String, data: Vec<u8> },
    Text(String),
}

impl Part {
    pub fn jpeg(data: &[u8]) -> Self {
        Part::Image {
            mime_type: IMAGE_MIME.to_string(),
            data: data.to_vec(),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("model gateway unreachable: {0}")]
    Unavailable(String),
    #[error("model gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("model returned no text")]
    EmptyReply,
    #[error("model gateway is disabled")]
    Disabled,
}

impl GatewayError {
    /// Transport failures, timeouts, throttling and server errors may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) | GatewayError::Timeout(_) => true,
            GatewayError::Status { status, .. } => *status == 429 || *status >= 500,
            GatewayError::EmptyReply | GatewayError::Disabled => false,
        }
    }
}

/// Trait object used by the classifier, the reconciler and the HTTP layer.
pub trait ModelGateway: Send + Sync {
    /// Submit one classification call and return the raw reply text.
    fn classify<'a>(
        &'a self,
        parts: &'a [Part],
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynGateway = Arc<dyn ModelGateway>;

/// Factory: build a gateway according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns the deterministic canned mock.
/// * Else if `config.enabled == false`, returns a disabled gateway.
/// * Else builds the configured provider.
pub fn build_gateway_from_config(config: &AiConfig) -> DynGateway {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockGateway::canned());
    }

    if !config.enabled {
        return Arc::new(DisabledGateway);
    }

    match config.provider.as_str() {
        "gemini" => Arc::new(GeminiGateway::new(&config.api_key, &config.model)),
        "mock" => Arc::new(MockGateway::canned()),
        _ => Arc::new(DisabledGateway),
    }
}

// ------------------------------------------------------------
// Gemini provider
// ------------------------------------------------------------

/// Google Gemini `generateContent` provider.
pub struct GeminiGateway {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Inline { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiGateway {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, GEMINI_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        // Per-call timeouts are applied by the orchestrator; this only bounds connection setup.
        let http = reqwest::Client::builder()
            .user_agent("incident-image-analyzer/0.1")
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn classify_impl(&self, parts: &[Part]) -> Result<String, GatewayError> {
        if self.api_key.is_empty() {
            return Err(GatewayError::Disabled);
        }

        let req = build_request(parts);
        let resp = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("unreadable response body: {e}")))?;
        let text = reply_text(&body).ok_or(GatewayError::EmptyReply)?;
        debug!(target: "gateway", reply = %truncate(&text, 200), "gemini reply");
        Ok(text)
    }
}

impl ModelGateway for GeminiGateway {
    fn classify<'a>(
        &'a self,
        parts: &'a [Part],
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + 'a>> {
        Box::pin(self.classify_impl(parts))
    }
    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

fn build_request(parts: &[Part]) -> GenerateRequest {
    let wire = parts
        .iter()
        .map(|p| match p {
            Part::Image { mime_type, data } => WirePart::Inline {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: general_purpose::STANDARD.encode(data),
                },
            },
            Part::Text(t) => WirePart::Text { text: t.clone() },
        })
        .collect();
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: wire,
        }],
        generation_config: GenerationConfig { temperature: 0.2 },
    }
}

/// Concatenate the text parts of the first candidate.
fn reply_text(body: &GenerateResponse) -> Option<String> {
    let content = body.candidates.first()?.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ------------------------------------------------------------
// Disabled + mock gateways
// ------------------------------------------------------------

/// Always fails with `Disabled`; used when the model is switched off in config.
pub struct DisabledGateway;

impl ModelGateway for DisabledGateway {
    fn classify<'a>(
        &'a self,
        _parts: &'a [Part],
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + 'a>> {
        Box::pin(async { Err(GatewayError::Disabled) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic gateway for tests and local runs.
///
/// Scripted replies are served in order; once exhausted, the canned replies are used
/// (image analysis when the request carries an image, description analysis otherwise).
/// Every request is recorded for inspection.
#[derive(Default)]
pub struct MockGateway {
    scripted: Mutex<VecDeque<Result<String, GatewayError>>>,
    canned: bool,
    calls: Mutex<Vec<Vec<Part>>>,
}

pub const CANNED_IMAGE_REPLY: &str = r#"{"disaster_probability": 0.85, "disaster_type": "Urban/Industrial Fire", "disaster_severity": "Medium", "reasoning": "Thick smoke is rising from a building with several people watching nearby (mock)."}"#;
pub const CANNED_DESCRIPTION_REPLY: &str = r#"{"similarity_score": 0.8, "reformulated_description": "Smoke is rising from a building while people gather nearby."}"#;
pub const CANNED_EMPTY_DESCRIPTION_REPLY: &str = r#"{"similarity_score": -1, "reformulated_description": "Smoke is rising from a building while people gather nearby."}"#;

impl MockGateway {
    /// Serves only the given replies; further calls fail with `EmptyReply`.
    pub fn scripted<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, GatewayError>>,
    {
        Self {
            scripted: Mutex::new(replies.into_iter().collect()),
            canned: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for scripting successful replies only.
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(replies.into_iter().map(|s| Ok(s.into())))
    }

    pub fn canned() -> Self {
        Self {
            canned: true,
            ..Self::default()
        }
    }

    /// Requests seen so far, in call order.
    pub fn calls(&self) -> Vec<Vec<Part>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next_reply(&self, parts: &[Part]) -> Result<String, GatewayError> {
        if let Ok(mut c) = self.calls.lock() {
            c.push(parts.to_vec());
        }
        if let Some(r) = self.scripted.lock().ok().and_then(|mut q| q.pop_front()) {
            return r;
        }
        if !self.canned {
            return Err(GatewayError::EmptyReply);
        }
        let has_image = parts.iter().any(|p| matches!(p, Part::Image { .. }));
        let reply = if has_image {
            CANNED_IMAGE_REPLY
        } else if parts
            .iter()
            .any(|p| matches!(p, Part::Text(t) if t.contains("No user description was provided")))
        {
            CANNED_EMPTY_DESCRIPTION_REPLY
        } else {
            CANNED_DESCRIPTION_REPLY
        };
        Ok(reply.to_string())
    }
}

impl ModelGateway for MockGateway {
    fn classify<'a>(
        &'a self,
        parts: &'a [Part],
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + 'a>> {
        let out = self.next_reply(parts);
        Box::pin(async move { out })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
