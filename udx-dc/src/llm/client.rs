// Generative Model Client
//
// Concept: Thin HTTP client for the generateContent endpoint used by both
// the spine Tier-3 escalator and the gatekeeper. Supports a text path and a
// vision path (inline base64 image). Rate limited; callers decide what an
// error means (fail-soft fallback for the spine, fail-closed review for the
// gatekeeper).

use crate::config::LlmCredentials;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sqlx::{Pool, Sqlite};
use std::num::NonZeroU32;
use std::time::Duration;
use udx_common::config::TomlConfig;

/// generateContent response envelope
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
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
    #[serde(default)]
    text: String,
}

/// Client for the generative model endpoint
pub struct LlmClient {
    /// HTTP client with configured timeouts
    client: Client,
    /// Base URL of the model service
    base_url: String,
    /// API key, sent as a query parameter
    api_key: String,
    /// Model identifier
    model: String,
    /// Rate limiter: 1 request per second
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl LlmClient {
    /// Create a client from resolved credentials
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be built (should not happen with
    /// valid config)
    pub fn new(credentials: LlmCredentials) -> Self {
        let client = Client::builder()
            .user_agent(udx_common::config::get_user_agent())
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        let rate_limiter =
            RateLimiter::direct(Quota::per_second(NonZeroU32::new(1).expect("1 is non-zero")));

        Self {
            client,
            base_url: credentials.base_url,
            api_key: credentials.api_key,
            model: credentials.model,
            rate_limiter,
        }
    }

    /// Create a client from configuration sources
    ///
    /// Credential resolution is eager: a missing API key is a configuration
    /// error here, not a per-document failure later.
    pub async fn from_config(db: &Pool<Sqlite>, toml_config: &TomlConfig) -> udx_common::Result<Self> {
        let credentials = crate::config::resolve_llm_credentials(db, toml_config).await?;
        Ok(Self::new(credentials))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Text path: send a prompt, return the model's raw text output
    pub async fn generate_json(&self, prompt: &str) -> LlmResult<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.0,
                "responseMimeType": "application/json"
            }
        });
        self.post_generate(body).await
    }

    /// Vision path: send an inline image plus instructions
    pub async fn generate_json_with_image(
        &self,
        prompt: &str,
        mime_type: &str,
        image_bytes: &[u8],
    ) -> LlmResult<String> {
        let body = json!({
            "contents": [{
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": mime_type,
                            "data": BASE64.encode(image_bytes)
                        }
                    },
                    { "text": prompt }
                ]
            }],
            "generationConfig": {
                "temperature": 0.0,
                "responseMimeType": "application/json"
            }
        });
        self.post_generate(body).await
    }

    async fn post_generate(&self, body: serde_json::Value) -> LlmResult<String> {
        // Wait for a rate limiter permit before touching the network
        self.rate_limiter.until_ready().await;

        let url = self.generate_url();
        tracing::debug!(model = %self.model, "Calling generative model");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("model request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!(
                "model returned status {}: {}",
                status,
                detail.chars().take(300).collect::<String>()
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        extract_text(parsed)
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

/// Pull the first non-empty text part out of the response envelope
fn extract_text(response: GenerateContentResponse) -> LlmResult<String> {
    response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .map(|p| p.text)
        .find(|t| !t.trim().is_empty())
        .ok_or(LlmError::EmptyResponse)
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("failed to parse LLM response: {0}")]
    MalformedResponse(String),
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;
