// Google Gemini completion backend (the pooled primary provider).
//
// Uses the `generateContent` REST method with the key in the
// `x-goog-api-key` header. Free-tier keys are capped per day, which is why
// this backend sits behind the credential pool.
//
// API docs: https://ai.google.dev/api/generate-content

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{BackendError, CompletionBackend};
use crate::output::preview;

pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Gemini `generateContent` client.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("civil/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for Gemini")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, secret: &str, prompt: &str) -> Result<String, BackendError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 128,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", secret)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: preview(&body, 200),
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let reply = extract_reply(body)
            .ok_or_else(|| BackendError::Malformed("no candidate text".to_string()))?;
        debug!(model = %self.model, reply_preview = %preview(&reply, 50), "Gemini replied");
        Ok(reply)
    }
}

/// First candidate's first text part, trimmed. `None` if absent or blank.
fn extract_reply(response: GenerateResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

// --- Gemini request/response types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct ReplyPart {
    text: Option<String>,
}
