// Groq completion backend (the single-key fallback provider).
//
// Groq exposes an OpenAI-compatible chat completions endpoint. The small
// Llama models sometimes ignore "output only the message" and wrap the answer
// in a preamble, so the reply is unwrapped before it's classified.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{BackendError, CompletionBackend};
use crate::output::preview;

pub const DEFAULT_GROQ_API_URL: &str = "https://api.groq.com";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";

const REWRITE_PREAMBLE: &str = "Here's a rewritten version:";

/// Groq chat completions client.
pub struct GroqBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl GroqBackend {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("civil/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for Groq")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionBackend for GroqBackend {
    fn name(&self) -> &str {
        "groq"
    }

    async fn complete(&self, secret: &str, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/openai/v1/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            max_tokens: 128,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(secret)
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

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        let reply = unwrap_preamble(content.trim());
        if reply.is_empty() {
            return Err(BackendError::Malformed("empty completion".to_string()));
        }
        debug!(model = %self.model, reply_preview = %preview(reply, 50), "Groq replied");
        Ok(reply.to_string())
    }
}

/// Pull the quoted message out of a "Here's a rewritten version:" reply.
/// Replies without the preamble, or without a quoted line, pass through.
fn unwrap_preamble(reply: &str) -> &str {
    if !reply.contains(REWRITE_PREAMBLE) {
        return reply;
    }
    reply
        .lines()
        .map(str::trim)
        .find(|line| line.len() >= 2 && line.starts_with('"') && line.ends_with('"'))
        .map_or(reply, |quoted| &quoted[1..quoted.len() - 1])
}

// --- Groq request/response types ---

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
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}
