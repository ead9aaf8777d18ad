// Key probe: check every configured key against its backend.
//
// Sends a tiny prompt on each pooled Gemini key and on the Groq fallback key,
// all at once, and reports which keys work, which are rate-limited, and which
// fail outright. Probes bypass the credential pool: they are diagnostics and
// must not consume the pipeline's quota bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tracing::debug;

use crate::config::Config;
use crate::moderation::credential_pool::CredentialId;
use crate::moderation::gemini::GeminiBackend;
use crate::moderation::groq::GroqBackend;
use crate::moderation::traits::{BackendError, CompletionBackend};
use crate::output::mask_secret;

const PROBE_PROMPT: &str = "Say hello";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Working(String),
    RateLimited,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub provider: &'static str,
    pub credential: CredentialId,
    pub masked_secret: String,
    pub status: ProbeStatus,
}

async fn probe_one(
    provider: &'static str,
    backend: Arc<dyn CompletionBackend>,
    credential: CredentialId,
    secret: String,
) -> ProbeResult {
    let status = match tokio::time::timeout(PROBE_TIMEOUT, backend.complete(&secret, PROBE_PROMPT)).await {
        Err(_) => ProbeStatus::Failed(format!("no answer within {}s", PROBE_TIMEOUT.as_secs())),
        Ok(Ok(reply)) => ProbeStatus::Working(reply),
        Ok(Err(BackendError::RateLimited)) => ProbeStatus::RateLimited,
        Ok(Err(e)) => ProbeStatus::Failed(e.to_string()),
    };
    debug!(provider, credential = %credential, status = ?status, "Probed key");

    ProbeResult {
        provider,
        credential,
        masked_secret: mask_secret(&secret),
        status,
    }
}

/// Probe every configured key concurrently. Results keep configuration order:
/// Gemini keys first, then the Groq key.
pub async fn probe_all(config: &Config) -> Result<Vec<ProbeResult>> {
    let mut probes = Vec::new();

    if !config.gemini_keys.is_empty() {
        let gemini: Arc<dyn CompletionBackend> =
            Arc::new(GeminiBackend::new(&config.gemini_api_url, &config.gemini_model)?);
        for (id, secret) in &config.gemini_keys {
            probes.push(probe_one(
                "gemini",
                Arc::clone(&gemini),
                id.clone(),
                secret.clone(),
            ));
        }
    }

    if let Some(key) = &config.groq_api_key {
        let groq: Arc<dyn CompletionBackend> =
            Arc::new(GroqBackend::new(&config.groq_api_url, &config.groq_model)?);
        probes.push(probe_one(
            "groq",
            groq,
            CredentialId::new("GROQ_API_KEY"),
            key.clone(),
        ));
    }

    Ok(join_all(probes).await)
}
