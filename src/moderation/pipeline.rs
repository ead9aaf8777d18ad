// The decision pipeline: walk provider stages until one decides.
//
// Stages run strictly in order under one overall budget. The primary stage
// tries up to `max_attempts` distinct pooled credentials, the secondary stage
// makes one call on the single-key fallback, and when the list runs out the
// message is allowed through unmodified (fail-open). Nothing here returns an
// error to the caller: every failure is logged and turns into "try the next
// stage".

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::budget::Budget;
use super::credential_pool::{CredentialId, CredentialPool};
use super::error::ModerationError;
use super::gemini::GeminiBackend;
use super::groq::GroqBackend;
use super::provider::{PooledProvider, SingleKeyProvider};
use super::traits::{Decision, ModerationProvider, ProviderOutcome};
use crate::config::Config;
use crate::output::preview;

/// User-facing rejection text for blocked messages.
pub const BLOCKED_MESSAGE: &str =
    "This message was blocked due to inappropriate language. Kindly communicate respectfully.";

/// One message to moderate, with the caller's timing limits.
#[derive(Debug, Clone)]
pub struct ModerationRequest {
    pub text: String,
    /// Upper bound for each primary-stage attempt.
    pub per_attempt_timeout: Duration,
    /// How many distinct pooled credentials the primary stage may try.
    pub max_attempts: u32,
    /// Total wall-clock allowance for the whole decision.
    pub remaining_budget: Duration,
}

impl ModerationRequest {
    pub fn new(
        text: impl Into<String>,
        per_attempt_timeout: Duration,
        max_attempts: u32,
        remaining_budget: Duration,
    ) -> Self {
        Self {
            text: text.into(),
            per_attempt_timeout,
            max_attempts,
            remaining_budget,
        }
    }
}

/// The pipeline's final answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Rewrite(String),
    Block,
    /// Every stage failed; the original text goes out unverified.
    FailOpen,
}

impl From<Decision> for Verdict {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Safe => Verdict::Safe,
            Decision::Rewrite(text) => Verdict::Rewrite(text),
            Decision::Block => Verdict::Block,
        }
    }
}

impl Verdict {
    /// The text to persist and broadcast, or `None` if the message is blocked.
    pub fn outgoing_text<'a>(&'a self, original: &'a str) -> Option<&'a str> {
        match self {
            Verdict::Safe | Verdict::FailOpen => Some(original),
            Verdict::Rewrite(text) => Some(text),
            Verdict::Block => None,
        }
    }

    /// Whether a provider actually judged the message.
    pub fn is_verified(&self) -> bool {
        !matches!(self, Verdict::FailOpen)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Safe => "SAFE",
            Verdict::Rewrite(_) => "REWRITE",
            Verdict::Block => "BLOCK",
            Verdict::FailOpen => "FAIL_OPEN",
        }
    }
}

/// Audit record of one network attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub stage: &'static str,
    pub provider: String,
    pub credential: Option<CredentialId>,
    pub elapsed: Duration,
    pub outcome: ProviderOutcome,
}

/// Verdict plus everything that led to it.
#[derive(Debug, Clone)]
pub struct ModerationOutcome {
    pub verdict: Verdict,
    pub attempts: Vec<AttemptRecord>,
    /// Provider that produced the verdict; `None` for fail-open and blank input.
    pub source: Option<String>,
    pub elapsed: Duration,
}

fn record_attempt(attempts: &mut Vec<AttemptRecord>, record: AttemptRecord) {
    info!(
        stage = record.stage,
        provider = %record.provider,
        credential = record.credential.as_ref().map(CredentialId::as_str),
        elapsed_ms = record.elapsed.as_millis() as u64,
        outcome = record.outcome.label(),
        "Moderation attempt"
    );
    attempts.push(record);
}

/// One ordered step of the fallback chain.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn provider_id(&self) -> &str;

    /// Try to reach a decision within `budget`, appending every network
    /// attempt to `attempts`.
    async fn run(
        &self,
        request: &ModerationRequest,
        budget: &Budget,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Result<Decision, ModerationError>;
}

/// Up to `max_attempts` distinct credentials from a pooled provider.
pub struct PrimaryStage {
    provider: Arc<PooledProvider>,
}

impl PrimaryStage {
    pub fn new(provider: Arc<PooledProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Stage for PrimaryStage {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn provider_id(&self) -> &str {
        self.provider.id()
    }

    async fn run(
        &self,
        request: &ModerationRequest,
        budget: &Budget,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Result<Decision, ModerationError> {
        let mut tried: Vec<CredentialId> = Vec::new();
        let mut last_error = ModerationError::CredentialExhausted;

        for _ in 0..request.max_attempts {
            if budget.is_exhausted() {
                return Err(ModerationError::BudgetExceeded);
            }

            let timeout = budget.cap(request.per_attempt_timeout);
            let started = Instant::now();
            let Some(attempt) = self
                .provider
                .call_excluding(&request.text, timeout, &tried)
                .await
            else {
                return Err(ModerationError::CredentialExhausted);
            };

            record_attempt(
                attempts,
                AttemptRecord {
                    stage: self.name(),
                    provider: self.provider.id().to_string(),
                    credential: Some(attempt.credential.clone()),
                    elapsed: started.elapsed(),
                    outcome: attempt.outcome.clone(),
                },
            );

            match attempt.outcome.into_reply(self.provider.id()) {
                Ok(reply) => return Ok(Decision::from_reply(&request.text, &reply)),
                Err(error) => last_error = error,
            }
            tried.push(attempt.credential);
        }

        Err(last_error)
    }
}

/// One call on a fallback provider, its timeout capped at a fixed ceiling.
pub struct SecondaryStage {
    provider: Arc<dyn ModerationProvider>,
    ceiling: Duration,
}

impl SecondaryStage {
    pub fn new(provider: Arc<dyn ModerationProvider>, ceiling: Duration) -> Self {
        Self { provider, ceiling }
    }
}

#[async_trait]
impl Stage for SecondaryStage {
    fn name(&self) -> &'static str {
        "secondary"
    }

    fn provider_id(&self) -> &str {
        self.provider.id()
    }

    async fn run(
        &self,
        request: &ModerationRequest,
        budget: &Budget,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Result<Decision, ModerationError> {
        if budget.is_exhausted() {
            return Err(ModerationError::BudgetExceeded);
        }

        let timeout = budget.cap(self.ceiling);
        let started = Instant::now();
        let outcome = self.provider.call(&request.text, timeout).await;

        let credential = match &outcome {
            ProviderOutcome::RateLimited(id) => Some(id.clone()),
            _ => self.provider.credential().cloned(),
        };
        record_attempt(
            attempts,
            AttemptRecord {
                stage: self.name(),
                provider: self.provider.id().to_string(),
                credential,
                elapsed: started.elapsed(),
                outcome: outcome.clone(),
            },
        );

        let reply = outcome.into_reply(self.provider.id())?;
        Ok(Decision::from_reply(&request.text, &reply))
    }
}

/// Ordered fallback chain ending in fail-open.
#[derive(Default)]
pub struct DecisionPipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl DecisionPipeline {
    /// A pipeline with no stages; it answers `FailOpen` for every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage after the existing ones.
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// The production chain: Gemini over `pool`, then Groq if a key is set.
    ///
    /// Stages without credentials are left out; with none at all the
    /// pipeline still answers (fail-open).
    pub fn from_config(config: &Config, pool: CredentialPool) -> Result<Self> {
        let mut pipeline = Self::new();

        if pool.is_empty() {
            warn!("No GEMINI_KEY_* credentials configured; primary stage disabled");
        } else {
            let backend = Arc::new(GeminiBackend::new(&config.gemini_api_url, &config.gemini_model)?);
            let provider = Arc::new(PooledProvider::new("gemini", pool, backend));
            pipeline = pipeline.with_stage(PrimaryStage::new(provider));
        }

        match &config.groq_api_key {
            Some(key) => {
                let backend = Arc::new(GroqBackend::new(&config.groq_api_url, &config.groq_model)?);
                let provider = Arc::new(SingleKeyProvider::new(
                    "groq",
                    CredentialId::new("GROQ_API_KEY"),
                    key.clone(),
                    backend,
                ));
                pipeline = pipeline.with_stage(SecondaryStage::new(provider, config.secondary_ceiling));
            }
            None => warn!("GROQ_API_KEY not set; secondary stage disabled"),
        }

        if pipeline.stages.is_empty() {
            warn!("No moderation providers configured; every message will fail open");
        }
        Ok(pipeline)
    }

    /// Names of the configured stages, in order.
    pub fn stage_names(&self) -> Vec<(&'static str, &str)> {
        self.stages
            .iter()
            .map(|stage| (stage.name(), stage.provider_id()))
            .collect()
    }

    /// Decide what happens to `request.text`.
    pub async fn moderate(&self, request: &ModerationRequest) -> Verdict {
        self.moderate_with_trace(request).await.verdict
    }

    /// Like [`moderate`](Self::moderate), also returning the attempt trail.
    pub async fn moderate_with_trace(&self, request: &ModerationRequest) -> ModerationOutcome {
        let budget = Budget::start(request.remaining_budget);
        let mut attempts = Vec::new();

        if request.text.trim().is_empty() {
            return ModerationOutcome {
                verdict: Verdict::Safe,
                attempts,
                source: None,
                elapsed: budget.elapsed(),
            };
        }
        debug!(text_preview = %preview(&request.text, 50), "Moderating message");

        for stage in &self.stages {
            if budget.is_exhausted() {
                warn!(
                    stage = stage.name(),
                    error = %ModerationError::BudgetExceeded,
                    "Skipping remaining stages"
                );
                break;
            }

            match stage.run(request, &budget, &mut attempts).await {
                Ok(decision) => {
                    let verdict = Verdict::from(decision);
                    info!(
                        stage = stage.name(),
                        provider = stage.provider_id(),
                        decision = verdict.label(),
                        elapsed_ms = budget.elapsed().as_millis() as u64,
                        "Moderation decided"
                    );
                    return ModerationOutcome {
                        verdict,
                        attempts,
                        source: Some(stage.provider_id().to_string()),
                        elapsed: budget.elapsed(),
                    };
                }
                Err(error) => {
                    warn!(stage = stage.name(), error = %error, "Stage failed, falling back");
                }
            }
        }

        warn!(
            decision = Verdict::FailOpen.label(),
            attempts = attempts.len(),
            elapsed_ms = budget.elapsed().as_millis() as u64,
            "Message allowed without verification"
        );
        ModerationOutcome {
            verdict: Verdict::FailOpen,
            attempts,
            source: None,
            elapsed: budget.elapsed(),
        }
    }
}
