// Shared test doubles: a scripted completion backend and pipeline builders.
//
// The fake backend never touches the network. Each call asks a script what to
// do based on the secret it was called with and the message embedded in the
// prompt, and records the secret so tests can assert who was called.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use civil::moderation::credential_pool::{CredentialId, CredentialPool, ManualClock};
use civil::moderation::pipeline::{
    DecisionPipeline, ModerationRequest, PrimaryStage, SecondaryStage,
};
use civil::moderation::provider::{PooledProvider, SingleKeyProvider};
use civil::moderation::traits::{BackendError, CompletionBackend};

/// What the fake backend does for one call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return the message unchanged.
    Echo,
    /// Return this text.
    Reply(String),
    /// Return the block sentinel.
    Block,
    /// HTTP 429.
    RateLimited,
    /// Never answer.
    Hang,
    /// Wait, then behave like the inner script.
    Delay(Duration, Box<Script>),
    /// HTTP 500.
    ServerError,
    /// A reply with no usable text.
    Malformed,
}

type ScriptFn = dyn Fn(&str, &str) -> Script + Send + Sync;

pub struct FakeBackend {
    name: &'static str,
    script: Box<ScriptFn>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(
        name: &'static str,
        script: impl Fn(&str, &str) -> Script + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Backend that answers every call with the same script.
    pub fn always(name: &'static str, script: Script) -> Arc<Self> {
        Self::new(name, move |_, _| script.clone())
    }

    /// Secrets this backend was called with, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// Pull the user message back out of the rendered moderation prompt.
pub fn message_from_prompt(prompt: &str) -> &str {
    prompt
        .split("\"\"\"\n")
        .nth(1)
        .and_then(|rest| rest.strip_suffix("\n\"\"\""))
        .expect("prompt should embed the message between triple quotes")
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, secret: &str, prompt: &str) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(secret.to_string());
        let message = message_from_prompt(prompt).to_string();
        let mut script = (self.script)(secret, &message);

        loop {
            match script {
                Script::Delay(wait, inner) => {
                    tokio::time::sleep(wait).await;
                    script = *inner;
                }
                Script::Echo => return Ok(message),
                Script::Reply(text) => return Ok(text),
                Script::Block => return Ok("<<BLOCK>>".to_string()),
                Script::RateLimited => return Err(BackendError::RateLimited),
                Script::Hang => std::future::pending::<()>().await,
                Script::ServerError => {
                    return Err(BackendError::Status {
                        status: 500,
                        body: "internal".to_string(),
                    })
                }
                Script::Malformed => {
                    return Err(BackendError::Malformed("no candidate text".to_string()))
                }
            }
        }
    }
}

pub fn manual_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap())
}

/// Pool with keys `1..=count`, secrets `key-1..`.
pub fn pool(count: usize, quota: u32, clock: &ManualClock) -> CredentialPool {
    let credentials = (1..=count)
        .map(|i| (CredentialId::new(i.to_string()), format!("key-{i}")))
        .collect();
    CredentialPool::with_clock(credentials, quota, Arc::new(clock.clone()))
}

pub const SECONDARY_CEILING: Duration = Duration::from_millis(3000);

/// Primary over `pool` with `primary`, then single-key `secondary`.
pub fn pipeline(
    pool: &CredentialPool,
    primary: &Arc<FakeBackend>,
    secondary: &Arc<FakeBackend>,
) -> DecisionPipeline {
    let primary_backend: Arc<dyn CompletionBackend> = primary.clone();
    let secondary_backend: Arc<dyn CompletionBackend> = secondary.clone();

    DecisionPipeline::new()
        .with_stage(PrimaryStage::new(Arc::new(PooledProvider::new(
            "gemini",
            pool.clone(),
            primary_backend,
        ))))
        .with_stage(SecondaryStage::new(
            Arc::new(SingleKeyProvider::new(
                "groq",
                CredentialId::new("GROQ_API_KEY"),
                "groq-key".to_string(),
                secondary_backend,
            )),
            SECONDARY_CEILING,
        ))
}

/// The production timing defaults: 2 attempts x 4.5s inside 12s.
pub fn request(text: &str) -> ModerationRequest {
    ModerationRequest::new(
        text,
        Duration::from_millis(4500),
        2,
        Duration::from_millis(12_000),
    )
}
