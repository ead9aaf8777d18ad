use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::moderation::credential_pool::{CredentialId, CredentialPool};
use crate::moderation::gemini::{DEFAULT_GEMINI_API_URL, DEFAULT_GEMINI_MODEL};
use crate::moderation::groq::{DEFAULT_GROQ_API_URL, DEFAULT_GROQ_MODEL};
use crate::moderation::pipeline::ModerationRequest;

/// Prefix of the environment variables holding pooled Gemini keys.
pub const GEMINI_KEY_PREFIX: &str = "GEMINI_KEY_";

pub const DEFAULT_DAILY_QUOTA: u32 = 20;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(4500);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_BUDGET: Duration = Duration::from_millis(12_000);
pub const DEFAULT_SECONDARY_CEILING: Duration = Duration::from_millis(3000);

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
#[derive(Clone)]
pub struct Config {
    /// Pooled Gemini credentials as (variable suffix, key), ordered by name.
    pub gemini_keys: Vec<(CredentialId, String)>,
    pub gemini_daily_quota: u32,
    pub gemini_api_url: String,
    pub gemini_model: String,
    /// Single fallback key; the secondary stage is skipped when unset.
    pub groq_api_key: Option<String>,
    pub groq_api_url: String,
    pub groq_model: String,
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    pub budget: Duration,
    pub secondary_ceiling: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_vars(env::vars())
    }

    /// Build configuration from any set of key/value pairs.
    ///
    /// Blank values are treated as unset. Numeric variables that are present
    /// but don't parse are an error rather than silently falling back.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into().trim().to_string()))
            .filter(|(_, v)| !v.is_empty())
            .collect();

        // BTreeMap iteration gives a stable, name-ordered key list.
        let gemini_keys = vars
            .iter()
            .filter_map(|(name, value)| {
                let suffix = name.strip_prefix(GEMINI_KEY_PREFIX)?;
                Some((CredentialId::new(suffix), value.clone()))
            })
            .collect();

        let gemini_daily_quota = parse_var(&vars, "GEMINI_DAILY_QUOTA", DEFAULT_DAILY_QUOTA)?;
        if gemini_daily_quota == 0 {
            anyhow::bail!("GEMINI_DAILY_QUOTA must be at least 1");
        }
        let max_attempts = parse_var(&vars, "MODERATION_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            anyhow::bail!("MODERATION_MAX_ATTEMPTS must be at least 1");
        }

        let text = |name: &str, default: &str| {
            vars.get(name)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            gemini_keys,
            gemini_daily_quota,
            gemini_api_url: text("GEMINI_API_URL", DEFAULT_GEMINI_API_URL),
            gemini_model: text("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            groq_api_key: vars.get("GROQ_API_KEY").cloned(),
            groq_api_url: text("GROQ_API_URL", DEFAULT_GROQ_API_URL),
            groq_model: text("GROQ_MODEL", DEFAULT_GROQ_MODEL),
            attempt_timeout: parse_millis(
                &vars,
                "MODERATION_ATTEMPT_TIMEOUT_MS",
                DEFAULT_ATTEMPT_TIMEOUT,
            )?,
            max_attempts,
            budget: parse_millis(&vars, "MODERATION_BUDGET_MS", DEFAULT_BUDGET)?,
            secondary_ceiling: parse_millis(
                &vars,
                "MODERATION_SECONDARY_CEILING_MS",
                DEFAULT_SECONDARY_CEILING,
            )?,
        })
    }

    /// Build the process-wide Gemini credential pool.
    pub fn credential_pool(&self) -> CredentialPool {
        CredentialPool::new(self.gemini_keys.clone(), self.gemini_daily_quota)
    }

    /// A moderation request for `text` using the configured timing defaults.
    pub fn request(&self, text: impl Into<String>) -> ModerationRequest {
        ModerationRequest::new(text, self.attempt_timeout, self.max_attempts, self.budget)
    }

    /// Check that at least one provider has a credential.
    /// Moderation still works without one (everything fails open), so
    /// callers decide whether this is fatal.
    pub fn require_any_provider(&self) -> Result<()> {
        if self.gemini_keys.is_empty() && self.groq_api_key.is_none() {
            anyhow::bail!(
                "No moderation credentials configured. Set GEMINI_KEY_1 (and more) \
                 and/or GROQ_API_KEY in your .env file."
            );
        }
        Ok(())
    }
}

fn parse_var<T>(vars: &BTreeMap<String, String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match vars.get(name) {
        Some(value) => value
            .parse()
            .with_context(|| format!("{name} must be a number, got {value:?}")),
        None => Ok(default),
    }
}

fn parse_millis(vars: &BTreeMap<String, String>, name: &str, default: Duration) -> Result<Duration> {
    let millis = parse_var(vars, name, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
