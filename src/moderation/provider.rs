// Provider clients: a completion backend plus credentials plus a deadline.
//
// `PooledProvider` draws a credential from a `CredentialPool` for every call
// and settles the lease according to the outcome. `SingleKeyProvider` uses one
// fixed key and keeps no bookkeeping. Both cancel the in-flight request
// exactly at the deadline by dropping its future.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::credential_pool::{CredentialId, CredentialPool};
use super::prompt::moderation_prompt;
use super::traits::{BackendError, CompletionBackend, ModerationProvider, ProviderOutcome};

/// Result of a pooled call: which credential was used, and what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledAttempt {
    pub credential: CredentialId,
    pub outcome: ProviderOutcome,
}

/// Run `backend.complete` with a hard deadline and map failures onto outcomes.
/// Rate limits are returned as `Err` so the caller can attach the credential.
async fn bounded_complete(
    backend: &dyn CompletionBackend,
    secret: &str,
    text: &str,
    timeout: Duration,
) -> Result<ProviderOutcome, BackendError> {
    let prompt = moderation_prompt(text);
    match tokio::time::timeout(timeout, backend.complete(secret, &prompt)).await {
        Err(_elapsed) => Ok(ProviderOutcome::Timeout),
        Ok(Ok(reply)) if reply.trim().is_empty() => Ok(ProviderOutcome::MalformedResponse),
        Ok(Ok(reply)) => Ok(ProviderOutcome::Ok(reply)),
        Ok(Err(BackendError::RateLimited)) => Err(BackendError::RateLimited),
        Ok(Err(BackendError::Malformed(detail))) => {
            debug!(backend = backend.name(), detail = %detail, "Unreadable backend reply");
            Ok(ProviderOutcome::MalformedResponse)
        }
        Ok(Err(other)) => Ok(ProviderOutcome::OtherError(other.to_string())),
    }
}

/// Provider backed by a rotating pool of quota-limited credentials.
pub struct PooledProvider {
    id: String,
    pool: CredentialPool,
    backend: Arc<dyn CompletionBackend>,
}

impl PooledProvider {
    pub fn new(id: impl Into<String>, pool: CredentialPool, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            id: id.into(),
            pool,
            backend,
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Make one call on the next usable credential not in `exclude`.
    ///
    /// Returns `None` without touching the network when no such credential
    /// exists.
    pub async fn call_excluding(
        &self,
        text: &str,
        timeout: Duration,
        exclude: &[CredentialId],
    ) -> Option<PooledAttempt> {
        let lease = self.pool.select_next_excluding(exclude)?;
        let credential = lease.id().clone();

        let result = bounded_complete(self.backend.as_ref(), lease.secret(), text, timeout).await;
        let outcome = match result {
            Ok(ProviderOutcome::Ok(reply)) => {
                self.pool.record_success(lease);
                ProviderOutcome::Ok(reply)
            }
            Ok(other) => {
                // Timeouts and bad replies don't charge the quota.
                drop(lease);
                other
            }
            Err(_rate_limited) => {
                self.pool.record_rate_limited(lease);
                ProviderOutcome::RateLimited(credential.clone())
            }
        };

        Some(PooledAttempt {
            credential,
            outcome,
        })
    }
}

#[async_trait]
impl ModerationProvider for PooledProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, text: &str, timeout: Duration) -> ProviderOutcome {
        match self.call_excluding(text, timeout, &[]).await {
            Some(attempt) => attempt.outcome,
            None => ProviderOutcome::NoCredential,
        }
    }
}

/// Provider with one fixed credential and no quota tracking.
pub struct SingleKeyProvider {
    id: String,
    credential: CredentialId,
    secret: String,
    backend: Arc<dyn CompletionBackend>,
}

impl SingleKeyProvider {
    pub fn new(
        id: impl Into<String>,
        credential: CredentialId,
        secret: String,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            id: id.into(),
            credential,
            secret,
            backend,
        }
    }
}

#[async_trait]
impl ModerationProvider for SingleKeyProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn credential(&self) -> Option<&CredentialId> {
        Some(&self.credential)
    }

    async fn call(&self, text: &str, timeout: Duration) -> ProviderOutcome {
        match bounded_complete(self.backend.as_ref(), &self.secret, text, timeout).await {
            Ok(outcome) => outcome,
            Err(_rate_limited) => ProviderOutcome::RateLimited(self.credential.clone()),
        }
    }
}
