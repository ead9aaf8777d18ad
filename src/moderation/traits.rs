// Provider abstractions: the swap-ready seams of the moderation pipeline.
//
// A `CompletionBackend` speaks one vendor's wire format: given a secret and a
// prompt it returns the raw reply text. A `ModerationProvider` wraps a backend
// with credential handling and a hard per-call timeout, and classifies what
// happened as a `ProviderOutcome`. The pipeline only ever sees providers.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::credential_pool::CredentialId;

/// Exact reply token meaning "block this message". Never leaves this layer:
/// replies are turned into a [`Decision`] by [`Decision::from_reply`].
const BLOCK_SENTINEL: &str = "<<BLOCK>>";

/// What a provider made of a moderation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The provider echoed the message back unchanged.
    Safe,
    /// The provider returned a different, acceptable phrasing.
    Rewrite(String),
    /// The provider returned the block sentinel.
    Block,
}

impl Decision {
    /// Classify a provider reply against the original input.
    ///
    /// Both sides are trimmed; the sentinel must match exactly, and any
    /// byte-level difference from the input counts as a rewrite.
    pub fn from_reply(input: &str, reply: &str) -> Self {
        let reply = reply.trim();
        if reply == BLOCK_SENTINEL {
            Decision::Block
        } else if reply == input.trim() {
            Decision::Safe
        } else {
            Decision::Rewrite(reply.to_string())
        }
    }
}

/// The classified result of one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// The backend answered; the payload is its raw reply text.
    Ok(String),
    /// The backend refused the credential for rate or quota reasons.
    RateLimited(CredentialId),
    /// No answer before the deadline; the in-flight request was dropped.
    Timeout,
    /// The backend answered with something we could not read a reply from.
    MalformedResponse,
    /// No credential could be selected, so nothing was sent.
    NoCredential,
    /// Anything else: transport failures, unexpected status codes.
    OtherError(String),
}

impl ProviderOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderOutcome::Ok(_) => "ok",
            ProviderOutcome::RateLimited(_) => "rate_limited",
            ProviderOutcome::Timeout => "timeout",
            ProviderOutcome::MalformedResponse => "malformed",
            ProviderOutcome::NoCredential => "no_credential",
            ProviderOutcome::OtherError(_) => "error",
        }
    }
}

/// Wire-level failure reported by a [`CompletionBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unreadable response: {0}")]
    Malformed(String),
}

/// One vendor's completion API.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short vendor name used in logs, e.g. `"gemini"`.
    fn name(&self) -> &str;

    /// Send `prompt` authenticated with `secret` and return the reply text.
    /// Implementations don't enforce the moderation deadline themselves; the
    /// provider wrapping them cancels the future when time runs out.
    async fn complete(&self, secret: &str, prompt: &str) -> Result<String, BackendError>;
}

/// One bounded call to an external moderation/rewrite capability.
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    /// Stable identifier used in audit logs.
    fn id(&self) -> &str;

    /// The credential every call uses, for providers bound to a single key.
    /// Pooled providers pick a credential per call and report `None`.
    fn credential(&self) -> Option<&CredentialId> {
        None
    }

    /// Ask the provider to moderate `text`, giving up after `timeout`.
    async fn call(&self, text: &str, timeout: Duration) -> ProviderOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_with_surrounding_whitespace_blocks() {
        assert_eq!(Decision::from_reply("anything", "  <<BLOCK>>\n"), Decision::Block);
    }

    #[test]
    fn sentinel_embedded_in_text_is_a_rewrite() {
        assert_eq!(
            Decision::from_reply("x", "reply: <<BLOCK>>"),
            Decision::Rewrite("reply: <<BLOCK>>".to_string())
        );
    }

    #[test]
    fn echo_is_compared_after_trimming_both_sides() {
        assert_eq!(Decision::from_reply("  hi there ", "hi there\n"), Decision::Safe);
    }

    #[test]
    fn case_difference_counts_as_rewrite() {
        assert_eq!(
            Decision::from_reply("hello", "Hello"),
            Decision::Rewrite("Hello".to_string())
        );
    }
}
