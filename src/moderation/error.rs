// Reasons a pipeline stage gives up.
//
// None of these reach the caller; each one is logged and the pipeline moves on
// to the next stage, ending in fail-open.

use thiserror::Error;

use super::credential_pool::CredentialId;
use super::traits::ProviderOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModerationError {
    #[error("no usable credential left in the pool")]
    CredentialExhausted,

    #[error("provider {provider} timed out")]
    ProviderTimeout { provider: String },

    #[error("provider {provider} rate-limited credential {credential}")]
    ProviderRateLimited {
        provider: String,
        credential: CredentialId,
    },

    #[error("provider {provider} returned an unreadable response")]
    ProviderMalformedResponse { provider: String },

    #[error("provider {provider} failed: {detail}")]
    ProviderFailed { provider: String, detail: String },

    #[error("moderation budget exhausted")]
    BudgetExceeded,
}

impl ProviderOutcome {
    /// The reply text of an `Ok` outcome, or the error describing a failed one.
    pub fn into_reply(self, provider: &str) -> Result<String, ModerationError> {
        let provider = provider.to_string();
        match self {
            ProviderOutcome::Ok(reply) => Ok(reply),
            ProviderOutcome::RateLimited(credential) => Err(ModerationError::ProviderRateLimited {
                provider,
                credential,
            }),
            ProviderOutcome::Timeout => Err(ModerationError::ProviderTimeout { provider }),
            ProviderOutcome::MalformedResponse => {
                Err(ModerationError::ProviderMalformedResponse { provider })
            }
            ProviderOutcome::NoCredential => Err(ModerationError::CredentialExhausted),
            ProviderOutcome::OtherError(detail) => {
                Err(ModerationError::ProviderFailed { provider, detail })
            }
        }
    }
}
