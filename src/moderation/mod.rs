// Moderation: decide what happens to an outgoing chat message.
//
// Providers sit behind the ModerationProvider trait so the pipeline never
// knows which vendor it's talking to. The primary provider rotates through a
// pool of quota-limited Gemini keys; the fallback uses a single Groq key. When
// both fail the message is allowed through unmodified and logged as such.

pub mod budget;
pub mod credential_pool;
pub mod error;
pub mod gemini;
pub mod groq;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod traits;
