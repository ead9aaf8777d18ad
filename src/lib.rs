// Civil: moderation for outgoing chat messages.
//
// This is the library root. The moderation module holds the decision
// pipeline; everything else is configuration and operator tooling around it.

pub mod config;
pub mod moderation;
pub mod output;
pub mod probe;
pub mod status;
