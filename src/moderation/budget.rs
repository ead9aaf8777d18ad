// Wall-clock allowance for one moderation decision.
//
// The budget is fixed when a run starts and only ever shrinks. Every stage and
// every attempt asks it how much time is left and caps its own timeout to that,
// so one run can't outlive its caller's deadline by more than scheduling slop.

use std::time::Duration;

use tokio::time::Instant;

/// Stand-in deadline for allowances too large to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Instant,
    deadline: Instant,
}

impl Budget {
    /// Start a budget of `allowance` from now. Allowances past the
    /// representable range are treated as roughly thirty years.
    pub fn start(allowance: Duration) -> Self {
        let started = Instant::now();
        let deadline = started
            .checked_add(allowance)
            .unwrap_or_else(|| started + FAR_FUTURE);
        Self { started, deadline }
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The timeout an attempt may use: `limit`, but never past the deadline.
    pub fn cap(&self, limit: Duration) -> Duration {
        limit.min(self.remaining())
    }
}
