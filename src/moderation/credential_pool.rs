// Credential pool for quota-limited moderation providers.
//
// Every credential carries a daily quota and an optional cool-down that is set
// when the provider rate-limits it. Counters reset lazily: the first access on
// a new UTC calendar day zeroes usage and clears cool-downs, so no background
// timer is needed.
//
// The pool is shared across every concurrent moderation run via cheap clones
// (Arc inside). Selecting a credential reserves one unit of its quota under the
// same lock that checks usability, so two runs can never both take the last
// unit. The reservation is a `Lease`; settling it records the call's outcome,
// and dropping it unsettled hands the unit back.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

/// Identifier of one credential, e.g. the suffix of its `GEMINI_KEY_*` variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialId(String);

impl CredentialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Source of the current time. Quota days are UTC calendar days.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock UTC time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to simulate day boundaries.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Aggregate health of the pool, for operator display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub total: usize,
    /// Selectable right now.
    pub usable: usize,
    /// Rate-limited and waiting for the next UTC day.
    pub cooling_down: usize,
    /// Daily quota fully spent.
    pub exhausted: usize,
}

struct Credential {
    id: CredentialId,
    secret: String,
    daily_used: u32,
    /// Leases handed out but not yet settled. Never reset by the day rollover,
    /// because those calls are still running.
    in_flight: u32,
    disabled_until: Option<DateTime<Utc>>,
}

impl Credential {
    fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.disabled_until.is_some_and(|until| until > now)
    }

    fn is_usable(&self, daily_quota: u32, now: DateTime<Utc>) -> bool {
        self.daily_used.saturating_add(self.in_flight) < daily_quota && !self.is_cooling_down(now)
    }
}

struct PoolState {
    credentials: Vec<Credential>,
    last_selected: Option<usize>,
    reset_day: NaiveDate,
    /// Bumped on every day rollover so leases from a previous day don't
    /// charge the new day's counters.
    generation: u64,
}

impl PoolState {
    fn reset_if_day_changed(&mut self, today: NaiveDate) -> bool {
        if self.reset_day == today {
            return false;
        }
        for credential in &mut self.credentials {
            credential.daily_used = 0;
            credential.disabled_until = None;
        }
        self.reset_day = today;
        self.generation += 1;
        true
    }
}

struct PoolInner {
    state: Mutex<PoolState>,
    daily_quota: u32,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Success,
    RateLimited,
    Released,
}

impl PoolInner {
    // Every mutation is one critical section, so a poisoned lock still holds
    // consistent counters.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_current(&self, now: DateTime<Utc>) -> MutexGuard<'_, PoolState> {
        let mut state = self.lock();
        if state.reset_if_day_changed(now.date_naive()) {
            info!(day = %state.reset_day, "New UTC day: credential quotas reset");
        }
        state
    }

    fn settle(&self, index: usize, generation: u64, settlement: Settlement) {
        let now = self.clock.now();
        let mut state = self.lock_current(now);
        let same_day = state.generation == generation;
        let Some(credential) = state.credentials.get_mut(index) else {
            return;
        };

        credential.in_flight = credential.in_flight.saturating_sub(1);
        if !same_day {
            return;
        }

        match settlement {
            Settlement::Success => {
                credential.daily_used += 1;
                debug!(
                    credential = %credential.id,
                    used = credential.daily_used,
                    quota = self.daily_quota,
                    "Credential call succeeded"
                );
            }
            Settlement::RateLimited => {
                credential.daily_used += 1;
                let until = next_utc_midnight(now);
                credential.disabled_until = Some(until);
                warn!(
                    credential = %credential.id,
                    until = %until,
                    "Credential rate-limited, cooling down until next UTC midnight"
                );
            }
            Settlement::Released => {}
        }
    }
}

/// The first instant of the UTC day after `now`.
fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map_or(DateTime::<Utc>::MAX_UTC, |midnight| midnight.and_utc())
}

/// One reserved unit of a credential's daily quota.
///
/// Hand it back to the pool with [`CredentialPool::record_success`] or
/// [`CredentialPool::record_rate_limited`]. Dropping it unsettled (timeout,
/// bad reply, cancelled caller) releases the unit without charging the day.
pub struct Lease {
    pool: Arc<PoolInner>,
    index: usize,
    id: CredentialId,
    secret: String,
    generation: u64,
    settled: bool,
}

impl Lease {
    pub fn id(&self) -> &CredentialId {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    fn settle(mut self, settlement: Settlement) {
        self.settled = true;
        self.pool.settle(self.index, self.generation, settlement);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.settled {
            self.pool
                .settle(self.index, self.generation, Settlement::Released);
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Round-robin pool of credentials with daily quotas and rate-limit cool-downs.
#[derive(Clone)]
pub struct CredentialPool {
    inner: Arc<PoolInner>,
}

impl CredentialPool {
    /// Build a pool over `credentials` (id, secret) using the system clock.
    pub fn new(credentials: Vec<(CredentialId, String)>, daily_quota: u32) -> Self {
        Self::with_clock(credentials, daily_quota, Arc::new(SystemClock))
    }

    pub fn with_clock(
        credentials: Vec<(CredentialId, String)>,
        daily_quota: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let credentials = credentials
            .into_iter()
            .map(|(id, secret)| Credential {
                id,
                secret,
                daily_used: 0,
                in_flight: 0,
                disabled_until: None,
            })
            .collect();

        let reset_day = clock.now().date_naive();
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    credentials,
                    last_selected: None,
                    reset_day,
                    generation: 0,
                }),
                daily_quota,
                clock,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn daily_quota(&self) -> u32 {
        self.inner.daily_quota
    }

    /// Reserve the next usable credential, round-robin from just after the
    /// previously selected one. `None` when a full cycle finds nothing usable.
    pub fn select_next(&self) -> Option<Lease> {
        self.select_next_excluding(&[])
    }

    /// Like [`select_next`](Self::select_next), but never picks a credential
    /// listed in `exclude` (the ones already tried in the current run).
    pub fn select_next_excluding(&self, exclude: &[CredentialId]) -> Option<Lease> {
        let now = self.inner.clock.now();
        let quota = self.inner.daily_quota;
        let mut guard = self.inner.lock_current(now);
        let state = &mut *guard;

        let len = state.credentials.len();
        if len == 0 {
            return None;
        }
        let start = state.last_selected.map_or(0, |last| (last + 1) % len);

        for offset in 0..len {
            let index = (start + offset) % len;
            let credential = &mut state.credentials[index];
            if exclude.contains(&credential.id) || !credential.is_usable(quota, now) {
                continue;
            }

            credential.in_flight += 1;
            state.last_selected = Some(index);
            return Some(Lease {
                pool: Arc::clone(&self.inner),
                index,
                id: credential.id.clone(),
                secret: credential.secret.clone(),
                generation: state.generation,
                settled: false,
            });
        }

        None
    }

    /// Count a successful call against the leased credential's daily quota.
    pub fn record_success(&self, lease: Lease) {
        debug_assert!(Arc::ptr_eq(&self.inner, &lease.pool));
        lease.settle(Settlement::Success);
    }

    /// Count a rate-limited call and disable the credential until the next
    /// UTC midnight.
    pub fn record_rate_limited(&self, lease: Lease) {
        debug_assert!(Arc::ptr_eq(&self.inner, &lease.pool));
        lease.settle(Settlement::RateLimited);
    }

    /// Zero all usage and clear cool-downs if the UTC day has changed since
    /// the last access. Selection already does this; calling it is idempotent.
    pub fn reset_if_day_changed(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner.lock().reset_if_day_changed(now.date_naive())
    }

    pub fn status(&self) -> PoolStatus {
        let now = self.inner.clock.now();
        let quota = self.inner.daily_quota;
        let state = self.inner.lock_current(now);

        let mut status = PoolStatus {
            total: state.credentials.len(),
            usable: 0,
            cooling_down: 0,
            exhausted: 0,
        };
        for credential in &state.credentials {
            if credential.is_cooling_down(now) {
                status.cooling_down += 1;
            } else if credential.daily_used >= quota {
                status.exhausted += 1;
            }
            if credential.is_usable(quota, now) {
                status.usable += 1;
            }
        }
        status
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("daily_quota", &self.inner.daily_quota)
            .field("status", &self.status())
            .finish()
    }
}
