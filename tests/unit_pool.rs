// Unit tests for the credential pool.
//
// Covers round-robin selection, the usability invariant (quota and
// cool-down), lazy UTC-day resets, exclusion of already-tried keys, and
// atomic reservation under concurrent use. Time is driven by a ManualClock.

mod common;

use chrono::{Duration, TimeZone, Utc};

use civil::moderation::credential_pool::{CredentialId, CredentialPool, PoolStatus};

use common::{manual_clock, pool};

fn id(s: &str) -> CredentialId {
    CredentialId::new(s)
}

/// Spend `n` units of the next selected credential.
fn spend(pool: &CredentialPool, n: u32) {
    for _ in 0..n {
        let lease = pool.select_next().expect("a usable credential");
        pool.record_success(lease);
    }
}

// ============================================================
// Selection order
// ============================================================

#[test]
fn selection_rotates_round_robin() {
    let clock = manual_clock();
    let pool = pool(3, 20, &clock);

    let mut order = Vec::new();
    for _ in 0..4 {
        let lease = pool.select_next().unwrap();
        order.push(lease.id().as_str().to_string());
        pool.record_success(lease);
    }
    assert_eq!(order, ["1", "2", "3", "1"]);
}

#[test]
fn lease_exposes_the_matching_secret() {
    let clock = manual_clock();
    let pool = pool(2, 20, &clock);
    let lease = pool.select_next().unwrap();
    assert_eq!(lease.id(), &id("1"));
    assert_eq!(lease.secret(), "key-1");
}

#[test]
fn empty_pool_selects_nothing() {
    let pool = CredentialPool::new(Vec::new(), 20);
    assert!(pool.is_empty());
    assert!(pool.select_next().is_none());
}

#[test]
fn exhausted_credentials_are_skipped() {
    let clock = manual_clock();
    let pool = pool(3, 1, &clock);

    // Uses up "1"; the next scan starts after it.
    spend(&pool, 1);
    let lease = pool.select_next().unwrap();
    assert_eq!(lease.id(), &id("2"));
    pool.record_success(lease);

    let lease = pool.select_next().unwrap();
    assert_eq!(lease.id(), &id("3"));
    pool.record_success(lease);

    assert!(pool.select_next().is_none(), "every credential is at quota");
}

#[test]
fn exclusion_skips_already_tried_credentials() {
    let clock = manual_clock();
    let pool = pool(2, 20, &clock);

    let first = pool.select_next().unwrap();
    let first_id = first.id().clone();
    drop(first);

    let second = pool.select_next_excluding(&[first_id.clone()]).unwrap();
    assert_ne!(second.id(), &first_id);
    let second_id = second.id().clone();
    drop(second);

    assert!(pool
        .select_next_excluding(&[first_id, second_id])
        .is_none());
}

#[test]
fn selection_never_returns_an_unusable_credential() {
    let clock = manual_clock();
    let pool = pool(4, 3, &clock);

    // Rate-limit "2", exhaust "3" and "4" by repeated selection.
    let mut rate_limited = false;
    for _ in 0..20 {
        let Some(lease) = pool.select_next() else { break };
        let current = lease.id().clone();
        assert!(
            !(current == id("2") && rate_limited),
            "cooling-down credential was selected"
        );
        if current == id("2") && !rate_limited {
            pool.record_rate_limited(lease);
            rate_limited = true;
        } else {
            pool.record_success(lease);
        }
    }

    // 1, 3, 4 spent 3 each; 2 is cooling down.
    assert_eq!(
        pool.status(),
        PoolStatus {
            total: 4,
            usable: 0,
            cooling_down: 1,
            exhausted: 3,
        }
    );
}

// ============================================================
// Rate limits and day boundaries
// ============================================================

#[test]
fn rate_limited_credential_stays_disabled_until_next_utc_midnight() {
    let clock = manual_clock(); // 2026-06-01 12:00 UTC
    let pool = pool(1, 20, &clock);

    let lease = pool.select_next().unwrap();
    pool.record_rate_limited(lease);
    assert!(pool.select_next().is_none());

    clock.set(Utc.with_ymd_and_hms(2026, 6, 1, 23, 59, 59).unwrap());
    assert!(pool.select_next().is_none(), "still the same UTC day");

    clock.set(Utc.with_ymd_and_hms(2026, 6, 2, 0, 0, 0).unwrap());
    let lease = pool.select_next().expect("usable again at midnight");
    assert_eq!(lease.id(), &id("1"));
}

#[test]
fn quotas_reset_on_new_utc_day() {
    let clock = manual_clock();
    let pool = pool(2, 2, &clock);
    spend(&pool, 4);
    assert_eq!(pool.status().exhausted, 2);
    assert!(pool.select_next().is_none());

    clock.advance(Duration::hours(12));
    assert_eq!(pool.status().usable, 2);
    assert!(pool.select_next().is_some());
}

#[test]
fn reset_is_idempotent_within_a_day() {
    let clock = manual_clock();
    let pool = pool(1, 5, &clock);
    spend(&pool, 2);

    assert!(!pool.reset_if_day_changed());
    clock.advance(Duration::days(1));
    assert!(pool.reset_if_day_changed());
    assert!(!pool.reset_if_day_changed());
    assert_eq!(pool.status().usable, 1);
}

#[test]
fn dropped_lease_does_not_count_against_quota() {
    let clock = manual_clock();
    let pool = pool(1, 1, &clock);

    // A timed-out call: lease taken, never recorded.
    drop(pool.select_next().unwrap());
    let lease = pool.select_next().expect("unit was handed back");
    pool.record_success(lease);
    assert!(pool.select_next().is_none());
}

// ============================================================
// Concurrency
// ============================================================

#[test]
fn outstanding_leases_reserve_quota() {
    let clock = manual_clock();
    let pool = pool(1, 2, &clock);

    let a = pool.select_next().unwrap();
    let b = pool.select_next().unwrap();
    assert!(
        pool.select_next().is_none(),
        "two in-flight calls already hold the last two units"
    );

    pool.record_success(a);
    pool.record_success(b);
    assert_eq!(pool.status().exhausted, 1);
    assert!(pool.select_next().is_none());
}

#[test]
fn third_call_is_routed_to_another_credential() {
    let clock = manual_clock();
    let pool = pool(2, 3, &clock);

    // Leave "1" with exactly two units remaining.
    let lease = pool.select_next().unwrap();
    assert_eq!(lease.id(), &id("1"));
    pool.record_success(lease);
    let lease = pool.select_next_excluding(&[id("1")]).unwrap();
    pool.record_success(lease);

    let a = pool.select_next_excluding(&[id("2")]).unwrap();
    let b = pool.select_next_excluding(&[id("2")]).unwrap();
    assert_eq!(a.id(), &id("1"));
    assert_eq!(b.id(), &id("1"));

    let c = pool.select_next().unwrap();
    assert_eq!(c.id(), &id("2"), "credential 1 has no units left");
}

#[test]
fn concurrent_threads_never_overshoot_quota() {
    let clock = manual_clock();
    let pool = pool(3, 50, &clock);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let mut won = 0u32;
                for _ in 0..100 {
                    if let Some(lease) = pool.select_next() {
                        pool.record_success(lease);
                        won += 1;
                    }
                }
                won
            })
        })
        .collect();

    let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 150, "exactly quota x credentials calls succeed");
    assert_eq!(pool.status().exhausted, 3);
}

#[tokio::test]
async fn concurrent_tasks_with_two_units_left_end_exactly_at_quota() {
    let clock = manual_clock();
    let pool = pool(1, 3, &clock);
    spend(&pool, 1);

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let lease = pool.select_next()?;
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                pool.record_success(lease);
                Some(())
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_some(), "both calls should get a lease");
    }
    assert_eq!(pool.status().exhausted, 1);
    assert!(pool.select_next().is_none());
}
