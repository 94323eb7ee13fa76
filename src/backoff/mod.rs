//! Backoff state machine for chronically failing sources
//!
//! Per-source failure bookkeeping and suppression policy. Two consecutive
//! failures put a source into a week-long cooldown; three failures inside a
//! rolling 30-day window abandon the automated channel entirely
//! (phone-only) until the monthly sweep. This module is the sole authority
//! on cross-run escalation; the scheduler only asks `should_scrape` and
//! obeys the answer.

use crate::storage::{
    BackoffStats, BackoffUpdate, CounterChange, SourceRecord, SourceStatus, Store, StorageResult,
};
use chrono::{DateTime, Duration, Utc};

/// Days a cooldown suppression lasts
pub const COOLDOWN_DAYS: i64 = 7;

/// Consecutive failures that trigger a cooldown
pub const MAX_CONSECUTIVE_FAILURES: u32 = 2;

/// Failures within the rolling window that trigger phone-only
pub const MAX_FAILURES_IN_30_DAYS: u32 = 3;

/// Length of the rolling failure window in days
pub const FAILURE_WINDOW_DAYS: i64 = 30;

/// Whether a source may be scraped right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeDecision {
    Allow,
    Skip { reason: SkipReason },
}

/// Why a source was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Automated channel abandoned until the monthly reset
    PhoneOnly,

    /// Cooling down; days remaining until eligible again
    CoolingDown { days_remaining: i64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PhoneOnly => write!(f, "phone-only"),
            Self::CoolingDown { days_remaining } => {
                write!(f, "cooling down, {} day(s) remaining", days_remaining)
            }
        }
    }
}

/// Failure escalation policy
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub cooldown_days: i64,
    pub max_consecutive_failures: u32,
    pub max_failures_in_30_days: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            cooldown_days: COOLDOWN_DAYS,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            max_failures_in_30_days: MAX_FAILURES_IN_30_DAYS,
        }
    }
}

impl BackoffPolicy {
    /// Decides whether a source is eligible for a scrape attempt
    ///
    /// Phone-only sources are never allowed. Cooldown expires naturally:
    /// once `now` reaches `cooldown_until` the source is eligible again
    /// without any explicit sweep.
    pub fn should_scrape(&self, source: &SourceRecord, now: DateTime<Utc>) -> ScrapeDecision {
        match source.status {
            SourceStatus::PhoneOnly => ScrapeDecision::Skip {
                reason: SkipReason::PhoneOnly,
            },
            SourceStatus::Cooldown => match source.cooldown_until {
                Some(until) if now < until => {
                    // Round up so "6.5 days left" reads as 7
                    let remaining = until - now;
                    let days_remaining =
                        (remaining.num_seconds() as f64 / 86_400.0).ceil() as i64;
                    ScrapeDecision::Skip {
                        reason: SkipReason::CoolingDown { days_remaining },
                    }
                }
                _ => ScrapeDecision::Allow,
            },
            SourceStatus::Active => ScrapeDecision::Allow,
        }
    }

    /// Records a successful scrape: counters reset, suppression cleared
    ///
    /// Does not clear phone-only implicitly; a phone-only source is never
    /// scraped, so a success can only come from an active or
    /// naturally-expired-cooldown source.
    pub fn record_success(&self, store: &mut dyn Store, source_id: i64) -> StorageResult<()> {
        store.update_source_backoff(
            source_id,
            &BackoffUpdate {
                status: SourceStatus::Active,
                consecutive_failures: CounterChange::Set(0),
                cooldown_until: None,
                failure_at: None,
                prune_before: None,
            },
        )
    }

    /// Records a failed scrape and escalates if thresholds are crossed
    ///
    /// The 30-day check takes priority over the consecutive check: a site
    /// persistently problematic over a month is a structural problem, not
    /// a one-off. Returns the status the source ended up in.
    pub fn record_failure(
        &self,
        store: &mut dyn Store,
        source: &SourceRecord,
        now: DateTime<Utc>,
    ) -> StorageResult<SourceStatus> {
        let consecutive = source.consecutive_failures + 1;
        let window_start = now - Duration::days(FAILURE_WINDOW_DAYS);

        // Including the failure being recorded right now
        let failures_in_window = store.count_recent_failures(source.id, window_start)? + 1;

        let (status, cooldown_until) = if failures_in_window >= self.max_failures_in_30_days {
            (SourceStatus::PhoneOnly, None)
        } else if consecutive >= self.max_consecutive_failures {
            (
                SourceStatus::Cooldown,
                Some(now + Duration::days(self.cooldown_days)),
            )
        } else {
            // Elevated failure count, still active; tracked for visibility
            (source.status, source.cooldown_until)
        };

        store.update_source_backoff(
            source.id,
            &BackoffUpdate {
                status,
                // The store bumps the counter relationally; `consecutive` is
                // only this writer's view, good enough for the escalation
                // decision but not for the stored value
                consecutive_failures: CounterChange::Increment,
                cooldown_until,
                failure_at: Some(now),
                prune_before: Some(window_start),
            },
        )?;

        if status != source.status {
            tracing::warn!(
                "Source {} escalated from {:?} to {:?} ({} consecutive, {} in window)",
                source.name,
                source.status,
                status,
                consecutive,
                failures_in_window
            );
        }

        Ok(status)
    }

    /// Bulk-transitions every phone-only source back to active
    ///
    /// Intended to run once on the first day of each month, independent of
    /// the scheduler's daily loop.
    pub fn monthly_reset(&self, store: &mut dyn Store) -> StorageResult<u32> {
        let reset = store.reset_phone_only_sources()?;
        if reset > 0 {
            tracing::info!("Monthly reset: {} phone-only source(s) reactivated", reset);
        }
        Ok(reset)
    }

    /// Aggregate per-status counts for reporting
    pub fn backoff_stats(&self, store: &dyn Store) -> StorageResult<BackoffStats> {
        store.backoff_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionRule;
    use crate::storage::{NewSource, SqliteStore};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()
    }

    fn seed(store: &mut SqliteStore) -> SourceRecord {
        let id = store
            .insert_source(&NewSource {
                name: "supplier".to_string(),
                url: "https://supplier.example.com".to_string(),
                rule: ExtractionRule::default(),
            })
            .unwrap();
        store.get_source(id).unwrap()
    }

    #[test]
    fn test_active_source_is_allowed() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let source = seed(&mut store);
        let policy = BackoffPolicy::default();

        assert_eq!(policy.should_scrape(&source, now()), ScrapeDecision::Allow);
    }

    #[test]
    fn test_phone_only_never_allowed() {
        let mut source = {
            let mut store = SqliteStore::new_in_memory().unwrap();
            seed(&mut store)
        };
        source.status = SourceStatus::PhoneOnly;

        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.should_scrape(&source, now()),
            ScrapeDecision::Skip {
                reason: SkipReason::PhoneOnly
            }
        );
    }

    #[test]
    fn test_cooldown_reports_days_remaining() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let mut source = seed(&mut store);
        source.status = SourceStatus::Cooldown;
        source.cooldown_until = Some(now() + Duration::days(3));

        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.should_scrape(&source, now()),
            ScrapeDecision::Skip {
                reason: SkipReason::CoolingDown { days_remaining: 3 }
            }
        );
    }

    #[test]
    fn test_expired_cooldown_is_allowed() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let mut source = seed(&mut store);
        source.status = SourceStatus::Cooldown;
        source.cooldown_until = Some(now() - Duration::hours(1));

        let policy = BackoffPolicy::default();
        assert_eq!(policy.should_scrape(&source, now()), ScrapeDecision::Allow);
    }

    #[test]
    fn test_failures_accumulate_until_success_resets() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let source = seed(&mut store);
        let policy = BackoffPolicy::default();

        policy.record_failure(&mut store, &source, now()).unwrap();
        let after_one = store.get_source(source.id).unwrap();
        assert_eq!(after_one.consecutive_failures, 1);
        assert_eq!(after_one.status, SourceStatus::Active);

        policy.record_success(&mut store, source.id).unwrap();
        let reset = store.get_source(source.id).unwrap();
        assert_eq!(reset.consecutive_failures, 0);
        assert_eq!(reset.status, SourceStatus::Active);
        assert!(reset.cooldown_until.is_none());
    }

    #[test]
    fn test_stale_snapshot_does_not_lose_increments() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let source = seed(&mut store);
        let policy = BackoffPolicy::default();

        // Both calls see the same record with consecutive_failures == 0,
        // as two racing workers would; the stored counter must still
        // reach 2
        policy.record_failure(&mut store, &source, now()).unwrap();
        policy
            .record_failure(&mut store, &source, now() + Duration::minutes(1))
            .unwrap();

        assert_eq!(store.get_source(source.id).unwrap().consecutive_failures, 2);
    }

    #[test]
    fn test_two_consecutive_failures_enter_cooldown() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let source = seed(&mut store);
        let policy = BackoffPolicy::default();

        policy.record_failure(&mut store, &source, now()).unwrap();
        let source = store.get_source(source.id).unwrap();
        let status = policy
            .record_failure(&mut store, &source, now() + Duration::hours(1))
            .unwrap();

        assert_eq!(status, SourceStatus::Cooldown);
        let updated = store.get_source(source.id).unwrap();
        assert_eq!(updated.status, SourceStatus::Cooldown);
        assert_eq!(
            updated.cooldown_until,
            Some(now() + Duration::hours(1) + Duration::days(7))
        );
    }

    #[test]
    fn test_three_failures_in_window_go_phone_only() {
        // Non-consecutive failures on days 1, 10, and 25 of a month
        let mut store = SqliteStore::new_in_memory().unwrap();
        let source = seed(&mut store);
        let policy = BackoffPolicy::default();
        let day = |d| Utc.with_ymd_and_hms(2025, 3, d, 9, 0, 0).unwrap();

        policy.record_failure(&mut store, &source, day(1)).unwrap();
        policy.record_success(&mut store, source.id).unwrap();

        let source = store.get_source(source.id).unwrap();
        policy.record_failure(&mut store, &source, day(10)).unwrap();
        policy.record_success(&mut store, source.id).unwrap();

        let source = store.get_source(source.id).unwrap();
        let status = policy.record_failure(&mut store, &source, day(25)).unwrap();

        assert_eq!(status, SourceStatus::PhoneOnly);
        assert_eq!(
            store.get_source(source.id).unwrap().status,
            SourceStatus::PhoneOnly
        );
    }

    #[test]
    fn test_window_check_takes_priority_over_cooldown() {
        // The 3rd failure is also the 2nd consecutive one: both conditions
        // hold simultaneously and phone-only must win
        let mut store = SqliteStore::new_in_memory().unwrap();
        let source = seed(&mut store);
        let policy = BackoffPolicy::default();
        let day = |d| Utc.with_ymd_and_hms(2025, 3, d, 9, 0, 0).unwrap();

        policy.record_failure(&mut store, &source, day(1)).unwrap();
        policy.record_success(&mut store, source.id).unwrap();

        let source = store.get_source(source.id).unwrap();
        policy.record_failure(&mut store, &source, day(20)).unwrap();

        let source = store.get_source(source.id).unwrap();
        assert_eq!(source.consecutive_failures, 1);
        let status = policy.record_failure(&mut store, &source, day(21)).unwrap();

        assert_eq!(status, SourceStatus::PhoneOnly);
        assert!(store.get_source(source.id).unwrap().cooldown_until.is_none());
    }

    #[test]
    fn test_old_failures_fall_out_of_window() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let source = seed(&mut store);
        let policy = BackoffPolicy::default();

        // Two failures long ago, outside the 30-day window by the time of
        // the third
        let long_ago = now() - Duration::days(40);
        policy.record_failure(&mut store, &source, long_ago).unwrap();
        policy.record_success(&mut store, source.id).unwrap();
        let source = store.get_source(source.id).unwrap();
        policy
            .record_failure(&mut store, &source, long_ago + Duration::days(1))
            .unwrap();
        policy.record_success(&mut store, source.id).unwrap();

        let source = store.get_source(source.id).unwrap();
        let status = policy.record_failure(&mut store, &source, now()).unwrap();

        // Only 1 failure in the trailing 30 days, 1 consecutive: no escalation
        assert_eq!(status, SourceStatus::Active);
    }

    #[test]
    fn test_monthly_reset_only_touches_phone_only() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let policy = BackoffPolicy::default();

        let a = store
            .insert_source(&NewSource {
                name: "a".to_string(),
                url: "https://a.example.com".to_string(),
                rule: ExtractionRule::default(),
            })
            .unwrap();
        let b = store
            .insert_source(&NewSource {
                name: "b".to_string(),
                url: "https://b.example.com".to_string(),
                rule: ExtractionRule::default(),
            })
            .unwrap();

        store
            .update_source_backoff(
                a,
                &BackoffUpdate {
                    status: SourceStatus::PhoneOnly,
                    consecutive_failures: CounterChange::Set(3),
                    cooldown_until: None,
                    failure_at: None,
                    prune_before: None,
                },
            )
            .unwrap();
        store
            .update_source_backoff(
                b,
                &BackoffUpdate {
                    status: SourceStatus::Cooldown,
                    consecutive_failures: CounterChange::Set(2),
                    cooldown_until: Some(now() + Duration::days(5)),
                    failure_at: None,
                    prune_before: None,
                },
            )
            .unwrap();

        let reset = policy.monthly_reset(&mut store).unwrap();
        assert_eq!(reset, 1);

        let a = store.get_source(a).unwrap();
        assert_eq!(a.status, SourceStatus::Active);
        assert_eq!(a.consecutive_failures, 0);

        let b = store.get_source(b).unwrap();
        assert_eq!(b.status, SourceStatus::Cooldown);
        assert_eq!(b.consecutive_failures, 2);
    }
}
