//! Sequential sweep mode
//!
//! Scrapes every eligible source in one pass with a fixed courtesy delay
//! between requests. Used for manual runs and as the fallback while the
//! distributed schedule is still in shadow mode.

use crate::backoff::{BackoffPolicy, ScrapeDecision};
use crate::clock::Clock;
use crate::fetch::PriceFetcher;
use crate::storage::{PriceObservation, Store};
use std::time::Duration;

/// Failure fraction above which the sweep logs a health alert
pub const ALERT_FAILURE_RATE: f64 = 0.2;

/// Outcome counts for one full sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl SweepSummary {
    /// Failures as a fraction of actual attempts (skips excluded)
    pub fn failure_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            f64::from(self.failed) / f64::from(self.attempted)
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.failure_rate() > ALERT_FAILURE_RATE
    }
}

/// Scrapes all sources sequentially with `delay` between requests
///
/// Backoff-suppressed sources are skipped without counting against the
/// health alert. Per-source errors are recorded and do not abort the
/// sweep.
pub async fn run_sweep(
    store: &mut dyn Store,
    fetcher: &PriceFetcher,
    policy: &BackoffPolicy,
    clock: &dyn Clock,
    delay: Duration,
) -> crate::Result<SweepSummary> {
    let sources = store.get_scrapable_sources()?;
    tracing::info!("Starting sweep of {} source(s)", sources.len());

    let mut summary = SweepSummary::default();
    let mut first_fetch = true;

    for source in &sources {
        match policy.should_scrape(source, clock.now()) {
            ScrapeDecision::Skip { reason } => {
                tracing::info!("Skipping {}: {}", source.name, reason);
                summary.skipped += 1;
                continue;
            }
            ScrapeDecision::Allow => {}
        }

        // Delay only between actual fetches, never before the first or
        // after a skip
        if !first_fetch {
            tokio::time::sleep(delay).await;
        }
        first_fetch = false;
        summary.attempted += 1;

        let outcome = fetcher.fetch_with_retry(source).await;
        match outcome.result {
            Ok(quote) => {
                tracing::info!(
                    "Scraped {}: ${:.3} ({} retries)",
                    source.name,
                    quote.price,
                    outcome.retries_used
                );
                // Store write errors are infrastructure trouble, not a
                // source failure; log them and keep sweeping
                let observation = PriceObservation {
                    source_id: source.id,
                    price: quote.price,
                    min_volume_tier: source.rule.target_tier.map(|t| t as u32),
                    source_type: quote.source_type,
                    source_url: source.url.clone(),
                    scraped_at: quote.scraped_at,
                    expires_at: quote.expires_at,
                };
                if let Err(e) = store.insert_price_observation(&observation) {
                    tracing::error!("Failed to persist observation for {}: {}", source.name, e);
                }
                if let Err(e) = policy.record_success(store, source.id) {
                    tracing::error!("Failed to record success for {}: {}", source.name, e);
                }
                summary.succeeded += 1;
            }
            Err(error) => {
                tracing::warn!("Scrape failed for {}: {}", source.name, error);
                if let Err(e) = policy.record_failure(store, source, clock.now()) {
                    tracing::error!("Failed to record failure for {}: {}", source.name, e);
                }
                summary.failed += 1;
            }
        }
    }

    if summary.is_degraded() {
        tracing::warn!(
            "Sweep health alert: {}/{} fetches failed ({:.0}%)",
            summary.failed,
            summary.attempted,
            summary.failure_rate() * 100.0
        );
    }

    tracing::info!(
        "Sweep complete: {} succeeded, {} failed, {} skipped",
        summary.succeeded,
        summary.failed,
        summary.skipped
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::{ScraperConfig, UserAgentConfig};
    use crate::extract::ExtractionRule;
    use crate::storage::{
        BackoffUpdate, CounterChange, NewSource, SourceRecord, SourceStatus, SqliteStore,
        StorageError, StorageResult,
    };
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_fetcher() -> PriceFetcher {
        let scraper = ScraperConfig {
            request_timeout_secs: 5,
            max_retries: 0,
            retry_delay_ms: 1,
            sweep_delay_ms: 1,
        };
        let ua = UserAgentConfig {
            scraper_name: "FuelwatchTest".to_string(),
            scraper_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "test@example.com".to_string(),
        };
        PriceFetcher::new(&scraper, &ua).unwrap()
    }

    fn test_clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap())
    }

    fn insert(store: &mut SqliteStore, name: &str, url: &str) -> i64 {
        store
            .insert_source(&NewSource {
                name: name.to_string(),
                url: url.to_string(),
                rule: ExtractionRule::default(),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_records_successes_and_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Price: $3.45 per gallon"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut store = SqliteStore::new_in_memory().unwrap();
        insert(&mut store, "bad", &format!("{}/bad", server.uri()));
        insert(&mut store, "good", &format!("{}/good", server.uri()));

        let clock = test_clock();
        let summary = run_sweep(
            &mut store,
            &test_fetcher(),
            &BackoffPolicy::default(),
            &clock,
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(store.observation_count().unwrap(), 1);

        // 1 of 2 failed, above the alert threshold
        assert!(summary.is_degraded());
    }

    #[tokio::test]
    async fn test_sweep_skips_suppressed_sources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("$2.99"))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = SqliteStore::new_in_memory().unwrap();
        let suppressed = insert(&mut store, "a-phone-only", &server.uri());
        insert(&mut store, "b-active", &server.uri());

        store
            .update_source_backoff(
                suppressed,
                &BackoffUpdate {
                    status: SourceStatus::PhoneOnly,
                    consecutive_failures: CounterChange::Set(3),
                    cooldown_until: None,
                    failure_at: None,
                    prune_before: None,
                },
            )
            .unwrap();

        let clock = test_clock();
        let summary = run_sweep(
            &mut store,
            &test_fetcher(),
            &BackoffPolicy::default(),
            &clock,
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);

        // Skips never count toward the failure rate
        assert!(!summary.is_degraded());
    }

    /// Delegating store whose observation writes always fail, standing in
    /// for a full disk or a locked database file
    struct ObservationDropStore {
        inner: SqliteStore,
    }

    impl Store for ObservationDropStore {
        fn get_scrapable_sources(&self) -> StorageResult<Vec<SourceRecord>> {
            self.inner.get_scrapable_sources()
        }

        fn get_source(&self, id: i64) -> StorageResult<SourceRecord> {
            self.inner.get_source(id)
        }

        fn insert_source(&mut self, source: &NewSource) -> StorageResult<i64> {
            self.inner.insert_source(source)
        }

        fn source_count(&self) -> StorageResult<u64> {
            self.inner.source_count()
        }

        fn update_source_backoff(&mut self, id: i64, update: &BackoffUpdate) -> StorageResult<()> {
            self.inner.update_source_backoff(id, update)
        }

        fn count_recent_failures(
            &self,
            id: i64,
            since: chrono::DateTime<Utc>,
        ) -> StorageResult<u32> {
            self.inner.count_recent_failures(id, since)
        }

        fn reset_phone_only_sources(&mut self) -> StorageResult<u32> {
            self.inner.reset_phone_only_sources()
        }

        fn backoff_stats(&self) -> StorageResult<crate::storage::BackoffStats> {
            self.inner.backoff_stats()
        }

        fn insert_price_observation(&mut self, _obs: &PriceObservation) -> StorageResult<i64> {
            Err(StorageError::Database("database or disk is full".to_string()))
        }

        fn latest_observation(&self, source_id: i64) -> StorageResult<Option<PriceObservation>> {
            self.inner.latest_observation(source_id)
        }

        fn observation_count(&self) -> StorageResult<u64> {
            self.inner.observation_count()
        }
    }

    #[tokio::test]
    async fn test_store_write_error_does_not_abort_sweep() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("$3.45"))
            .expect(2)
            .mount(&server)
            .await;

        let mut inner = SqliteStore::new_in_memory().unwrap();
        insert(&mut inner, "a", &server.uri());
        insert(&mut inner, "b", &server.uri());
        let mut store = ObservationDropStore { inner };

        let clock = test_clock();
        let summary = run_sweep(
            &mut store,
            &test_fetcher(),
            &BackoffPolicy::default(),
            &clock,
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        // Both sources were still swept despite every persist failing
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(store.inner.observation_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_of_empty_store() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let clock = test_clock();
        let summary = run_sweep(
            &mut store,
            &test_fetcher(),
            &BackoffPolicy::default(),
            &clock,
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        assert_eq!(summary, SweepSummary::default());
        assert!(!summary.is_degraded());
    }

    #[test]
    fn test_failure_rate_thresholds() {
        let ok = SweepSummary {
            attempted: 10,
            succeeded: 8,
            failed: 2,
            skipped: 0,
        };
        // Exactly 20% does not alert
        assert!(!ok.is_degraded());

        let degraded = SweepSummary {
            attempted: 10,
            succeeded: 7,
            failed: 3,
            skipped: 0,
        };
        assert!(degraded.is_degraded());
    }
}
