//! Distributed scrape scheduler
//!
//! The top-level orchestrator: computes per-source run times across the
//! daily window, fires due sources from a single periodic tick, drives the
//! fetch executor / extraction engine / backoff state machine on each
//! firing, and tracks shadow-mode distribution statistics behind a
//! one-time "ready to activate" notification.
//!
//! All state lives in an explicit struct constructed with injected
//! dependencies (store, clock, notifier, fetcher), so multiple instances
//! can coexist in tests without shared globals.

use crate::backoff::{BackoffPolicy, ScrapeDecision};
use crate::clock::Clock;
use crate::fetch::PriceFetcher;
use crate::notify::Notifier;
use crate::schedule::shadow::{ShadowReport, ShadowStats};
use crate::schedule::window::ScheduleWindow;
use crate::storage::{PriceObservation, SourceRecord, Store};
use crate::FuelwatchError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

/// How often due entries are scanned
pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Scheduler operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    /// Observe-only: log intended actions and record distribution
    /// statistics, never touch the network
    Shadow,

    /// Fetch for real
    Active,
}

impl SchedulerMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "shadow" => Some(Self::Shadow),
            "active" => Some(Self::Active),
            _ => None,
        }
    }
}

/// One source's position in the daily schedule (in-memory, rebuilt on
/// every scheduler start)
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub source_id: i64,
    pub name: String,
    pub offset_minutes: i64,
    pub next_run: DateTime<Utc>,
}

/// Snapshot of the scheduler's operational state
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub mode: SchedulerMode,
    pub scheduled_count: usize,
    pub next_few: Vec<(String, DateTime<Utc>)>,
    pub window_start: u32,
    pub window_end: u32,
    pub is_within_window: bool,
}

struct SchedulerState {
    running: bool,
    mode: SchedulerMode,
    entries: HashMap<i64, ScheduleEntry>,
    shadow: ShadowStats,
}

struct SchedulerDeps {
    store: Mutex<Box<dyn Store>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    fetcher: PriceFetcher,
    policy: BackoffPolicy,
    window: ScheduleWindow,
    observation_days: i64,
}

/// The distributed scheduler
pub struct Scheduler {
    deps: Arc<SchedulerDeps>,
    state: Arc<Mutex<SchedulerState>>,
    tick_task: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Creates a scheduler with injected dependencies
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Box<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        fetcher: PriceFetcher,
        window: ScheduleWindow,
        mode: SchedulerMode,
        observation_days: i64,
    ) -> Self {
        let started_at = clock.now();
        Self {
            deps: Arc::new(SchedulerDeps {
                store: Mutex::new(store),
                notifier,
                clock,
                fetcher,
                policy: BackoffPolicy::default(),
                window,
                observation_days,
            }),
            state: Arc::new(Mutex::new(SchedulerState {
                running: false,
                mode,
                entries: HashMap::new(),
                shadow: ShadowStats::new(started_at),
            })),
            tick_task: None,
        }
    }

    /// Loads sources, computes their next runs, and starts the tick loop
    pub fn start(&mut self) -> crate::Result<()> {
        if self.state.lock().unwrap().running {
            return Err(FuelwatchError::AlreadyRunning);
        }

        let sources = self.deps.store.lock().unwrap().get_scrapable_sources()?;
        let now = self.deps.clock.now();

        let mut entries = HashMap::new();
        for source in &sources {
            let offset = self.deps.window.stable_offset(&source.name);
            let jitter = self.deps.window.draw_jitter();
            let next_run = self.deps.window.next_run_at(offset, jitter, now);

            tracing::debug!(
                "Scheduled {} for {} (offset {} min, jitter {} min)",
                source.name,
                next_run,
                offset,
                jitter
            );

            entries.insert(
                source.id,
                ScheduleEntry {
                    source_id: source.id,
                    name: source.name.clone(),
                    offset_minutes: offset,
                    next_run,
                },
            );
        }

        let mode = {
            let mut state = self.state.lock().unwrap();
            state.entries = entries;
            state.shadow = ShadowStats::new(now);
            state.running = true;
            state.mode
        };

        tracing::info!(
            "Scheduler started in {:?} mode with {} source(s), window {:02}:00-{:02}:00",
            mode,
            sources.len(),
            self.deps.window.start_hour,
            self.deps.window.end_hour
        );

        let deps = Arc::clone(&self.deps);
        let state = Arc::clone(&self.state);
        self.tick_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                run_tick(&deps, &state).await;
            }
        }));

        Ok(())
    }

    /// Cancels the tick loop and clears all schedule entries
    ///
    /// In-flight fetches are allowed to complete; their results are
    /// recorded or discarded as they land.
    pub fn stop(&mut self) {
        if let Some(task) = self.tick_task.take() {
            task.abort();
        }

        let mut state = self.state.lock().unwrap();
        if state.running {
            state.running = false;
            state.entries.clear();
            tracing::info!("Scheduler stopped, all timers cleared");
        }
    }

    /// Switches between shadow and active modes
    pub fn set_mode(&self, mode: SchedulerMode) {
        let mut state = self.state.lock().unwrap();
        if state.mode != mode {
            tracing::info!("Scheduler mode changed {:?} -> {:?}", state.mode, mode);
            state.mode = mode;
        }
    }

    /// Current operational snapshot
    pub fn status(&self) -> SchedulerStatus {
        let now = self.deps.clock.now();
        let state = self.state.lock().unwrap();

        let mut next_few: Vec<(String, DateTime<Utc>)> = state
            .entries
            .values()
            .map(|e| (e.name.clone(), e.next_run))
            .collect();
        next_few.sort_by_key(|(_, at)| *at);
        next_few.truncate(5);

        SchedulerStatus {
            is_running: state.running,
            mode: state.mode,
            scheduled_count: state.entries.len(),
            next_few,
            window_start: self.deps.window.start_hour,
            window_end: self.deps.window.end_hour,
            is_within_window: self.deps.window.is_within(now),
        }
    }

    /// Shadow statistics snapshot
    pub fn shadow_report(&self) -> ShadowReport {
        let now = self.deps.clock.now();
        let state = self.state.lock().unwrap();

        ShadowReport {
            executions: state.shadow.executions(),
            hourly: *state.shadow.hourly(),
            quality: state.shadow.quality(),
            elapsed_days: state.shadow.elapsed_days(now),
            ready_to_promote: state.shadow.ready_to_promote(now, self.deps.observation_days),
            notified: state.shadow.notified,
        }
    }

    /// Computes next-run times for a source list without side effects
    ///
    /// Returned entries are sorted ascending by run time. Jitter is drawn
    /// fresh, so repeated previews differ within the jitter bounds.
    pub fn preview_schedule(&self, sources: &[SourceRecord]) -> Vec<(String, DateTime<Utc>)> {
        let now = self.deps.clock.now();
        let mut preview: Vec<(String, DateTime<Utc>)> = sources
            .iter()
            .map(|s| (s.name.clone(), self.deps.window.next_run(&s.name, now)))
            .collect();
        preview.sort_by_key(|(_, at)| *at);
        preview
    }

    /// Runs one tick immediately (the tick loop calls this every minute)
    pub async fn tick_once(&self) {
        run_tick(&self.deps, &self.state).await;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(task) = self.tick_task.take() {
            task.abort();
        }
    }
}

/// Scans all entries, fires the due ones, and reschedules them with fresh
/// jitter for the next day
async fn run_tick(deps: &Arc<SchedulerDeps>, state: &Arc<Mutex<SchedulerState>>) {
    let now = deps.clock.now();

    let (mode, due) = {
        let mut guard = state.lock().unwrap();
        if !guard.running {
            return;
        }
        let mode = guard.mode;

        let mut due = Vec::new();
        for entry in guard.entries.values_mut() {
            if entry.next_run <= now {
                due.push((entry.source_id, entry.name.clone()));
                // Next calendar day, never a second same-day firing
                let jitter = deps.window.draw_jitter();
                entry.next_run = deps.window.next_run_after(entry.offset_minutes, jitter, now);
            }
        }
        (mode, due)
    };

    match mode {
        SchedulerMode::Shadow => {
            let hour = deps.window.hour_of_day(now);
            if !due.is_empty() {
                let mut guard = state.lock().unwrap();
                for (_, name) in &due {
                    tracing::info!("[shadow] would scrape {} now (hour {})", name, hour);
                    guard.shadow.record(hour);
                }
            }
            evaluate_promotion(deps, state, now).await;
        }
        SchedulerMode::Active => {
            // Fires overlap freely: each fetch targets a different remote
            // host and shares no mutable state beyond the store mutex
            let mut tasks = JoinSet::new();
            for (source_id, _) in due {
                let deps = Arc::clone(deps);
                tasks.spawn(async move {
                    process_source(&deps, source_id).await;
                });
            }
            while tasks.join_next().await.is_some() {}
        }
    }
}

/// Fetches one due source and routes the outcome into persistence and the
/// backoff state machine
async fn process_source(deps: &Arc<SchedulerDeps>, source_id: i64) {
    let now = deps.clock.now();

    let source = match deps.store.lock().unwrap().get_source(source_id) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("Failed to load source {}: {}", source_id, e);
            return;
        }
    };

    match deps.policy.should_scrape(&source, now) {
        ScrapeDecision::Skip { reason } => {
            tracing::info!("Skipping {}: {}", source.name, reason);
            return;
        }
        ScrapeDecision::Allow => {}
    }

    let outcome = deps.fetcher.fetch_with_retry(&source).await;

    match outcome.result {
        Ok(quote) => {
            tracing::info!(
                "Scraped {}: ${:.3} ({} retries, {:?})",
                source.name,
                quote.price,
                outcome.retries_used,
                outcome.elapsed
            );

            let observation = PriceObservation {
                source_id: source.id,
                price: quote.price,
                min_volume_tier: source.rule.target_tier.map(|t| t as u32),
                source_type: quote.source_type,
                source_url: source.url.clone(),
                scraped_at: quote.scraped_at,
                expires_at: quote.expires_at,
            };

            let mut store = deps.store.lock().unwrap();
            if let Err(e) = store.insert_price_observation(&observation) {
                // Infrastructure concern, tracked separately from
                // source-level backoff
                tracing::error!("Failed to persist observation for {}: {}", source.name, e);
            }
            if let Err(e) = deps.policy.record_success(&mut **store, source.id) {
                tracing::error!("Failed to record success for {}: {}", source.name, e);
            }
        }
        Err(error) => {
            tracing::warn!(
                "Scrape failed for {} after {} retries: {}",
                source.name,
                outcome.retries_used,
                error
            );

            let mut store = deps.store.lock().unwrap();
            if let Err(e) = deps.policy.record_failure(&mut **store, &source, deps.clock.now()) {
                tracing::error!("Failed to record failure for {}: {}", source.name, e);
            }
        }
    }
}

/// Sends the one-time "ready to activate" notification when the shadow
/// distribution has proven itself
async fn evaluate_promotion(
    deps: &Arc<SchedulerDeps>,
    state: &Arc<Mutex<SchedulerState>>,
    now: DateTime<Utc>,
) {
    let report = {
        let mut guard = state.lock().unwrap();
        if guard.shadow.notified
            || !guard.shadow.ready_to_promote(now, deps.observation_days)
        {
            return;
        }
        // Claim the flag before awaiting so overlapping ticks cannot
        // double-send; delivery failure re-arms it below
        guard.shadow.notified = true;
        (
            guard.shadow.executions(),
            guard.shadow.quality(),
            guard.shadow.elapsed_days(now),
        )
    };

    let (executions, quality, elapsed_days) = report;
    let subject = "Fuelwatch: distributed schedule ready for activation".to_string();
    let body = format!(
        "Shadow mode has observed {} execution(s) over {} day(s).\n\
         Distribution quality: {}.\n\
         The distributed schedule can be switched to active mode.",
        executions, elapsed_days, quality
    );

    match deps.notifier.send_once(&subject, &body).await {
        Ok(()) => {
            tracing::info!("Promotion readiness notification sent ({})", quality);
        }
        Err(e) => {
            tracing::warn!("Failed to send promotion notification, will retry: {}", e);
            state.lock().unwrap().shadow.notified = false;
        }
    }
}
