//! Daily scheduling window math
//!
//! Each source lands at a stable, restart-independent offset within the
//! daily window (a hash of its name), plus fresh jitter on every
//! (re)schedule so an external observer cannot infer the exact offset by
//! repeated observation.
//!
//! Window hours are expressed in a fixed-offset reference timezone. The
//! fixed offset is an accepted approximation and does not follow daylight
//! saving transitions.

use crate::config::WindowConfig;
use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveTime, Offset, TimeZone, Timelike, Utc,
};
use rand::Rng;
use sha2::{Digest, Sha256};

/// The daily scrape window with its jitter and reference timezone
#[derive(Debug, Clone)]
pub struct ScheduleWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub jitter_minutes: i64,
    pub utc_offset_hours: i32,
}

impl ScheduleWindow {
    pub fn from_config(config: &WindowConfig) -> Self {
        Self {
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            jitter_minutes: config.jitter_minutes,
            utc_offset_hours: config.utc_offset_hours,
        }
    }

    /// Window length in minutes
    pub fn window_minutes(&self) -> i64 {
        i64::from(self.end_hour - self.start_hour) * 60
    }

    fn reference_tz(&self) -> FixedOffset {
        // Validated to -12..=14 at config load; the fallback is unreachable
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Deterministic, order-independent minute offset for a source
    ///
    /// SHA-256 keeps the offset stable across restarts and across Rust
    /// releases (unlike `DefaultHasher`), with no coordination between
    /// sources and no schedule persistence.
    pub fn stable_offset(&self, source_name: &str) -> i64 {
        let digest = Sha256::digest(source_name.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(raw) % self.window_minutes() as u64) as i64
    }

    /// Draws a fresh uniform jitter in `[-J, +J]` minutes
    pub fn draw_jitter(&self) -> i64 {
        if self.jitter_minutes == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(-self.jitter_minutes..=self.jitter_minutes)
    }

    /// Computes the next run time for a given offset and jitter
    ///
    /// Starts from "today at window-start hour" in the reference timezone,
    /// adds offset + jitter, and advances one day when the result is not
    /// after `now`. Always recomputed, never cached.
    pub fn next_run_at(
        &self,
        offset_minutes: i64,
        jitter: i64,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let tz = self.reference_tz();
        let local_now = now.with_timezone(&tz);

        let start = NaiveTime::from_hms_opt(self.start_hour, 0, 0).unwrap_or_default();
        let day_start = match tz.from_local_datetime(&local_now.date_naive().and_time(start)) {
            LocalResult::Single(dt) => dt,
            // Fixed offsets always map local times uniquely
            _ => local_now,
        };

        let mut candidate = day_start + Duration::minutes(offset_minutes + jitter);
        if candidate <= local_now {
            candidate += Duration::days(1);
        }

        candidate.with_timezone(&Utc)
    }

    /// Computes the run time following a firing on `fired_at`'s day
    ///
    /// Always lands the slot on the next calendar day in the reference
    /// timezone. `next_run_at` alone is not enough here: a firing pulled
    /// early by negative jitter leaves the same-day slot still ahead of
    /// `now` when the fresh jitter is larger, and the source would fire
    /// twice in one day.
    pub fn next_run_after(
        &self,
        offset_minutes: i64,
        jitter: i64,
        fired_at: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let tz = self.reference_tz();
        let local_fired = fired_at.with_timezone(&tz);

        let start = NaiveTime::from_hms_opt(self.start_hour, 0, 0).unwrap_or_default();
        let next_day = local_fired.date_naive() + Duration::days(1);
        let day_start = match tz.from_local_datetime(&next_day.and_time(start)) {
            LocalResult::Single(dt) => dt,
            // Fixed offsets always map local times uniquely
            _ => local_fired + Duration::days(1),
        };

        (day_start + Duration::minutes(offset_minutes + jitter)).with_timezone(&Utc)
    }

    /// Computes a next run for a source with fresh jitter
    pub fn next_run(&self, source_name: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_run_at(self.stable_offset(source_name), self.draw_jitter(), now)
    }

    /// Whether `now` falls inside the window (reference timezone)
    pub fn is_within(&self, now: DateTime<Utc>) -> bool {
        let hour = now.with_timezone(&self.reference_tz()).hour();
        hour >= self.start_hour && hour < self.end_hour
    }

    /// Hour-of-day bucket for a timestamp, in the reference timezone
    pub fn hour_of_day(&self, at: DateTime<Utc>) -> usize {
        now_hour(at, self.reference_tz())
    }
}

fn now_hour(at: DateTime<Utc>, tz: FixedOffset) -> usize {
    at.with_timezone(&tz).hour() as usize
}
