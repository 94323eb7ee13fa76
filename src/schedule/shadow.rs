//! Shadow-mode execution statistics
//!
//! While the scheduler runs in shadow mode it records when each source
//! would have fired. The resulting per-hour distribution is scored before
//! the new schedule is trusted with real traffic.

use chrono::{DateTime, Utc};

/// Distinct hours-with-data required before quality can be judged
pub const MIN_DISTINCT_HOURS: usize = 5;

/// How evenly shadow firings spread across the day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionQuality {
    /// Not enough distinct hours observed yet
    Insufficient,
    Excellent,
    Good,
    Fair,
    Poor,
}

impl std::fmt::Display for DistributionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Insufficient => "insufficient data",
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        };
        write!(f, "{s}")
    }
}

/// Process-lifetime shadow execution counters, reset on restart
#[derive(Debug, Clone)]
pub struct ShadowStats {
    executions: u64,
    hourly: [u64; 24],
    started_at: DateTime<Utc>,

    /// One-shot guard for the promotion notification; re-armed only when
    /// delivery fails (or by process restart)
    pub notified: bool,
}

impl ShadowStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            executions: 0,
            hourly: [0; 24],
            started_at,
            notified: false,
        }
    }

    /// Records one shadow firing in the given hour-of-day bucket
    pub fn record(&mut self, hour: usize) {
        self.executions += 1;
        if hour < 24 {
            self.hourly[hour] += 1;
        }
    }

    pub fn executions(&self) -> u64 {
        self.executions
    }

    pub fn hourly(&self) -> &[u64; 24] {
        &self.hourly
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whole days of shadow observation so far
    pub fn elapsed_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_days()
    }

    /// Coefficient of variation (stddev / mean) over hours that have data
    ///
    /// Returns `None` until at least [`MIN_DISTINCT_HOURS`] distinct hours
    /// have recorded firings.
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        let counts: Vec<f64> = self
            .hourly
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| c as f64)
            .collect();

        if counts.len() < MIN_DISTINCT_HOURS {
            return None;
        }

        let n = counts.len() as f64;
        let mean = counts.iter().sum::<f64>() / n;
        if mean == 0.0 {
            return None;
        }

        let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
        Some(variance.sqrt() / mean)
    }

    /// Classifies the current distribution
    pub fn quality(&self) -> DistributionQuality {
        match self.coefficient_of_variation() {
            None => DistributionQuality::Insufficient,
            Some(cv) if cv < 0.3 => DistributionQuality::Excellent,
            Some(cv) if cv < 0.5 => DistributionQuality::Good,
            Some(cv) if cv < 0.7 => DistributionQuality::Fair,
            Some(_) => DistributionQuality::Poor,
        }
    }

    /// Whether enough evidence has accumulated to suggest activation
    pub fn ready_to_promote(&self, now: DateTime<Utc>, observation_days: i64) -> bool {
        if self.elapsed_days(now) < observation_days {
            return false;
        }
        matches!(
            self.quality(),
            DistributionQuality::Excellent | DistributionQuality::Good | DistributionQuality::Fair
        )
    }
}

/// Read-only snapshot of shadow statistics for the status surface
#[derive(Debug, Clone)]
pub struct ShadowReport {
    pub executions: u64,
    pub hourly: [u64; 24],
    pub quality: DistributionQuality,
    pub elapsed_days: i64,
    pub ready_to_promote: bool,
    pub notified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn stats_with_counts(counts: &[(usize, u64)]) -> ShadowStats {
        let mut stats = ShadowStats::new(start());
        for &(hour, count) in counts {
            for _ in 0..count {
                stats.record(hour);
            }
        }
        stats
    }

    #[test]
    fn test_record_buckets_by_hour() {
        let mut stats = ShadowStats::new(start());
        stats.record(9);
        stats.record(9);
        stats.record(14);

        assert_eq!(stats.executions(), 3);
        assert_eq!(stats.hourly()[9], 2);
        assert_eq!(stats.hourly()[14], 1);
    }

    #[test]
    fn test_insufficient_below_five_hours() {
        let stats = stats_with_counts(&[(9, 3), (10, 3), (11, 3), (12, 3)]);
        assert_eq!(stats.coefficient_of_variation(), None);
        assert_eq!(stats.quality(), DistributionQuality::Insufficient);
    }

    #[test]
    fn test_low_variance_is_excellent() {
        // Per-hour counts {9:2, 10:2, 11:3, 12:2, 13:2}
        let stats = stats_with_counts(&[(9, 2), (10, 2), (11, 3), (12, 2), (13, 2)]);

        let cv = stats.coefficient_of_variation().unwrap();
        assert!(cv < 0.3, "cv was {cv}");
        assert_eq!(stats.quality(), DistributionQuality::Excellent);
    }

    #[test]
    fn test_high_variance_is_poor() {
        let stats = stats_with_counts(&[(9, 50), (10, 1), (11, 1), (12, 1), (13, 1)]);
        assert_eq!(stats.quality(), DistributionQuality::Poor);
    }

    #[test]
    fn test_ready_needs_elapsed_days() {
        let stats = stats_with_counts(&[(9, 2), (10, 2), (11, 3), (12, 2), (13, 2)]);

        let early = start() + Duration::days(3);
        assert!(!stats.ready_to_promote(early, 7));

        let later = start() + Duration::days(8);
        assert!(stats.ready_to_promote(later, 7));
    }

    #[test]
    fn test_poor_quality_blocks_promotion() {
        let stats = stats_with_counts(&[(9, 50), (10, 1), (11, 1), (12, 1), (13, 1)]);
        assert!(!stats.ready_to_promote(start() + Duration::days(30), 7));
    }

    #[test]
    fn test_insufficient_blocks_promotion() {
        let stats = stats_with_counts(&[(9, 2)]);
        assert!(!stats.ready_to_promote(start() + Duration::days(30), 7));
    }

    #[test]
    fn test_out_of_range_hour_counts_execution_only() {
        let mut stats = ShadowStats::new(start());
        stats.record(99);
        assert_eq!(stats.executions(), 1);
        assert_eq!(stats.hourly().iter().sum::<u64>(), 0);
    }
}
