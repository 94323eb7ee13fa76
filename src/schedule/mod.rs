//! Scrape scheduling
//!
//! Two execution modes share the fetch and backoff machinery: the
//! distributed scheduler spreads sources across a daily window at stable
//! hashed offsets, and the sequential sweep walks all sources in one pass.

pub mod scheduler;
pub mod shadow;
pub mod sweep;
pub mod window;

pub use scheduler::{ScheduleEntry, Scheduler, SchedulerMode, SchedulerStatus, TICK_INTERVAL};
pub use shadow::{DistributionQuality, ShadowReport, ShadowStats};
pub use sweep::{run_sweep, SweepSummary, ALERT_FAILURE_RATE};
pub use window::ScheduleWindow;
