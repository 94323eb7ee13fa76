use serde::Deserialize;

/// Main configuration structure for Fuelwatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scraper: ScraperConfig,
    pub window: WindowConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
}

/// Fetch and retry behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Total timeout for a single fetch attempt (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Additional attempts after the first fetch fails with a retryable error
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Delay between consecutive requests in a sequential sweep (milliseconds)
    #[serde(rename = "sweep-delay-ms", default = "default_sweep_delay")]
    pub sweep_delay_ms: u64,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    3000
}

fn default_sweep_delay() -> u64 {
    2000
}

/// Daily scheduling window configuration
///
/// Window hours are expressed in a fixed-offset reference timezone. The
/// fixed offset is a documented approximation: it does not track daylight
/// saving transitions.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    /// Hour the daily scrape window opens (0-23, reference timezone)
    #[serde(rename = "start-hour")]
    pub start_hour: u32,

    /// Hour the daily scrape window closes (1-24, reference timezone)
    #[serde(rename = "end-hour")]
    pub end_hour: u32,

    /// Maximum schedule jitter in either direction (minutes)
    #[serde(rename = "jitter-minutes", default = "default_jitter")]
    pub jitter_minutes: i64,

    /// Reference timezone as a fixed UTC offset (hours, may be negative)
    #[serde(rename = "utc-offset-hours", default)]
    pub utc_offset_hours: i32,

    /// Days of shadow observation required before promotion is suggested
    #[serde(rename = "shadow-observation-days", default = "default_observation_days")]
    pub shadow_observation_days: i64,

    /// Scheduler mode at startup: "shadow" or "active"
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_jitter() -> i64 {
    15
}

fn default_observation_days() -> i64 {
    7
}

fn default_mode() -> String {
    "shadow".to_string()
}

/// User agent identification configuration
///
/// The scraper identifies itself honestly to the sites it reads.
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the scraper
    #[serde(rename = "scraper-name")]
    pub scraper_name: String,

    /// Version of the scraper
    #[serde(rename = "scraper-version")]
    pub scraper_version: String,

    /// URL with information about the scraper
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for scraper-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Notification channel configuration (optional)
///
/// SMTP credentials are read from the `SMTP_USER` / `SMTP_PASS`
/// environment variables rather than the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// SMTP relay host
    #[serde(rename = "smtp-host")]
    pub smtp_host: String,

    /// Sender address
    pub from: String,

    /// Recipient address
    pub to: String,
}
