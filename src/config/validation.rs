//! Semantic validation of loaded configuration
//!
//! TOML parsing only guarantees shape; this module checks that the values
//! make operational sense before anything is scheduled.

use crate::config::types::Config;
use crate::ConfigError;

/// Validates a parsed configuration
///
/// # Arguments
///
/// * `config` - The configuration to validate
///
/// # Returns
///
/// * `Ok(())` - Configuration is valid
/// * `Err(ConfigError)` - Validation failed with a description
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scraper(config)?;
    validate_window(config)?;
    validate_user_agent(config)?;
    validate_output(config)?;
    validate_notify(config)?;
    Ok(())
}

fn validate_scraper(config: &Config) -> Result<(), ConfigError> {
    if config.scraper.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "scraper.request-timeout-secs must be greater than 0".to_string(),
        ));
    }

    if config.scraper.retry_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "scraper.retry-delay-ms must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_window(config: &Config) -> Result<(), ConfigError> {
    let window = &config.window;

    if window.start_hour > 23 {
        return Err(ConfigError::Validation(format!(
            "window.start-hour must be 0-23, got {}",
            window.start_hour
        )));
    }

    if window.end_hour > 24 {
        return Err(ConfigError::Validation(format!(
            "window.end-hour must be 1-24, got {}",
            window.end_hour
        )));
    }

    if window.start_hour >= window.end_hour {
        return Err(ConfigError::Validation(format!(
            "window.start-hour ({}) must be before window.end-hour ({})",
            window.start_hour, window.end_hour
        )));
    }

    if window.jitter_minutes < 0 {
        return Err(ConfigError::Validation(
            "window.jitter-minutes must not be negative".to_string(),
        ));
    }

    let window_minutes = i64::from(window.end_hour - window.start_hour) * 60;
    if window.jitter_minutes >= window_minutes {
        return Err(ConfigError::Validation(format!(
            "window.jitter-minutes ({}) must be smaller than the window length ({} minutes)",
            window.jitter_minutes, window_minutes
        )));
    }

    if !(-12..=14).contains(&window.utc_offset_hours) {
        return Err(ConfigError::Validation(format!(
            "window.utc-offset-hours must be between -12 and 14, got {}",
            window.utc_offset_hours
        )));
    }

    if window.shadow_observation_days < 1 {
        return Err(ConfigError::Validation(
            "window.shadow-observation-days must be at least 1".to_string(),
        ));
    }

    if window.mode != "shadow" && window.mode != "active" {
        return Err(ConfigError::Validation(format!(
            "window.mode must be \"shadow\" or \"active\", got \"{}\"",
            window.mode
        )));
    }

    Ok(())
}

fn validate_user_agent(config: &Config) -> Result<(), ConfigError> {
    let ua = &config.user_agent;

    if ua.scraper_name.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent.scraper-name must not be empty".to_string(),
        ));
    }

    if ua.scraper_version.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent.scraper-version must not be empty".to_string(),
        ));
    }

    if !ua.contact_url.starts_with("http://") && !ua.contact_url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "user-agent.contact-url must be an http(s) URL, got \"{}\"",
            ua.contact_url
        )));
    }

    if !ua.contact_email.contains('@') {
        return Err(ConfigError::Validation(format!(
            "user-agent.contact-email does not look like an email address: \"{}\"",
            ua.contact_email
        )));
    }

    Ok(())
}

fn validate_output(config: &Config) -> Result<(), ConfigError> {
    if config.output.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "output.database-path must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_notify(config: &Config) -> Result<(), ConfigError> {
    if let Some(notify) = &config.notify {
        if notify.smtp_host.is_empty() {
            return Err(ConfigError::Validation(
                "notify.smtp-host must not be empty".to_string(),
            ));
        }
        if !notify.from.contains('@') || !notify.to.contains('@') {
            return Err(ConfigError::Validation(
                "notify.from and notify.to must be email addresses".to_string(),
            ));
        }
    }

    Ok(())
}
