//! Price extraction engine
//!
//! Pure HTML-to-price mapping: no I/O, no mutation. Supplier markup is
//! uncontrolled; anything unparsable or outside the plausible price band
//! yields `None`, which callers treat as a non-retryable extraction
//! failure (the markup likely changed).

use crate::extract::rules::{ExtractionRule, PricePattern};
use regex::Regex;

/// Lower bound of the plausible heating-fuel price band ($/unit)
pub const MIN_PLAUSIBLE_PRICE: f64 = 2.00;

/// Upper bound of the plausible heating-fuel price band ($/unit)
pub const MAX_PLAUSIBLE_PRICE: f64 = 5.00;

/// Default pattern: a dollar sign followed by a price with 2-3 decimals
pub const DEFAULT_PRICE_PATTERN: &str = r"\$(\d+\.\d{2,3})";

/// Extracts a validated price from raw HTML according to a source's rule
///
/// # Arguments
///
/// * `html` - Raw page markup
/// * `rule` - The source's extraction configuration
///
/// # Returns
///
/// * `Some(price)` - A price within the plausible band
/// * `None` - Pattern missed, value unparsable, or out of band
pub fn extract_price(html: &str, rule: &ExtractionRule) -> Option<f64> {
    match rule.pattern {
        PricePattern::Split => extract_split(html, rule),
        PricePattern::Table => extract_tiered(html, rule),
        PricePattern::Direct => extract_direct(html, rule),
    }
}

/// Checks whether a price falls inside the plausible band
pub fn in_plausible_band(price: f64) -> bool {
    (MIN_PLAUSIBLE_PRICE..=MAX_PLAUSIBLE_PRICE).contains(&price)
}

/// Compiles the rule's regex, or the default price pattern when absent
fn compile_rule_regex(rule: &ExtractionRule) -> Option<Regex> {
    let pattern = rule.price_regex.as_deref().unwrap_or(DEFAULT_PRICE_PATTERN);
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Invalid price regex {:?}: {}", pattern, e);
            None
        }
    }
}

/// Split pattern: the regex must capture the whole-dollar and fractional
/// fragments as two groups, which are rejoined as `whole.fraction`
fn extract_split(html: &str, rule: &ExtractionRule) -> Option<f64> {
    let re = compile_rule_regex(rule)?;
    let caps = re.captures(html)?;

    let whole = caps.get(1)?.as_str();
    let fraction = caps.get(2)?.as_str();

    let joined = format!("{}.{}", whole, fraction);
    let price: f64 = joined.parse().ok()?;

    in_plausible_band(price).then_some(price)
}

/// Collects every in-band price the rule's regex matches, in document order
fn collect_matches(html: &str, rule: &ExtractionRule) -> Vec<f64> {
    let Some(re) = compile_rule_regex(rule) else {
        return Vec::new();
    };

    re.captures_iter(html)
        .filter_map(|caps| {
            let raw = caps
                .get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str())?
                .trim_start_matches('$');
            raw.parse::<f64>().ok()
        })
        .filter(|price| in_plausible_band(*price))
        .collect()
}

/// Table pattern: matches are sorted ascending (lower price = higher-volume
/// discount tier); `target_tier` selects a 1-based rank, otherwise the
/// cheapest price wins
fn extract_tiered(html: &str, rule: &ExtractionRule) -> Option<f64> {
    let mut matches = collect_matches(html, rule);
    if matches.is_empty() {
        return None;
    }

    matches.sort_by(f64::total_cmp);

    match rule.target_tier {
        Some(tier) if tier >= 1 && tier <= matches.len() => Some(matches[tier - 1]),
        _ => Some(matches[0]),
    }
}

/// Direct pattern: first in-band match in document order, unsorted
fn extract_direct(html: &str, rule: &ExtractionRule) -> Option<f64> {
    collect_matches(html, rule).into_iter().next()
}
