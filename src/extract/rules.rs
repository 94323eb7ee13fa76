use serde::Deserialize;

/// How a source's page renders its price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricePattern {
    /// Single price in document order; first plausible match wins
    Direct,

    /// Price table with volume tiers; matches are ranked by price
    Table,

    /// Price rendered as two separate fragments (e.g. a large "$3" and a
    /// smaller "199") that must be stitched back together
    Split,
}

impl PricePattern {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Table => "table",
            Self::Split => "split",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "table" => Some(Self::Table),
            "split" => Some(Self::Split),
            _ => None,
        }
    }
}

/// Per-source extraction configuration
///
/// Immutable during a scrape; loaded once per run from the sources table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRule {
    /// Which extraction strategy to apply
    pub pattern: PricePattern,

    /// Regular expression locating the price; falls back to a default
    /// `$d.dd`-style pattern when absent
    pub price_regex: Option<String>,

    /// 1-based volume tier to select from the ascending price list
    /// (tier 1 = cheapest / highest-volume discount)
    pub target_tier: Option<usize>,

    /// Path override when the price lives off the source's root URL
    pub price_path: Option<String>,

    /// Relax certificate validation for this source only
    pub ignore_ssl: bool,

    /// Whether the price may be shown to end users, as opposed to being an
    /// internal market signal only
    pub displayable: bool,
}

impl Default for ExtractionRule {
    fn default() -> Self {
        Self {
            pattern: PricePattern::Direct,
            price_regex: None,
            target_tier: None,
            price_path: None,
            ignore_ssl: false,
            displayable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_db_roundtrip() {
        for pattern in &[PricePattern::Direct, PricePattern::Table, PricePattern::Split] {
            let db_str = pattern.to_db_string();
            assert_eq!(PricePattern::from_db_string(db_str), Some(*pattern));
        }
    }

    #[test]
    fn test_pattern_db_invalid() {
        assert_eq!(PricePattern::from_db_string("regex"), None);
    }

    #[test]
    fn test_default_rule() {
        let rule = ExtractionRule::default();
        assert_eq!(rule.pattern, PricePattern::Direct);
        assert!(rule.price_regex.is_none());
        assert!(rule.target_tier.is_none());
        assert!(!rule.ignore_ssl);
        assert!(rule.displayable);
    }
}
