//! Price extraction from raw HTML
//!
//! # Components
//!
//! - `ExtractionRule`: per-source configuration describing where the price
//!   lives in the markup
//! - `extract_price`: the pure extraction engine

mod engine;
mod rules;

pub use engine::{
    extract_price, in_plausible_band, DEFAULT_PRICE_PATTERN, MAX_PLAUSIBLE_PRICE,
    MIN_PLAUSIBLE_PRICE,
};
pub use rules::{ExtractionRule, PricePattern};
