//! Configuration loading, parsing, and validation
//!
//! Configuration is read from a TOML file with kebab-case keys. A SHA-256
//! hash of the file content is recorded so runs can detect config drift.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    Config, NotifyConfig, OutputConfig, ScraperConfig, UserAgentConfig, WindowConfig,
};
pub use validation::validate;
