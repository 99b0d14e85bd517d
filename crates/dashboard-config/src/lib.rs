//! Shared configuration for the voice dashboard tooling.
//!
//! This crate provides:
//! - Configuration loading (file, compile-time defaults, environment overrides)
//! - Filesystem paths for per-user state
//! - Logging initialization on top of `tracing-subscriber`

mod config;
mod error;
pub mod logging;
mod paths;

pub use config::{
    Config, LogFormat, DEFAULT_LOG_LEVEL, DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
