//! Centralized TOML-based settings system for Datalyst.
//!
//! Settings are loaded from `~/.datalyst/settings.toml` with environment variable
//! interpolation support. The system maintains backward compatibility with
//! existing environment variables through the `get_with_env_fallback` helper.

pub mod loader;
pub mod schema;

pub use loader::{get_with_env_fallback, settings_path, SettingsManager};
pub use schema::{DatalystSettings, LlmSettings, MemorySettings, SessionSettings};
