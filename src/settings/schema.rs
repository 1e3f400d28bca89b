//! Settings schema definitions for Datalyst configuration.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Root settings structure for Datalyst.
///
/// Loaded from `~/.datalyst/settings.toml` with environment variable interpolation
/// support. Version field enables future migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatalystSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Language model configuration
    pub llm: LlmSettings,

    /// Session store configuration
    pub session: SessionSettings,

    /// Memory bank configuration
    pub memory: MemorySettings,
}

impl Default for DatalystSettings {
    fn default() -> Self {
        Self {
            version: 1,
            llm: LlmSettings::default(),
            session: SessionSettings::default(),
            memory: MemorySettings::default(),
        }
    }
}

/// Language model provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider label, informational only ("openai" | "openrouter" | "local")
    pub provider: String,

    /// Model identifier sent with each completion request
    pub model: String,

    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upper bound on a single completion call, in seconds
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Maximum concurrent sessions before `create` fails
    pub max_sessions: usize,

    /// Idle TTL in seconds before a session is reclaimed (0 disables eviction)
    pub ttl_secs: u64,

    /// How many recent turns are replayed into each prompt
    pub history_window: usize,

    /// Reaper sweep interval in seconds
    pub reaper_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            ttl_secs: 24 * 60 * 60,
            history_window: 20,
            reaper_interval_secs: 60,
        }
    }
}

/// Memory bank configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Minimum lexical-overlap score for a record to count as relevant
    pub relevance_threshold: f64,

    /// How many relevant memories are injected per turn
    pub top_k: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.2,
            top_k: 5,
        }
    }
}
