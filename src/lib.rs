//! Datalyst — session and memory core for a data-analysis chat assistant.
//!
//! A user converses with the assistant across turns and sessions while the
//! core silently learns durable preferences and replays the relevant ones
//! into future prompts, so a brand-new session can still answer "what's my
//! favorite product?".
//!
//! The crate is consumed by an out-of-scope HTTP layer through [`AppState`]:
//! sessions live in [`session::SessionStore`], long-term facts in
//! [`memory::MemoryBank`], and [`orchestrator::ConversationOrchestrator`]
//! runs the per-turn loop, delegating text generation to a pluggable
//! [`llm::CompletionClient`].

pub mod error;
pub mod extractor;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod session;
pub mod settings;
pub mod state;

pub use error::{DatalystError, Result};
pub use state::AppState;

/// Load environment variables from a `.env` file if one is present.
///
/// Call before `AppState::from_settings` so `$VAR` references and API-key
/// fallbacks can resolve.
pub fn load_env_file() {
    if dotenvy::dotenv().is_ok() {
        tracing::debug!("Loaded environment from .env file");
    }
}

/// Initialize logging for binaries embedding this crate.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("datalyst=debug".parse().unwrap()),
        )
        .init();
}
