use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::llm::{CompletionClient, HttpCompletionClient};
use crate::memory::{MemoryBank, RelevanceConfig};
use crate::orchestrator::ConversationOrchestrator;
use crate::session::SessionStore;
use crate::settings::DatalystSettings;

/// Shared application state: the stores and the orchestrator wired together.
///
/// This is the handle an embedding layer (HTTP server, CLI) holds onto; the
/// core keeps no ambient globals.
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub memory: Arc<MemoryBank>,
    pub orchestrator: ConversationOrchestrator,
    reaper_interval: Duration,
}

impl AppState {
    /// Wire up the stores and orchestrator around a given capability client.
    pub fn with_client(settings: &DatalystSettings, client: Arc<dyn CompletionClient>) -> Self {
        let sessions = Arc::new(SessionStore::new(
            settings.session.max_sessions,
            settings.session.ttl_secs,
        ));
        let memory = Arc::new(MemoryBank::with_config(RelevanceConfig {
            threshold: settings.memory.relevance_threshold,
        }));
        let orchestrator = ConversationOrchestrator::new(
            Arc::clone(&sessions),
            Arc::clone(&memory),
            client,
            settings,
        );

        Self {
            sessions,
            memory,
            orchestrator,
            reaper_interval: Duration::from_secs(settings.session.reaper_interval_secs.max(1)),
        }
    }

    /// Wire up against the HTTP completion client described by the settings.
    pub fn from_settings(settings: &DatalystSettings) -> Self {
        let client: Arc<dyn CompletionClient> =
            Arc::new(HttpCompletionClient::from_settings(&settings.llm));
        Self::with_client(settings, client)
    }

    /// Start the background session reaper.
    ///
    /// Returns the token that stops it. Eviction never touches the memory
    /// bank.
    pub fn spawn_reaper(&self) -> CancellationToken {
        self.sessions.spawn_reaper(self.reaper_interval)
    }
}
