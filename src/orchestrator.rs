//! Per-turn conversation orchestration.
//!
//! The orchestrator is stateless across turns; everything durable lives in
//! the session store and the memory bank. One turn: validate, pull relevant
//! memories, build the prompt, call the language capability, commit the
//! reply, then fire off preference extraction in the background.
//!
//! Failure policy: the user's message is committed to history as soon as the
//! session is validated, so a capability timeout or error leaves the session
//! reflecting what was asked, with no paired reply. Callers own any retry.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::extractor::{ExtractionSource, PreferenceExtractor};
use crate::llm::{complete_with_timeout, CompletionClient};
use crate::memory::{categories, MemoryBank};
use crate::prompt;
use crate::session::{SessionStore, Turn};
use crate::settings::DatalystSettings;

/// Replies longer than this are considered for insight capture.
const INSIGHT_MIN_LEN: usize = 50;

/// Insight content is truncated to this many characters before storage.
const INSIGHT_MAX_LEN: usize = 500;

/// Reply keywords that mark an exchange as worth remembering as an insight.
const INSIGHT_MARKERS: &[&str] = &["insight", "trend", "shows", "indicates", "analysis"];

/// Outcome of one successful chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub reply: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_spec: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Drives the per-turn control loop over the shared stores.
pub struct ConversationOrchestrator {
    sessions: Arc<SessionStore>,
    memory: Arc<MemoryBank>,
    client: Arc<dyn CompletionClient>,
    extractor: Arc<PreferenceExtractor>,
    history_window: usize,
    top_k: usize,
    request_timeout: Duration,
}

impl ConversationOrchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        memory: Arc<MemoryBank>,
        client: Arc<dyn CompletionClient>,
        settings: &DatalystSettings,
    ) -> Self {
        let extractor = Arc::new(PreferenceExtractor::new(
            Arc::clone(&client),
            Arc::clone(&memory),
            Duration::from_secs(settings.llm.timeout_secs),
        ));

        Self {
            sessions,
            memory,
            client,
            extractor,
            history_window: settings.session.history_window,
            top_k: settings.memory.top_k,
            request_timeout: Duration::from_secs(settings.llm.timeout_secs),
        }
    }

    /// Run one chat turn against a session.
    ///
    /// `Validation` and `SessionNotFound` are returned before any store
    /// mutation. Capability failures surface after the user turn is
    /// committed.
    pub async fn chat(&self, session_id: &str, user_message: &str) -> Result<ChatOutcome> {
        let user_message = user_message.trim();
        if user_message.is_empty() {
            return Err(crate::error::DatalystError::Validation(
                "message must not be empty".to_string(),
            ));
        }

        // Validates existence and captures the pre-turn snapshot
        let session = self.sessions.get(session_id)?;

        let window = &session.conversation_history;
        let start = window.len().saturating_sub(self.history_window);
        let recent_history = &window[start..];

        let memories = self.memory.find_relevant(user_message, self.top_k);
        tracing::debug!(
            session_id,
            relevant = memories.len(),
            "built turn context"
        );

        let turn_prompt = prompt::build_turn_prompt(
            session.dataset_context.as_deref(),
            recent_history,
            &memories,
            user_message,
        );

        // Commit the question before the capability call; on failure the
        // session still reflects what was asked.
        let message_index = self
            .sessions
            .append_turn(session_id, Turn::user(user_message))?;

        let reply =
            complete_with_timeout(self.client.as_ref(), &turn_prompt, self.request_timeout)
                .await
                .inspect_err(|e| {
                    tracing::warn!(session_id, error = %e, "chat completion failed");
                })?;

        self.sessions
            .append_turn(session_id, Turn::assistant(reply.clone()))?;

        self.capture_insight(&session.dataset_context, session_id, user_message, &reply);

        // Fire-and-forget: must never add latency to the chat path, and its
        // failure never surfaces here.
        self.extractor.spawn(
            user_message.to_string(),
            reply.clone(),
            ExtractionSource {
                session_id: Some(session_id.to_string()),
                message_index: Some(message_index),
            },
        );

        Ok(ChatOutcome {
            reply,
            chart_spec: None,
            code: None,
        })
    }

    /// Auto-save replies that look informative as `insight` memories.
    fn capture_insight(
        &self,
        dataset: &Option<String>,
        session_id: &str,
        user_message: &str,
        reply: &str,
    ) {
        if reply.len() <= INSIGHT_MIN_LEN {
            return;
        }
        let lowered = reply.to_lowercase();
        if !INSIGHT_MARKERS.iter().any(|m| lowered.contains(m)) {
            return;
        }

        let content: String = reply.chars().take(INSIGHT_MAX_LEN).collect();
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("session_id".to_string(), serde_json::json!(session_id));
        metadata.insert(
            "user_question".to_string(),
            serde_json::json!(user_message.chars().take(200).collect::<String>()),
        );
        if let Some(handle) = dataset {
            metadata.insert("dataset".to_string(), serde_json::json!(handle));
        }

        self.memory.add(content, categories::INSIGHT, metadata);
    }
}
