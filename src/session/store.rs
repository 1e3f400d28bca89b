//! In-memory session store with idle eviction.
//!
//! Thread-safe session management using DashMap for O(1) lookup. Each session
//! owns its conversation history and an optional dataset-context handle.
//!
//! # Thread safety
//!
//! - `SessionStore` uses `DashMap`; mutations happen under the shard lock
//! - Read paths hand out cloned snapshots, never references into the map
//! - The reaper task is guarded by a `CancellationToken` for clean shutdown
//!
//! Sessions are process-local and lost on restart. Destroying a session never
//! touches the memory bank; memory outlives sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{DatalystError, Result};

/// Maximum concurrent sessions to prevent resource exhaustion (default)
pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// Session TTL for idle cleanup - 24 hours (default)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Role of a turn in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// Structured payload attached to an assistant turn.
///
/// Chart specs and generated code are produced by out-of-scope collaborators;
/// the store only carries them alongside the text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_spec: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl TurnPayload {
    pub fn is_empty(&self) -> bool {
        self.chart_spec.is_none() && self.code.is_none()
    }
}

/// A single entry in a session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TurnPayload>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn assistant_with_payload(content: impl Into<String>, payload: TurnPayload) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            payload: if payload.is_empty() {
                None
            } else {
                Some(payload)
            },
        }
    }
}

/// A user session with conversation history and dataset context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID v4), immutable after creation
    pub session_id: String,

    pub created_at: DateTime<Utc>,

    /// Updated on every turn and metadata change
    pub last_active_at: DateTime<Utc>,

    /// Open mapping supplied at creation, never interpreted by the core
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Append-only during the session lifetime
    #[serde(default)]
    pub conversation_history: Vec<Turn>,

    /// Handle to the externally owned dataset for this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_context: Option<String>,
}

impl Session {
    fn new(metadata: HashMap<String, serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            last_active_at: now,
            metadata,
            conversation_history: Vec::new(),
            dataset_context: None,
        }
    }
}

/// Thread-safe session store with TTL-based idle eviction.
///
/// The store enforces a maximum session limit to prevent resource exhaustion.
/// Idle sessions are reclaimed by `sweep_idle`, either lazily on access or by
/// the background reaper spawned via `spawn_reaper`.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    max_sessions: usize,
    ttl_secs: u64,

    /// Serializes the capacity check + insert in `create` so concurrent
    /// creates cannot overshoot `max_sessions`.
    create_lock: Mutex<()>,
}

impl SessionStore {
    /// Create a store with the given capacity and idle TTL.
    ///
    /// A `ttl_secs` of 0 disables eviction entirely.
    pub fn new(max_sessions: usize, ttl_secs: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
            ttl_secs,
            create_lock: Mutex::new(()),
        }
    }

    fn is_expired(&self, session: &Session) -> bool {
        if self.ttl_secs == 0 {
            return false;
        }
        let idle = Utc::now().signed_duration_since(session.last_active_at);
        idle.num_seconds() >= 0 && idle.num_seconds() as u64 > self.ttl_secs
    }

    /// Create a new session with empty history.
    ///
    /// Fails with `CapacityExhausted` once the session limit is reached.
    pub fn create(&self, metadata: HashMap<String, serde_json::Value>) -> Result<Session> {
        let _create_guard = self.create_lock.lock();

        // Check capacity BEFORE creating the session
        if self.sessions.len() >= self.max_sessions {
            return Err(DatalystError::CapacityExhausted(self.max_sessions));
        }

        let session = Session::new(metadata);
        tracing::debug!(session_id = %session.session_id, "created session");
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    /// Get a snapshot of a session, including its history.
    ///
    /// An idle-expired session is removed on access and reported as missing.
    pub fn get(&self, session_id: &str) -> Result<Session> {
        let expired = match self.sessions.get(session_id) {
            Some(entry) => {
                if !self.is_expired(entry.value()) {
                    return Ok(entry.value().clone());
                }
                true
            }
            None => false,
        };

        if expired {
            self.sessions.remove(session_id);
            tracing::debug!(session_id, "evicted expired session on access");
        }
        Err(DatalystError::SessionNotFound(session_id.to_string()))
    }

    /// Append a turn to a session's history, updating `last_active_at`.
    ///
    /// Returns the index of the appended turn.
    pub fn append_turn(&self, session_id: &str, turn: Turn) -> Result<usize> {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                let session = entry.value_mut();
                session.conversation_history.push(turn);
                session.last_active_at = Utc::now();
                Ok(session.conversation_history.len() - 1)
            }
            None => Err(DatalystError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Get the most recent `limit` turns (all turns when `limit` is None).
    pub fn history(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Turn>> {
        let session = self.get(session_id)?;
        let history = session.conversation_history;
        match limit {
            Some(n) if n < history.len() => Ok(history[history.len() - n..].to_vec()),
            _ => Ok(history),
        }
    }

    /// Merge new entries into a session's metadata.
    pub fn update_metadata(
        &self,
        session_id: &str,
        updates: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                let session = entry.value_mut();
                session.metadata.extend(updates);
                session.last_active_at = Utc::now();
                Ok(())
            }
            None => Err(DatalystError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Point a session at a (externally owned) dataset.
    pub fn set_dataset(&self, session_id: &str, handle: impl Into<String>) -> Result<()> {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                let session = entry.value_mut();
                session.dataset_context = Some(handle.into());
                session.last_active_at = Utc::now();
                Ok(())
            }
            None => Err(DatalystError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Delete a session. Idempotent: removing an absent session is not an error.
    ///
    /// Returns whether a session was actually removed. Deletion discards the
    /// conversation history only; memory records referencing this session
    /// remain untouched.
    pub fn delete(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            tracing::debug!(session_id, "deleted session");
        }
        removed
    }

    /// Check if a session exists (ignoring TTL).
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Current number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// All live session ids.
    pub fn list_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove every session idle past the TTL.
    ///
    /// Returns the number of sessions reclaimed.
    pub fn sweep_idle(&self) -> usize {
        if self.ttl_secs == 0 {
            return 0;
        }

        let to_remove: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| self.is_expired(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let removed_count = to_remove.len();
        for id in to_remove {
            if self.sessions.remove(&id).is_some() {
                tracing::info!(session_id = %id, "reclaimed idle session");
            }
        }

        removed_count
    }

    /// Spawn a background reaper that sweeps idle sessions periodically.
    ///
    /// Returns a `CancellationToken`; cancelling it stops the reaper.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let store = Arc::clone(self);
        let guard = token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = guard.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep_idle();
                        if removed > 0 {
                            tracing::info!(removed, "session reaper sweep");
                        }
                    }
                }
            }
        });

        token
    }

    /// Force a session's `last_active_at` into the past (test hook).
    #[cfg(test)]
    pub fn backdate(&self, session_id: &str, secs: i64) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.value_mut().last_active_at = Utc::now() - chrono::Duration::seconds(secs);
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL_SECS)
    }
}
