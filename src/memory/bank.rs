//! Long-term memory bank.
//!
//! Durable, process-wide store of discrete memory records, independent of any
//! session. Every write path (manual add, auto-extraction) funnels through the
//! same dedup check, so a restated preference refreshes the existing record
//! instead of accumulating duplicates.
//!
//! Records are kept in a `DashMap` keyed by id; the store is in-memory and
//! lost on restart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DatalystError, Result};
use crate::memory::relevance::{self, RelevanceConfig};

/// Well-known memory categories.
pub mod categories {
    pub const USER_PREFERENCE: &str = "user_preference";
    pub const INSIGHT: &str = "insight";
    pub const DATASET_INFO: &str = "dataset_info";
    pub const GENERAL: &str = "general";
}

/// Content preview length used in summaries.
const PREVIEW_LEN: usize = 100;

/// A stored memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier assigned at write time
    pub id: String,

    /// Natural-language statement of the remembered fact, original casing
    pub content: String,

    /// Drives retrieval filtering; see [`categories`]
    pub category: String,

    /// Refreshed when a duplicate write lands on this record
    pub created_at: DateTime<Utc>,

    /// Provenance (originating session id, message index). Audit only,
    /// never a lifetime dependency.
    #[serde(default)]
    pub source_metadata: HashMap<String, serde_json::Value>,

    pub access_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
}

/// Per-category counts and most-accessed records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySummary {
    pub total_memories: usize,
    pub categories: HashMap<String, usize>,
    pub most_accessed: Vec<MemoryPreview>,
}

/// Truncated view of a record for summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPreview {
    pub id: String,
    pub content: String,
    pub category: String,
    pub access_count: u64,
}

/// Ordering applied by [`MemoryBank::query_sorted`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySort {
    /// Newest first.
    #[default]
    CreatedAt,
    /// Most accessed first.
    AccessCount,
    /// Most recently accessed first; never-accessed records sort last.
    LastAccessed,
}

/// Normalized form used for dedup comparison only; stored content keeps its
/// original casing.
fn normalize(content: &str) -> String {
    content
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Process-wide memory store shared by all sessions.
pub struct MemoryBank {
    records: DashMap<String, MemoryRecord>,
    relevance: RelevanceConfig,

    /// Serializes the dedup scan + insert in `add`. DashMap shard locks keep
    /// single operations atomic but not the scan-then-insert pair, and every
    /// write path must observe the dedup invariant regardless of which
    /// session the write came from.
    write_lock: Mutex<()>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::with_config(RelevanceConfig::default())
    }

    pub fn with_config(relevance: RelevanceConfig) -> Self {
        Self {
            records: DashMap::new(),
            relevance,
            write_lock: Mutex::new(()),
        }
    }

    /// Store a memory, deduplicating against same-category records.
    ///
    /// A write whose normalized content equals, contains, or is contained by
    /// an existing record of the same category refreshes that record's
    /// timestamp instead of creating a new one. Returns the affected id
    /// either way.
    pub fn add(
        &self,
        content: impl Into<String>,
        category: impl Into<String>,
        source_metadata: HashMap<String, serde_json::Value>,
    ) -> String {
        let content = content.into();
        let category = category.into();
        let normalized = normalize(&content);

        // Held across scan and insert so two racing writers cannot both miss
        // the scan and both insert.
        let _write_guard = self.write_lock.lock();

        // Find a near-duplicate first; DashMap must not be mutated while
        // holding the iterator.
        let existing = self
            .records
            .iter()
            .filter(|e| e.value().category == category)
            .find(|e| {
                let other = normalize(&e.value().content);
                other == normalized || other.contains(&normalized) || normalized.contains(&other)
            })
            .map(|e| e.key().clone());

        if let Some(id) = existing {
            if let Some(mut entry) = self.records.get_mut(&id) {
                entry.value_mut().created_at = Utc::now();
                tracing::debug!(record_id = %id, %category, "refreshed duplicate memory");
                return id;
            }
        }

        let id = Uuid::new_v4().to_string();
        let record = MemoryRecord {
            id: id.clone(),
            content,
            category: category.clone(),
            created_at: Utc::now(),
            source_metadata,
            access_count: 0,
            last_accessed: None,
        };
        self.records.insert(id.clone(), record);
        tracing::debug!(record_id = %id, %category, "stored memory");
        id
    }

    /// Point lookup, bumping access stats.
    pub fn get(&self, record_id: &str) -> Result<MemoryRecord> {
        match self.records.get_mut(record_id) {
            Some(mut entry) => {
                let record = entry.value_mut();
                record.access_count += 1;
                record.last_accessed = Some(Utc::now());
                Ok(record.clone())
            }
            None => Err(DatalystError::MemoryNotFound(record_id.to_string())),
        }
    }

    /// Query records, most-recent-first.
    ///
    /// `category` filters exactly; `text_filter` is a case-insensitive
    /// substring match against content or category.
    pub fn query(
        &self,
        category: Option<&str>,
        limit: Option<usize>,
        text_filter: Option<&str>,
    ) -> Vec<MemoryRecord> {
        self.query_sorted(category, limit, text_filter, MemorySort::CreatedAt)
    }

    /// [`query`](Self::query) with an explicit ordering.
    ///
    /// `AccessCount` and `LastAccessed` fall back to recency among ties.
    pub fn query_sorted(
        &self,
        category: Option<&str>,
        limit: Option<usize>,
        text_filter: Option<&str>,
        sort: MemorySort,
    ) -> Vec<MemoryRecord> {
        let filter_lower = text_filter.map(str::to_lowercase);

        let mut records: Vec<MemoryRecord> = self
            .records
            .iter()
            .filter(|e| category.is_none_or(|c| e.value().category == c))
            .filter(|e| {
                filter_lower.as_ref().is_none_or(|f| {
                    e.value().content.to_lowercase().contains(f)
                        || e.value().category.to_lowercase().contains(f)
                })
            })
            .map(|e| e.value().clone())
            .collect();

        match sort {
            MemorySort::CreatedAt => records.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            MemorySort::AccessCount => records.sort_by(|a, b| {
                b.access_count
                    .cmp(&a.access_count)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
            // Option orders None first, so descending puts never-accessed
            // records at the end.
            MemorySort::LastAccessed => records.sort_by(|a, b| {
                b.last_accessed
                    .cmp(&a.last_accessed)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
        }
        if let Some(n) = limit {
            records.truncate(n);
        }
        records
    }

    /// Surface memories likely to answer or contextualize the utterance.
    ///
    /// Records scoring above the overlap threshold qualify; when the
    /// utterance carries a preference cue, every `user_preference` record
    /// qualifies regardless of score. Results are ordered score-desc with
    /// recency as tie-break, truncated to `top_k`. Returned records get
    /// their access stats bumped.
    pub fn find_relevant(&self, utterance: &str, top_k: usize) -> Vec<MemoryRecord> {
        let query_tokens = relevance::tokenize(utterance);
        let cue = relevance::has_preference_cue(utterance);

        let mut scored: Vec<(f64, MemoryRecord)> = self
            .records
            .iter()
            .filter_map(|e| {
                let record = e.value();
                let score =
                    relevance::overlap_score(&query_tokens, &relevance::tokenize(&record.content));
                let admit = score >= self.relevance.threshold
                    || (cue && record.category == categories::USER_PREFERENCE);
                admit.then(|| (score, record.clone()))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });
        scored.truncate(top_k);

        let now = Utc::now();
        let hits: Vec<MemoryRecord> = scored.into_iter().map(|(_, r)| r).collect();
        for hit in &hits {
            if let Some(mut entry) = self.records.get_mut(&hit.id) {
                entry.value_mut().access_count += 1;
                entry.value_mut().last_accessed = Some(now);
            }
        }
        hits
    }

    /// Delete a record. Fails with `MemoryNotFound` if absent.
    pub fn delete(&self, record_id: &str) -> Result<()> {
        match self.records.remove(record_id) {
            Some(_) => {
                tracing::debug!(record_id, "deleted memory");
                Ok(())
            }
            None => Err(DatalystError::MemoryNotFound(record_id.to_string())),
        }
    }

    /// Counts per category plus the five most-accessed records.
    pub fn summary(&self) -> MemorySummary {
        let records: Vec<MemoryRecord> = self.records.iter().map(|e| e.value().clone()).collect();

        let mut categories: HashMap<String, usize> = HashMap::new();
        for record in &records {
            *categories.entry(record.category.clone()).or_default() += 1;
        }

        let mut by_access = records.clone();
        by_access.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        let most_accessed = by_access
            .into_iter()
            .take(5)
            .map(|r| MemoryPreview {
                id: r.id,
                content: preview(&r.content),
                category: r.category,
                access_count: r.access_count,
            })
            .collect();

        MemorySummary {
            total_memories: records.len(),
            categories,
            most_accessed,
        }
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Clear all memories. Returns the number removed.
    pub fn clear_all(&self) -> usize {
        let count = self.records.len();
        self.records.clear();
        tracing::info!(count, "cleared memory bank");
        count
    }
}

impl Default for MemoryBank {
    fn default() -> Self {
        Self::new()
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_LEN {
        content.to_string()
    } else {
        let mut truncated: String = content.chars().take(PREVIEW_LEN).collect();
        truncated.push_str("...");
        truncated
    }
}
