//! Prompt construction for chat turns.
//!
//! Assembles the augmented prompt sent to the language capability: assistant
//! instructions, the dataset handle, remembered preferences, a window of
//! recent history, and the new user message. The capability's output is free
//! text; formatting instructions here are best-effort only.

use crate::memory::MemoryRecord;
use crate::session::{Turn, TurnRole};

/// Header marking the injected memory block. The instructions below refer to
/// it by name, so keep the two in sync.
const PREFERENCES_HEADER: &str = "=== USER PREFERENCES (from memory) ===";

const INSTRUCTIONS: &str = "\
You are an expert data-analysis assistant. Answer the user's question about \
their dataset clearly and concisely. When the user asks about \"my favorite \
X\" or \"my preferred Y\", consult the USER PREFERENCES section and use that \
information directly instead of asking again.";

/// Render remembered facts as a prompt block.
///
/// Returns an empty string when there is nothing to inject, so callers can
/// append unconditionally.
pub fn preference_block(records: &[MemoryRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let mut block = String::from(PREFERENCES_HEADER);
    for record in records {
        block.push_str("\n- ");
        block.push_str(&record.content);
    }
    block.push('\n');
    block
}

/// Build the full prompt for one chat turn.
///
/// `history` is the already-windowed recent conversation, excluding the
/// message being asked now.
pub fn build_turn_prompt(
    dataset: Option<&str>,
    history: &[Turn],
    memories: &[MemoryRecord],
    user_message: &str,
) -> String {
    let mut prompt = String::from(INSTRUCTIONS);
    prompt.push_str("\n\n");

    if let Some(handle) = dataset {
        prompt.push_str(&format!("Current dataset: {handle}\n\n"));
    }

    let memory_block = preference_block(memories);
    if !memory_block.is_empty() {
        prompt.push_str(&memory_block);
        prompt.push('\n');
    }

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            let speaker = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
                TurnRole::System => "System",
            };
            prompt.push_str(&format!("{speaker}: {}\n", turn.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User: {user_message}\nAssistant:"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::categories;
    use std::collections::HashMap;

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord {
            id: "test".to_string(),
            content: content.to_string(),
            category: categories::USER_PREFERENCE.to_string(),
            created_at: chrono::Utc::now(),
            source_metadata: HashMap::new(),
            access_count: 0,
            last_accessed: None,
        }
    }

    #[test]
    fn empty_memories_render_nothing() {
        assert_eq!(preference_block(&[]), "");
    }

    #[test]
    fn preference_block_lists_each_record() {
        let block = preference_block(&[
            record("User's favorite product is Product B"),
            record("Prefers: bar charts"),
        ]);

        assert!(block.starts_with(PREFERENCES_HEADER));
        assert!(block.contains("- User's favorite product is Product B"));
        assert!(block.contains("- Prefers: bar charts"));
    }

    #[test]
    fn turn_prompt_carries_all_sections() {
        let history = vec![Turn::user("hello"), Turn::assistant("hi, upload a dataset")];
        let memories = vec![record("User's favorite product is Product B")];

        let prompt = build_turn_prompt(
            Some("sales_2026.csv"),
            &history,
            &memories,
            "stats for my favorite product",
        );

        assert!(prompt.contains("sales_2026.csv"));
        assert!(prompt.contains(PREFERENCES_HEADER));
        assert!(prompt.contains("Product B"));
        assert!(prompt.contains("User: hello"));
        assert!(prompt.contains("Assistant: hi, upload a dataset"));
        assert!(prompt.ends_with("User: stats for my favorite product\nAssistant:"));
    }

    #[test]
    fn turn_prompt_without_context_is_minimal() {
        let prompt = build_turn_prompt(None, &[], &[], "hello");
        assert!(!prompt.contains(PREFERENCES_HEADER));
        assert!(!prompt.contains("Conversation so far"));
        assert!(!prompt.contains("Current dataset"));
        assert!(prompt.contains("User: hello"));
    }
}
