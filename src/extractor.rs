//! Automatic preference extraction.
//!
//! After each completed exchange, a lightweight completion call decides
//! whether the user stated a durable preference. Extraction runs detached
//! from the turn that produced it: the chat reply has usually already been
//! delivered by the time the write lands, and any failure here is logged and
//! swallowed, never surfaced to the user. Repeated extraction over the same
//! exchange is safe because the memory bank dedups at write time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::llm::{complete_with_timeout, CompletionClient};
use crate::memory::{categories, MemoryBank};

/// Provenance of one extraction run, recorded on each saved record.
#[derive(Debug, Clone, Default)]
pub struct ExtractionSource {
    pub session_id: Option<String>,
    pub message_index: Option<usize>,
}

/// Decides whether an exchange stated a durable preference and writes the
/// normalized statements to the memory bank.
pub struct PreferenceExtractor {
    client: Arc<dyn CompletionClient>,
    memory: Arc<MemoryBank>,
    timeout: Duration,
}

impl PreferenceExtractor {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        memory: Arc<MemoryBank>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            memory,
            timeout,
        }
    }

    /// Run extraction for one exchange and persist the results.
    ///
    /// Best-effort: a malformed, empty, or failed response means "no
    /// preference found". Returns the number of records written (or
    /// refreshed).
    pub async fn extract(
        &self,
        user_message: &str,
        assistant_reply: &str,
        source: &ExtractionSource,
    ) -> usize {
        let prompt = extraction_prompt(user_message, assistant_reply);

        let response = match complete_with_timeout(self.client.as_ref(), &prompt, self.timeout)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "preference extraction call failed");
                return 0;
            }
        };

        let statements = parse_extraction(&response);
        let mut saved = 0;
        for statement in statements {
            let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();
            metadata.insert("source".to_string(), serde_json::json!("auto_extracted"));
            metadata.insert(
                "original_message".to_string(),
                serde_json::json!(truncate(user_message, 200)),
            );
            if let Some(session_id) = &source.session_id {
                metadata.insert("session_id".to_string(), serde_json::json!(session_id));
            }
            if let Some(index) = source.message_index {
                metadata.insert("message_index".to_string(), serde_json::json!(index));
            }

            let id = self
                .memory
                .add(statement.clone(), categories::USER_PREFERENCE, metadata);
            tracing::info!(record_id = %id, preference = %statement, "saved user preference");
            saved += 1;
        }
        saved
    }

    /// Fire-and-forget extraction for one exchange.
    ///
    /// The returned handle is for tests; the chat path drops it. The task
    /// keeps its own Arcs, so it completes even if the originating session
    /// is deleted meanwhile.
    pub fn spawn(
        self: &Arc<Self>,
        user_message: String,
        assistant_reply: String,
        source: ExtractionSource,
    ) -> JoinHandle<()> {
        let extractor = Arc::clone(self);
        tokio::spawn(async move {
            extractor
                .extract(&user_message, &assistant_reply, &source)
                .await;
        })
    }
}

/// Build the constrained extraction instruction for one exchange.
fn extraction_prompt(user_message: &str, assistant_reply: &str) -> String {
    format!(
        "Analyze this conversation exchange and identify if the user expressed \
any personal preferences, favorites, or likes.\n\n\
User message: {user_message}\n\
Assistant response: {assistant_reply}\n\n\
Extract ONLY clear user preferences in this format:\n\
- If the user says \"X is my favorite Y\", extract: \"Favorite Y: X\"\n\
- If the user says \"I prefer X\", extract: \"Prefers: X\"\n\
- If the user says \"I like X\", extract: \"Likes: X\"\n\n\
Rules:\n\
1. Only extract explicit preferences from the USER's message, not the assistant's response\n\
2. Do not infer preferences from questions\n\
3. If no clear preference is expressed, respond with \"NONE\"\n\
4. Return one preference per line\n\n\
Extracted preferences:"
    )
}

/// Parse the capability's free-text response into preference statements.
///
/// Tolerates list bullets and surrounding noise; an empty or `NONE` response
/// yields no statements.
pub fn parse_extraction(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '*']).trim())
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("none"))
        .map(str::to_string)
        .collect()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        s.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ScriptedClient(String);

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    struct BrokenClient;

    #[async_trait]
    impl CompletionClient for BrokenClient {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("model offline")
        }
    }

    fn extractor(client: impl CompletionClient + 'static) -> (Arc<PreferenceExtractor>, Arc<MemoryBank>) {
        let memory = Arc::new(MemoryBank::new());
        let extractor = Arc::new(PreferenceExtractor::new(
            Arc::new(client),
            Arc::clone(&memory),
            Duration::from_secs(5),
        ));
        (extractor, memory)
    }

    // =========================================================================
    // Response parsing
    // =========================================================================

    mod parsing_tests {
        use super::*;

        #[test]
        fn none_response_yields_nothing() {
            assert!(parse_extraction("NONE").is_empty());
            assert!(parse_extraction("none").is_empty());
            assert!(parse_extraction("").is_empty());
            assert!(parse_extraction("  \n \n").is_empty());
        }

        #[test]
        fn plain_lines_are_kept() {
            let parsed = parse_extraction("Favorite product: Product B\nPrefers: bar charts");
            assert_eq!(parsed, vec!["Favorite product: Product B", "Prefers: bar charts"]);
        }

        #[test]
        fn bullets_and_blanks_are_stripped() {
            let parsed = parse_extraction("- Favorite product: Product B\n\n* Likes: scatter plots\n");
            assert_eq!(parsed, vec!["Favorite product: Product B", "Likes: scatter plots"]);
        }

        #[test]
        fn none_mixed_with_statements_is_dropped() {
            let parsed = parse_extraction("Favorite region: EMEA\nNONE");
            assert_eq!(parsed, vec!["Favorite region: EMEA"]);
        }
    }

    // =========================================================================
    // Extraction and persistence
    // =========================================================================

    mod extraction_tests {
        use super::*;

        #[tokio::test]
        async fn positive_extraction_writes_preference_records() {
            let (extractor, memory) =
                extractor(ScriptedClient("Favorite product: Product B".to_string()));

            let source = ExtractionSource {
                session_id: Some("sess-1".to_string()),
                message_index: Some(3),
            };
            let saved = extractor
                .extract("Product B is my favorite product", "Noted!", &source)
                .await;

            assert_eq!(saved, 1);
            let records = memory.query(Some(categories::USER_PREFERENCE), None, None);
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].content, "Favorite product: Product B");
            assert_eq!(
                records[0].source_metadata["session_id"],
                serde_json::json!("sess-1")
            );
            assert_eq!(
                records[0].source_metadata["source"],
                serde_json::json!("auto_extracted")
            );
        }

        #[tokio::test]
        async fn none_response_writes_nothing() {
            let (extractor, memory) = extractor(ScriptedClient("NONE".to_string()));

            let saved = extractor
                .extract("what was revenue in March?", "About 40k.", &ExtractionSource::default())
                .await;

            assert_eq!(saved, 0);
            assert_eq!(memory.count(), 0);
        }

        #[tokio::test]
        async fn capability_failure_is_swallowed() {
            let (extractor, memory) = extractor(BrokenClient);

            let saved = extractor
                .extract("I prefer line charts", "Sure.", &ExtractionSource::default())
                .await;

            assert_eq!(saved, 0);
            assert_eq!(memory.count(), 0);
        }

        #[tokio::test]
        async fn repeated_extraction_dedups_through_the_bank() {
            let (extractor, memory) =
                extractor(ScriptedClient("Favorite product: Product B".to_string()));

            let source = ExtractionSource::default();
            extractor.extract("Product B is my favorite", "Noted.", &source).await;
            extractor.extract("Product B is my favorite", "Noted.", &source).await;

            assert_eq!(memory.count(), 1);
        }

        #[tokio::test]
        async fn spawned_extraction_completes_detached() {
            let (extractor, memory) =
                extractor(ScriptedClient("Likes: heatmaps".to_string()));

            let handle = extractor.spawn(
                "I like heatmaps".to_string(),
                "Great choice.".to_string(),
                ExtractionSource::default(),
            );
            handle.await.unwrap();

            assert_eq!(memory.count(), 1);
        }
    }
}
