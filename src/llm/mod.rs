//! Language capability abstraction.
//!
//! The rest of the crate only depends on the `CompletionClient` trait: one
//! prompt in, free text out. The bundled implementation talks to any
//! OpenAI-compatible chat completions endpoint; tests substitute scripted
//! clients. The capability may be slow and may fail transiently; its output
//! is untrusted free text.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DatalystError, Result};
use crate::settings::{get_with_env_fallback, LlmSettings};

/// Default endpoint when the settings file does not name one.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A black-box text completion capability.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce a completion for a single prompt.
    ///
    /// Transport and provider failures are reported as errors; malformed but
    /// successful responses are the caller's problem.
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Completion client for OpenAI-compatible chat completions APIs.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpCompletionClient {
    /// Build a client from LLM settings.
    ///
    /// The API key falls back to `DATALYST_API_KEY` then `OPENAI_API_KEY`
    /// when not present in the settings file.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let api_key = get_with_env_fallback(
            &settings.api_key,
            &["DATALYST_API_KEY", "OPENAI_API_KEY"],
            None,
        );

        if api_key.is_none() {
            tracing::warn!("No API key configured, completion requests will be unauthenticated");
        }

        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self.http.post(&url).json(&ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        });

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: ChatResponse = response.json().await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(text)
    }
}

/// Run a completion with an upper time bound.
///
/// Elapsed timeouts map to `UpstreamTimeout`, transport failures to
/// `Upstream`. No retry is attempted here; retry policy belongs to the caller.
pub async fn complete_with_timeout(
    client: &dyn CompletionClient,
    prompt: &str,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, client.complete(prompt)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(DatalystError::Upstream(e.to_string())),
        Err(_) => Err(DatalystError::UpstreamTimeout {
            secs: timeout.as_secs(),
        }),
    }
}
