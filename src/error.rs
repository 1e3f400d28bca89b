use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatalystError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Memory record not found: {0}")]
    MemoryNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Language model timed out after {secs}s")]
    UpstreamTimeout { secs: u64 },

    #[error("Language model error: {0}")]
    Upstream(String),

    #[error("Maximum session limit ({0}) reached")]
    CapacityExhausted(usize),
}

// Serialize as the display string so the HTTP layer can forward errors verbatim
impl Serialize for DatalystError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DatalystError>;
