pub mod bank;
pub mod relevance;

pub use bank::{categories, MemoryBank, MemoryPreview, MemoryRecord, MemorySort, MemorySummary};
pub use relevance::RelevanceConfig;
