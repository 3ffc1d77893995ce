//! Durable memory log: every summary the Compression Pipeline produces is
//! archived as a dated markdown file and indexed here for later keyword or
//! semantic recall by the `session_search` tool, mirroring how this runtime
//! treats compaction output as durable memory rather than a one-shot scratch
//! value (see the persistence notes around session history).

pub mod embedding;
pub mod index;
pub mod search;
pub mod store;

pub use index::reindex;
pub use search::search;
pub use store::get_store;

/// qmd collection name for indexed memory-log entries.
pub(crate) const COLLECTION_MEMORY: &str = "memory";

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryResult {
    pub path: String,
    pub snippet: String,
    pub rank: f64,
}
