//! Hybrid search core: keyword scoring over a partitioned inverted index, fused with
//! phrase adjacency, embedding similarity and static authority ranks, plus the
//! mutable state (word cache, id counters) that query and indexing traffic share.

pub mod authority;
pub mod autocomplete;
pub mod barrel;
pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod ids;
pub mod index;
pub mod persist;
pub mod semantic;
pub mod tokenizer;

pub use config::EngineConfig;
pub use engine::{EngineStatus, IndexedDocument, SearchEngine};
pub use error::{CounterError, IndexError};
pub use index::{DocId, DocKey, DocKind, DocMeta, Posting, PostingList, ResultItem};
