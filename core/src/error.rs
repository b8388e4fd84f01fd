use crate::index::DocKind;
use std::path::PathBuf;

/// Failures of the persisted id counters.
#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("counter state {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("counter for {kind:?} is {persisted} but ids up to {floor} are already in use")]
    Inconsistent { kind: DocKind, persisted: u32, floor: u32 },
    #[error("id space exhausted for {0:?}")]
    Exhausted(DocKind),
    #[error("failed to persist counter state: {0:#}")]
    Persist(anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("indexing is unavailable: {0}")]
    IndexingUnavailable(String),
    #[error("invalid {kind:?} payload: {reason}")]
    InvalidPayload { kind: DocKind, reason: String },
    #[error(transparent)]
    Allocation(#[from] CounterError),
    #[error("failed to stage document {document_id}: {cause:#}")]
    Staging { document_id: String, cause: anyhow::Error },
}
