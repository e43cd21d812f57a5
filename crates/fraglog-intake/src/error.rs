use crate::store::StoreError;
use thiserror::Error;

/// Fatal conditions for one ingestion call. Each variant names the pipeline
/// step that failed; recoverable conditions never reach this type, they are
/// absorbed into `DecodedEvent::Infos` or skipped during parsing.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("failed to decode envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("failed to create round: {0}")]
    CreateRound(#[source] StoreError),
    #[error("malformed shoot entry at {offset}s: {reason}")]
    ShootDecode { offset: i64, reason: String },
    #[error("failed to upsert participant {identity}: {source}")]
    UpsertParticipant {
        identity: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to insert event rows: {0}")]
    InsertEvents(#[source] StoreError),
    #[error("failed to finalize round end time: {0}")]
    FinalizeRound(#[source] StoreError),
}
