use crate::model::{EventRow, RoundKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// The persistence capability the pipeline writes through. Implementations
/// must keep `upsert_participant` idempotent under identity, with the most
/// recent nickname winning.
#[async_trait]
pub trait RoundStore: Send + Sync {
    async fn create_round(
        &self,
        map: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> StoreResult<RoundKey>;

    async fn update_round_end_time(
        &self,
        round: &RoundKey,
        end_time: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn upsert_participant(&self, identity: &str, nickname: &str) -> StoreResult<()>;

    async fn insert_events(&self, rows: &[EventRow]) -> StoreResult<()>;

    /// Read side used by reporting, not by ingestion.
    async fn lookup_participant(&self, identity: &str) -> StoreResult<Option<String>>;
}
