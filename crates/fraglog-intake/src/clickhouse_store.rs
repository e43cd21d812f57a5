use crate::model::{EventRow, RoundKey};
use crate::store::{RoundStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fraglog_clickhouse::ClickHouseClient;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// ClickHouse-backed `RoundStore`. Rounds and participants live in
/// ReplacingMergeTree tables, so the end-time update and the participant
/// upsert are both re-inserts that win on merge.
#[derive(Clone)]
pub struct ClickHouseRoundStore {
    client: ClickHouseClient,
}

impl ClickHouseRoundStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

// Fresh key per call: identical payloads ingested twice must land in two
// independent rounds.
fn round_uid(map: &str, start_time: DateTime<Utc>) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let material = format!("{}|{}|{}", map, start_time.timestamp_millis(), nanos);

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn validate_round_key(round: &RoundKey) -> StoreResult<()> {
    let ok = !round.as_str().is_empty()
        && round.as_str().chars().all(|c| c.is_ascii_hexdigit());
    if !ok {
        return Err(StoreError::invalid_argument(format!(
            "malformed round key: {round}"
        )));
    }
    Ok(())
}

// Identities are steamid64 values carried as text; anything non-numeric is
// rejected before it reaches a query string.
fn validate_identity(identity: &str) -> StoreResult<()> {
    let ok = !identity.is_empty() && identity.chars().all(|c| c.is_ascii_digit());
    if !ok {
        return Err(StoreError::invalid_argument(format!(
            "malformed participant identity: {identity:?}"
        )));
    }
    Ok(())
}

fn backend(err: anyhow::Error) -> StoreError {
    StoreError::backend(format!("{err:#}"))
}

#[async_trait]
impl RoundStore for ClickHouseRoundStore {
    async fn create_round(
        &self,
        map: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> StoreResult<RoundKey> {
        let key = RoundKey::new(round_uid(map, start_time));
        let row = json!({
            "round_uid": key.as_str(),
            "map": map,
            "start_time": format_ts(start_time),
            "end_time": format_ts(end_time),
        });

        self.client
            .insert_json_rows("rounds", &[row])
            .await
            .map_err(backend)?;
        Ok(key)
    }

    async fn update_round_end_time(
        &self,
        round: &RoundKey,
        end_time: DateTime<Utc>,
    ) -> StoreResult<()> {
        validate_round_key(round)?;

        #[derive(Deserialize)]
        struct Row {
            map: String,
            start_time: String,
        }

        let query = format!(
            "SELECT map, start_time FROM rounds FINAL WHERE round_uid = '{}'",
            round.as_str()
        );
        let rows: Vec<Row> = self.client.query_json_rows(&query).await.map_err(backend)?;
        let Some(existing) = rows.into_iter().next() else {
            return Err(StoreError::backend(format!("round {round} not found")));
        };

        let row = json!({
            "round_uid": round.as_str(),
            "map": existing.map,
            "start_time": existing.start_time,
            "end_time": format_ts(end_time),
        });
        self.client
            .insert_json_rows("rounds", &[row])
            .await
            .map_err(backend)
    }

    async fn upsert_participant(&self, identity: &str, nickname: &str) -> StoreResult<()> {
        validate_identity(identity)?;

        let row = json!({
            "steamid64": identity,
            "nickname": nickname,
        });
        self.client
            .insert_json_rows("participants", &[row])
            .await
            .map_err(backend)
    }

    async fn insert_events(&self, rows: &[EventRow]) -> StoreResult<()> {
        let payload: Vec<Value> = rows
            .iter()
            .map(|row| {
                json!({
                    "round_uid": row.round.as_str(),
                    "round_time": row.round_time,
                    "event_type": row.event_type,
                    "event_data": row.event_data.to_string(),
                    "event_time": format_ts(row.event_time),
                })
            })
            .collect();

        self.client
            .insert_json_rows("round_events", &payload)
            .await
            .map_err(backend)
    }

    async fn lookup_participant(&self, identity: &str) -> StoreResult<Option<String>> {
        validate_identity(identity)?;

        #[derive(Deserialize)]
        struct Row {
            nickname: String,
        }

        let query = format!(
            "SELECT nickname FROM participants FINAL WHERE steamid64 = '{identity}' LIMIT 1"
        );
        let rows: Vec<Row> = self.client.query_json_rows(&query).await.map_err(backend)?;
        Ok(rows.into_iter().next().map(|row| row.nickname))
    }
}
