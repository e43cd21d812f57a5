use crate::error::IntakeError;
use crate::model::{EventRow, IngestSummary, LogBody, RawEnvelope};
use crate::parse::parse_log;
use crate::store::RoundStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tracing::debug;

/// Orchestrates one ingestion call end to end: envelope decode, round
/// creation, body parsing, timestamp computation and the store writes. The
/// only component with side effects; everything below it is pure.
pub struct IntakePipeline {
    store: Arc<dyn RoundStore>,
}

impl IntakePipeline {
    pub fn new(store: Arc<dyn RoundStore>) -> Self {
        Self { store }
    }

    pub async fn ingest(&self, raw: &[u8]) -> Result<IngestSummary, IntakeError> {
        let envelope: RawEnvelope =
            serde_json::from_slice(raw).map_err(IntakeError::Envelope)?;
        let start_time = round_start(envelope.date);

        let round = self
            .store
            .create_round(&envelope.map, start_time, start_time)
            .await
            .map_err(IntakeError::CreateRound)?;

        let body = LogBody::from_embedded_json(&envelope.damagelog);
        let events = parse_log(&body)?;

        let mut end_offset = 0.0_f64;
        let mut rows = Vec::with_capacity(events.len());
        for timed in &events {
            end_offset = end_offset.max(timed.offset_seconds);
            rows.push(EventRow {
                round: round.clone(),
                round_time: timed.offset_seconds,
                event_type: timed.event.event_type(),
                event_data: timed.event.payload(),
                event_time: start_time + offset_duration(timed.offset_seconds),
            });
        }

        debug!(round = %round, events = rows.len(), map = %envelope.map, "persisting decoded events");

        // Participants must exist before event rows reference them.
        for role in &body.roles {
            self.store
                .upsert_participant(&role.steamid64, &role.nick)
                .await
                .map_err(|source| IntakeError::UpsertParticipant {
                    identity: role.steamid64.clone(),
                    source,
                })?;
        }

        self.store
            .insert_events(&rows)
            .await
            .map_err(IntakeError::InsertEvents)?;

        self.store
            .update_round_end_time(&round, start_time + offset_duration(end_offset))
            .await
            .map_err(IntakeError::FinalizeRound)?;

        Ok(IngestSummary {
            round,
            events_written: rows.len(),
            participants_upserted: body.roles.len(),
            end_offset_seconds: end_offset,
        })
    }
}

fn round_start(epoch_seconds: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch_seconds as i64, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn offset_duration(seconds: f64) -> Duration {
    Duration::milliseconds((seconds * 1000.0) as i64)
}
