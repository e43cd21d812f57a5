mod clickhouse_store;
mod decode;
mod error;
mod model;
mod parse;
mod pipeline;
mod roles;
mod store;

pub use clickhouse_store::ClickHouseRoundStore;
pub use decode::{decode_event, EventKind};
pub use error::IntakeError;
pub use model::{
    CombatOccurrence, DecodedEvent, EventRow, IngestSummary, LogBody, RawEnvelope, Role, RoundKey,
    TimedEvent,
};
pub use parse::parse_log;
pub use pipeline::IntakePipeline;
pub use roles::RoleTable;
pub use store::{RoundStore, StoreError, StoreResult};
