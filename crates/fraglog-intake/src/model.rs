use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The outer round document as posted by the game server. The `Damagelog`
/// field is an opaque string holding the nested log body JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "Damagelog", alias = "damagelog", default)]
    pub damagelog: String,
    #[serde(rename = "Round", alias = "round", default)]
    pub round: i64,
    #[serde(rename = "Map", alias = "map", default)]
    pub map: String,
    /// Round-start epoch seconds; the source sends this as a float.
    #[serde(rename = "Date", alias = "date", default)]
    pub date: f64,
}

/// One participant entry. List order defines the 1-based role index that
/// every positional argument elsewhere in the document refers to.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Role {
    #[serde(rename = "Nick", alias = "nick", default)]
    pub nick: String,
    #[serde(rename = "Role", alias = "role", default)]
    pub role: f64,
    #[serde(rename = "Steamid64", alias = "steamid64", default)]
    pub steamid64: String,
}

/// One raw combat record: a round-relative time, an event-type code and an
/// untyped positional argument list whose shape depends on the code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CombatOccurrence {
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub id: f64,
    #[serde(default)]
    pub infos: Vec<Value>,
}

/// The embedded log body. Decoding is tolerant per field: a field that does
/// not decode falls back to its empty container instead of failing the call.
#[derive(Debug, Clone, Default)]
pub struct LogBody {
    pub roles: Vec<Role>,
    pub shoot_table: BTreeMap<String, Vec<Vec<Value>>>,
    pub damage_table: Vec<CombatOccurrence>,
}

impl LogBody {
    pub fn from_embedded_json(raw: &str) -> Self {
        let doc: Value = serde_json::from_str(raw).unwrap_or(Value::Null);
        Self {
            roles: tolerant_field(&doc, "Roles", "roles"),
            shoot_table: tolerant_field(&doc, "ShootTable", "shoottable"),
            damage_table: tolerant_field(&doc, "DamageTable", "damagetable"),
        }
    }
}

// The source encoder is case-loose about object keys, so accept both forms.
fn tolerant_field<T: DeserializeOwned + Default>(doc: &Value, name: &str, alias: &str) -> T {
    doc.get(name)
        .or_else(|| doc.get(alias))
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

/// A fully decoded, identity-resolved event. Variants carry identity strings
/// only; raw role indices never leave the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    Shoot {
        attacker: String,
        weapon: String,
    },
    Damage {
        victim: String,
        attacker: String,
        damage: f64,
        weapon: String,
    },
    Kill {
        victim: String,
        attacker: String,
        weapon: String,
    },
    /// Unrecognized or degraded event, preserved with its raw argument list.
    Infos {
        args: Vec<Value>,
    },
}

impl DecodedEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Shoot { .. } => "shoot",
            Self::Damage { .. } => "damage",
            Self::Kill { .. } => "kill",
            Self::Infos { .. } => "infos",
        }
    }

    /// Event-specific JSON payload, using the field names the original
    /// reporting schema reads back.
    pub fn payload(&self) -> Value {
        match self {
            Self::Shoot { attacker, weapon } => json!({
                "Attacker": attacker,
                "Weapon": weapon,
            }),
            Self::Damage {
                victim,
                attacker,
                damage,
                weapon,
            } => json!({
                "Victim": victim,
                "Attacker": attacker,
                "Damage": damage,
                "Weapon": weapon,
            }),
            Self::Kill {
                victim,
                attacker,
                weapon,
            } => json!({
                "Victim": victim,
                "Attacker": attacker,
                "Weapon": weapon,
            }),
            Self::Infos { args } => Value::Array(args.clone()),
        }
    }
}

/// A decoded event tagged with its round-relative offset in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub offset_seconds: f64,
    pub event: DecodedEvent,
}

/// Generated key identifying one persisted round.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoundKey(String);

impl RoundKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One event row as handed to the persistence store.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub round: RoundKey,
    pub round_time: f64,
    pub event_type: &'static str,
    pub event_data: Value,
    pub event_time: DateTime<Utc>,
}

/// What one successful ingestion wrote.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub round: RoundKey,
    pub events_written: usize,
    pub participants_upserted: usize,
    pub end_offset_seconds: f64,
}
