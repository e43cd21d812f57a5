use crate::decode::{arg_f64, arg_str, decode_event};
use crate::error::IntakeError;
use crate::model::{DecodedEvent, LogBody, TimedEvent};
use crate::roles::RoleTable;
use serde_json::Value;

/// Flattens both raw sub-tables into one decoded, offset-tagged sequence.
///
/// Shoot entries under unparseable keys or with no occurrences are skipped;
/// a consumed shoot occurrence that does not decode is fatal for the whole
/// call. Combat occurrences are never dropped: shapes the decoder does not
/// recognize degrade to `Infos` rows.
pub fn parse_log(body: &LogBody) -> Result<Vec<TimedEvent>, IntakeError> {
    let roles = RoleTable::new(&body.roles);
    let mut events = Vec::with_capacity(body.shoot_table.len() + body.damage_table.len());

    for (key, occurrences) in &body.shoot_table {
        let Ok(offset) = key.parse::<i64>() else {
            continue;
        };
        let Some(first) = occurrences.first() else {
            continue;
        };

        let event = decode_shoot(first, &roles)
            .map_err(|reason| IntakeError::ShootDecode { offset, reason })?;
        events.push(TimedEvent {
            offset_seconds: offset as f64,
            event,
        });
    }

    for occurrence in &body.damage_table {
        events.push(TimedEvent {
            offset_seconds: occurrence.time,
            event: decode_event(occurrence.id as i64, &occurrence.infos, &roles),
        });
    }

    Ok(events)
}

fn decode_shoot(fields: &[Value], roles: &RoleTable<'_>) -> Result<DecodedEvent, String> {
    let raw_index =
        arg_f64(fields, 0).ok_or_else(|| "attacker index is not numeric".to_string())?;
    let attacker = roles
        .resolve(raw_index as i64)
        .ok_or_else(|| format!("attacker index {raw_index} out of range"))?;
    let weapon = arg_str(fields, 1).ok_or_else(|| "weapon is not a string".to_string())?;

    Ok(DecodedEvent::Shoot {
        attacker: attacker.steamid64.clone(),
        weapon: weapon.to_string(),
    })
}
