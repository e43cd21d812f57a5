use crate::model::DecodedEvent;
use crate::roles::RoleTable;
use serde_json::Value;

/// Event-type codes with assigned semantics. Every other code falls through
/// to `DecodedEvent::Infos` and is persisted as an opaque record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Damage,
    Kill,
}

const EVENT_CODES: &[(i64, EventKind)] = &[(5, EventKind::Damage), (11, EventKind::Kill)];

impl EventKind {
    pub fn from_code(code: i64) -> Option<Self> {
        EVENT_CODES
            .iter()
            .find(|(candidate, _)| *candidate == code)
            .map(|(_, kind)| *kind)
    }
}

pub(crate) fn arg_f64(args: &[Value], index: usize) -> Option<f64> {
    args.get(index)?.as_f64()
}

pub(crate) fn arg_str<'a>(args: &'a [Value], index: usize) -> Option<&'a str> {
    args.get(index)?.as_str()
}

// Role indices arrive as JSON numbers; the source truncates fractional
// values toward zero before indexing, so we do the same.
pub(crate) fn arg_role<'a>(
    args: &[Value],
    index: usize,
    roles: &RoleTable<'a>,
) -> Option<&'a crate::model::Role> {
    let raw = arg_f64(args, index)?;
    roles.resolve(raw as i64)
}

/// Decodes one combat occurrence. Never fails: any shape the fixed table
/// does not account for degrades to `Infos` carrying the original arguments.
pub fn decode_event(code: i64, args: &[Value], roles: &RoleTable<'_>) -> DecodedEvent {
    match EventKind::from_code(code) {
        Some(EventKind::Damage) => decode_damage(args, roles),
        Some(EventKind::Kill) => decode_kill(args, roles),
        None => preserve(args),
    }
}

fn preserve(args: &[Value]) -> DecodedEvent {
    DecodedEvent::Infos {
        args: args.to_vec(),
    }
}

fn decode_damage(args: &[Value], roles: &RoleTable<'_>) -> DecodedEvent {
    if args.len() < 4 {
        return preserve(args);
    }

    // Victim comes before attacker here; kill events use the opposite order.
    let (Some(victim), Some(attacker)) = (arg_role(args, 0, roles), arg_role(args, 1, roles))
    else {
        return preserve(args);
    };

    DecodedEvent::Damage {
        victim: victim.steamid64.clone(),
        attacker: attacker.steamid64.clone(),
        damage: arg_f64(args, 2).unwrap_or(0.0),
        weapon: arg_str(args, 3).unwrap_or_default().to_string(),
    }
}

fn decode_kill(args: &[Value], roles: &RoleTable<'_>) -> DecodedEvent {
    if args.len() < 3 {
        return preserve(args);
    }

    let (Some(attacker), Some(victim)) = (arg_role(args, 0, roles), arg_role(args, 1, roles))
    else {
        return preserve(args);
    };

    DecodedEvent::Kill {
        victim: victim.steamid64.clone(),
        attacker: attacker.steamid64.clone(),
        weapon: arg_str(args, 2).unwrap_or_default().to_string(),
    }
}
