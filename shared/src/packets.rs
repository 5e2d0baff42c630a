//! Wire protocol shared by client and server.
//!
//! Every message is a flat JSON array whose first slot is the numeric
//! [`Opcode`]; the remaining slots are the message fields in a fixed order
//! with no field names on the wire. Several messages may be sent in one frame
//! as an array of arrays. Before any of this, the server sends the bare text
//! [`HANDSHAKE_TOKEN`] once to signal that it is ready for `Hello`.

use crate::{MovementFlags, UnitSnapshot, Vec3};
use log::{error, warn};
use serde_json::{json, Value};
use thiserror::Error;

/// Sent by the server as a raw text frame right after accepting a connection.
pub const HANDSHAKE_TOKEN: &str = "go";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Hello = 0,
    Welcome = 1,
    Spawn = 2,
    Despawn = 3,
    Move = 4,
    MoveUpdate = 5,
    ChatMessage = 6,
    AttackStart = 7,
    AttackSwing = 8,
    AttackStop = 9,
    Respawn = 10,
    TimeSync = 11,
    TimeSyncResponse = 12,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        let opcode = match value {
            0 => Opcode::Hello,
            1 => Opcode::Welcome,
            2 => Opcode::Spawn,
            3 => Opcode::Despawn,
            4 => Opcode::Move,
            5 => Opcode::MoveUpdate,
            6 => Opcode::ChatMessage,
            7 => Opcode::AttackStart,
            8 => Opcode::AttackSwing,
            9 => Opcode::AttackStop,
            10 => Opcode::Respawn,
            11 => Opcode::TimeSync,
            12 => Opcode::TimeSyncResponse,
            _ => return None,
        };
        Some(opcode)
    }

    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let unknown = || DecodeError::UnknownOpcode(value.to_string());
        let number = coerce_number(value).ok_or_else(unknown)?;
        if number.fract() != 0.0 || !(0.0..=u8::MAX as f64).contains(&number) {
            return Err(unknown());
        }
        Opcode::from_u8(number as u8).ok_or_else(unknown)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not an array")]
    NotAnArray,
    #[error("empty message")]
    Empty,
    #[error("unknown opcode {0}")]
    UnknownOpcode(String),
    #[error("{opcode:?} is missing field `{field}`")]
    MissingField {
        opcode: Opcode,
        field: &'static str,
    },
    #[error("{opcode:?} field `{field}` has invalid value {value}")]
    InvalidField {
        opcode: Opcode,
        field: &'static str,
        value: String,
    },
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Hello {
        player_name: String,
    },
    Welcome(UnitSnapshot),
    Spawn(UnitSnapshot),
    Despawn {
        id: u32,
    },
    /// Client to server: the sender's own movement state.
    Move {
        flags: MovementFlags,
        position: Vec3,
        orientation: f32,
    },
    /// Server to client: another unit's movement state.
    MoveUpdate {
        id: u32,
        flags: MovementFlags,
        position: Vec3,
        orientation: f32,
    },
    ChatMessage {
        player_name: String,
        message: String,
    },
    AttackStart {
        target_id: u32,
    },
    AttackSwing {
        attacker_id: u32,
        target_id: u32,
        damage: i32,
        target_health: i32,
    },
    AttackStop,
    Respawn {
        id: u32,
        position: Vec3,
        orientation: f32,
    },
    TimeSync {
        sequence_index: u32,
    },
    TimeSyncResponse {
        sequence_index: u32,
        timestamp: u64,
    },
}

impl Packet {
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::Hello { .. } => Opcode::Hello,
            Packet::Welcome(_) => Opcode::Welcome,
            Packet::Spawn(_) => Opcode::Spawn,
            Packet::Despawn { .. } => Opcode::Despawn,
            Packet::Move { .. } => Opcode::Move,
            Packet::MoveUpdate { .. } => Opcode::MoveUpdate,
            Packet::ChatMessage { .. } => Opcode::ChatMessage,
            Packet::AttackStart { .. } => Opcode::AttackStart,
            Packet::AttackSwing { .. } => Opcode::AttackSwing,
            Packet::AttackStop => Opcode::AttackStop,
            Packet::Respawn { .. } => Opcode::Respawn,
            Packet::TimeSync { .. } => Opcode::TimeSync,
            Packet::TimeSyncResponse { .. } => Opcode::TimeSyncResponse,
        }
    }

    /// Builds the positional array for this message.
    pub fn to_value(&self) -> Value {
        let op = self.opcode() as u8;
        match self {
            Packet::Hello { player_name } => json!([op, player_name]),
            Packet::Welcome(unit) | Packet::Spawn(unit) => json!([
                op,
                unit.id,
                unit.flags.bits(),
                unit.name,
                unit.position.x,
                unit.position.y,
                unit.position.z,
                unit.orientation,
                unit.color,
                unit.max_health,
                unit.current_health,
            ]),
            Packet::Despawn { id } => json!([op, id]),
            Packet::Move {
                flags,
                position,
                orientation,
            } => json!([
                op,
                flags.bits(),
                position.x,
                position.y,
                position.z,
                orientation
            ]),
            Packet::MoveUpdate {
                id,
                flags,
                position,
                orientation,
            } => json!([
                op,
                id,
                flags.bits(),
                position.x,
                position.y,
                position.z,
                orientation
            ]),
            Packet::ChatMessage {
                player_name,
                message,
            } => json!([op, player_name, message]),
            Packet::AttackStart { target_id } => json!([op, target_id]),
            Packet::AttackSwing {
                attacker_id,
                target_id,
                damage,
                target_health,
            } => json!([op, attacker_id, target_id, damage, target_health]),
            Packet::AttackStop => json!([op]),
            Packet::Respawn {
                id,
                position,
                orientation,
            } => json!([op, id, position.x, position.y, position.z, orientation]),
            Packet::TimeSync { sequence_index } => json!([op, sequence_index]),
            Packet::TimeSyncResponse {
                sequence_index,
                timestamp,
            } => json!([op, sequence_index, timestamp]),
        }
    }

    /// Serializes this message to a single-message text frame.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Decodes one positional array.
    pub fn from_value(value: &Value) -> Result<Packet, DecodeError> {
        let items = value.as_array().ok_or(DecodeError::NotAnArray)?;
        let (head, rest) = items.split_first().ok_or(DecodeError::Empty)?;
        let opcode = Opcode::from_value(head)?;
        let mut r = FieldReader::new(opcode, rest);

        let packet = match opcode {
            Opcode::Hello => Packet::Hello {
                player_name: r.string("playerName")?,
            },
            Opcode::Welcome => Packet::Welcome(r.snapshot()?),
            Opcode::Spawn => Packet::Spawn(r.snapshot()?),
            Opcode::Despawn => Packet::Despawn { id: r.id("id")? },
            Opcode::Move => Packet::Move {
                flags: r.flags()?,
                position: r.position()?,
                orientation: r.float("orientation")?,
            },
            Opcode::MoveUpdate => Packet::MoveUpdate {
                id: r.id("id")?,
                flags: r.flags()?,
                position: r.position()?,
                orientation: r.float("orientation")?,
            },
            Opcode::ChatMessage => Packet::ChatMessage {
                player_name: r.string("playerName")?,
                message: r.string("message")?,
            },
            Opcode::AttackStart => Packet::AttackStart {
                target_id: r.id("targetId")?,
            },
            Opcode::AttackSwing => Packet::AttackSwing {
                attacker_id: r.id("attackerId")?,
                target_id: r.id("targetId")?,
                damage: r.integer("damage")?,
                target_health: r.integer("targetHealth")?,
            },
            Opcode::AttackStop => Packet::AttackStop,
            Opcode::Respawn => Packet::Respawn {
                id: r.id("id")?,
                position: r.position()?,
                orientation: r.float("orientation")?,
            },
            Opcode::TimeSync => Packet::TimeSync {
                sequence_index: r.id("sequenceIndex")?,
            },
            Opcode::TimeSyncResponse => Packet::TimeSyncResponse {
                sequence_index: r.id("sequenceIndex")?,
                timestamp: r.timestamp("timestamp")?,
            },
        };

        Ok(packet)
    }
}

/// Serializes several messages into one array-of-arrays frame.
pub fn encode_batch(packets: &[Packet]) -> String {
    Value::Array(packets.iter().map(Packet::to_value).collect()).to_string()
}

/// Decodes a text frame holding either one message or a batch.
///
/// Frame-level failures (invalid JSON, non-array) are returned as errors.
/// Individual messages that fail to decode are logged and skipped; the rest
/// of a batch is still returned in its original order.
pub fn decode_frame(text: &str) -> Result<Vec<Packet>, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let items = value.as_array().ok_or(DecodeError::NotAnArray)?;

    let messages: Vec<&Value> = if matches!(items.first(), Some(Value::Array(_))) {
        items.iter().collect()
    } else {
        vec![&value]
    };

    let mut packets = Vec::with_capacity(messages.len());
    for message in messages {
        match Packet::from_value(message) {
            Ok(packet) => packets.push(packet),
            Err(e @ DecodeError::UnknownOpcode(_)) => error!("Dropping message: {}", e),
            Err(e) => warn!("Dropping message {}: {}", message, e),
        }
    }

    Ok(packets)
}

/// Accepts JSON numbers and numeric strings.
fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

struct FieldReader<'a> {
    opcode: Opcode,
    fields: std::slice::Iter<'a, Value>,
}

impl<'a> FieldReader<'a> {
    fn new(opcode: Opcode, fields: &'a [Value]) -> Self {
        Self {
            opcode,
            fields: fields.iter(),
        }
    }

    fn next(&mut self, field: &'static str) -> Result<&'a Value, DecodeError> {
        self.fields.next().ok_or(DecodeError::MissingField {
            opcode: self.opcode,
            field,
        })
    }

    fn invalid(&self, field: &'static str, value: &Value) -> DecodeError {
        DecodeError::InvalidField {
            opcode: self.opcode,
            field,
            value: value.to_string(),
        }
    }

    /// Reads a whole number within `[min, max]`.
    fn whole(&mut self, field: &'static str, min: f64, max: f64) -> Result<f64, DecodeError> {
        let value = self.next(field)?;
        match coerce_number(value) {
            Some(n) if n.fract() == 0.0 && n >= min && n <= max => Ok(n),
            _ => Err(self.invalid(field, value)),
        }
    }

    /// Reads a number that stays finite once narrowed to `f32`.
    fn float(&mut self, field: &'static str) -> Result<f32, DecodeError> {
        let value = self.next(field)?;
        match coerce_number(value).map(|n| n as f32) {
            Some(n) if n.is_finite() => Ok(n),
            _ => Err(self.invalid(field, value)),
        }
    }

    fn id(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        Ok(self.whole(field, 0.0, u32::MAX as f64)? as u32)
    }

    fn integer(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        Ok(self.whole(field, i32::MIN as f64, i32::MAX as f64)? as i32)
    }

    fn timestamp(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        // Largest integer a JSON double carries exactly.
        Ok(self.whole(field, 0.0, 9_007_199_254_740_991.0)? as u64)
    }

    fn flags(&mut self) -> Result<MovementFlags, DecodeError> {
        let bits = self.whole("flags", 0.0, u8::MAX as f64)? as u8;
        Ok(MovementFlags::from_bits_truncate(bits))
    }

    fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        match self.next(field)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(self.invalid(field, other)),
        }
    }

    fn position(&mut self) -> Result<Vec3, DecodeError> {
        Ok(Vec3::new(self.float("x")?, self.float("y")?, self.float("z")?))
    }

    fn snapshot(&mut self) -> Result<UnitSnapshot, DecodeError> {
        Ok(UnitSnapshot {
            id: self.id("id")?,
            flags: self.flags()?,
            name: self.string("name")?,
            position: self.position()?,
            orientation: self.float("orientation")?,
            color: self.id("color")?,
            max_health: self.integer("maxHealth")?,
            current_health: self.integer("currentHealth")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nick() -> UnitSnapshot {
        UnitSnapshot {
            id: 1,
            flags: MovementFlags::empty(),
            name: "Nick".to_string(),
            position: Vec3::new(3.5, 0.0, 12.25),
            orientation: 1.2,
            color: 0x19e6e6,
            max_health: 100,
            current_health: 100,
        }
    }

    #[test]
    fn test_every_message_survives_encode_decode() {
        let packets = vec![
            Packet::Hello {
                player_name: "Nick".to_string(),
            },
            Packet::Welcome(nick()),
            Packet::Spawn(nick()),
            Packet::Despawn { id: 7 },
            Packet::Move {
                flags: MovementFlags::FORWARD | MovementFlags::JUMP,
                position: Vec3::new(1.0, 0.1, -3.3),
                orientation: 0.7,
            },
            Packet::MoveUpdate {
                id: 4,
                flags: MovementFlags::STRAFE_LEFT,
                position: Vec3::new(-2.0, 0.0, 9.9),
                orientation: 6.1,
            },
            Packet::ChatMessage {
                player_name: "Nick".to_string(),
                message: "hello there".to_string(),
            },
            Packet::AttackStart { target_id: 2 },
            Packet::AttackSwing {
                attacker_id: 1,
                target_id: 2,
                damage: 20,
                target_health: 60,
            },
            Packet::AttackStop,
            Packet::Respawn {
                id: 2,
                position: Vec3::new(4.0, 0.0, 5.0),
                orientation: 3.0,
            },
            Packet::TimeSync { sequence_index: 3 },
            Packet::TimeSyncResponse {
                sequence_index: 3,
                timestamp: 1_234_567,
            },
        ];

        for packet in packets {
            let decoded = decode_frame(&packet.encode()).unwrap();
            assert_eq!(decoded, vec![packet]);
        }
    }

    #[test]
    fn test_move_update_wire_layout() {
        let packet = Packet::MoveUpdate {
            id: 1,
            flags: MovementFlags::FORWARD,
            position: Vec3::new(1.0, 0.0, 0.0),
            orientation: 0.0,
        };
        assert_eq!(packet.encode(), "[5,1,1,1.0,0.0,0.0,0.0]");
        assert_eq!(Packet::AttackStop.encode(), "[9]");
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let packets = decode_frame(r#"["4","3","1.5","0","-2","0.25"]"#).unwrap();
        assert_eq!(
            packets,
            vec![Packet::Move {
                flags: MovementFlags::FORWARD | MovementFlags::BACKWARD,
                position: Vec3::new(1.5, 0.0, -2.0),
                orientation: 0.25,
            }]
        );
    }

    #[test]
    fn test_numeric_name_becomes_string() {
        let packets = decode_frame("[0,5123]").unwrap();
        assert_eq!(
            packets,
            vec![Packet::Hello {
                player_name: "5123".to_string()
            }]
        );
    }

    #[test]
    fn test_batch_preserves_order_and_skips_unknown() {
        let frame = "[[3,1],[99,\"x\"],[3,2],[7,5]]";
        let packets = decode_frame(frame).unwrap();
        assert_eq!(
            packets,
            vec![
                Packet::Despawn { id: 1 },
                Packet::Despawn { id: 2 },
                Packet::AttackStart { target_id: 5 },
            ]
        );
    }

    #[test]
    fn test_encode_batch_is_detected_as_batch() {
        let batch = vec![Packet::Despawn { id: 9 }, Packet::AttackStop];
        let text = encode_batch(&batch);
        assert_eq!(text, "[[3,9],[9]]");
        assert_eq!(decode_frame(&text).unwrap(), batch);
    }

    #[test]
    fn test_unknown_opcode_is_dropped_not_fatal() {
        assert!(decode_frame("[42,1,2]").unwrap().is_empty());
        assert!(matches!(
            Packet::from_value(&json!([42, 1, 2])),
            Err(DecodeError::UnknownOpcode(_))
        ));
    }

    #[test]
    fn test_frame_level_errors() {
        assert!(matches!(decode_frame("{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode_frame("\"go\""), Err(DecodeError::NotAnArray)));
        assert!(matches!(decode_frame("{\"a\":1}"), Err(DecodeError::NotAnArray)));
        assert!(decode_frame("[]").unwrap().is_empty());
    }

    #[test]
    fn test_field_validation() {
        assert!(matches!(
            Packet::from_value(&json!([3])),
            Err(DecodeError::MissingField { field: "id", .. })
        ));
        assert!(matches!(
            Packet::from_value(&json!([3, 1.5])),
            Err(DecodeError::InvalidField { field: "id", .. })
        ));
        assert!(matches!(
            Packet::from_value(&json!([3, -1])),
            Err(DecodeError::InvalidField { .. })
        ));
        assert!(matches!(
            Packet::from_value(&json!([4, 1, "north", 0, 0, 0])),
            Err(DecodeError::InvalidField { field: "x", .. })
        ));
        assert!(matches!(
            Packet::from_value(&json!([4, 0, 1e300, 0, 0, 0])),
            Err(DecodeError::InvalidField { field: "x", .. })
        ));
        assert!(matches!(
            Packet::from_value(&json!([4, 0, 0, 0, 0, "-1e39"])),
            Err(DecodeError::InvalidField { field: "orientation", .. })
        ));
        assert!(decode_frame("[4,0,1e300,0,0,0]").expect("frame").is_empty());
    }
}
