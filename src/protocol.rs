//! Transport-agnostic message surface.
//!
//! Every frame is a JSON envelope `{"t": <message type>, "p": <payload>}`.
//! Participant attribute bags are opaque to this layer: the core never
//! interprets their values except through the elimination predicate in
//! [`crate::sync::turn`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Room identifier, derived from a shareable path segment.
pub type RoomId = String;

/// Session-scoped participant identifier. Distinct from any persistent
/// account id -- a fresh transport session may reuse it to reconnect.
pub type ParticipantId = String;

/// One participant's visible state: life, poison, commander references,
/// tokens, active roll, claimed statuses, display name, persistence links.
/// An opaque key/value bag as far as the sync core is concerned.
pub type AttributeMap = serde_json::Map<String, serde_json::Value>;

/// Per-room cache of every participant's last-known attribute map.
pub type SharedState = BTreeMap<ParticipantId, AttributeMap>;

/// Whose turn it is, and how many laps the table has completed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TurnDescriptor {
    /// `None` means no turn is active yet.
    #[serde(default)]
    pub active_participant_id: Option<ParticipantId>,
    /// Monotonically non-decreasing; bumped each time the seat permutation
    /// wraps back to its start.
    #[serde(default)]
    pub turn_count: u32,
}

/// A live room member as reported in the join snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant_id: ParticipantId,
    pub spectator: bool,
}

/// Messages a client sends to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "p", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter a room, lazily creating it. Also how a dropped session
    /// reconnects: same room, same participant id.
    JoinRoom {
        room_id: RoomId,
        participant_id: ParticipantId,
        #[serde(default)]
        spectator: bool,
    },
    /// Shallow-merge `delta` into the target participant's cached attribute
    /// map. The target may be another participant (e.g. recording commander
    /// damage dealt to you).
    StateDelta {
        participant_id: ParticipantId,
        delta: AttributeMap,
    },
    /// Host-computed turn descriptor. The relay caches and rebroadcasts it
    /// without judging whether the sender really is host.
    SetTurn { turn: TurnDescriptor },
    /// Explicit game restart: replaces the room's entire cache wholesale.
    ResetRoom {
        shared_state: SharedState,
        turn: TurnDescriptor,
    },
    /// Host-driven seat reordering.
    SetSeatOrder { order: Vec<ParticipantId> },
    /// Claim an exclusive table status (monarch, initiative, ...). Clearing
    /// the flag on everyone else is a client-side convention.
    ClaimStatus {
        kind: String,
        participant_id: ParticipantId,
    },
    /// Opaque audio/video negotiation payload relayed to one participant.
    Signal {
        to: ParticipantId,
        payload: serde_json::Value,
    },
}

/// Messages the relay sends to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "p", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join snapshot, sent only to the joiner: the room as it stood before
    /// they were appended.
    RoomJoined {
        shared_state: SharedState,
        turn: TurnDescriptor,
        seat_order: Vec<ParticipantId>,
        participants: Vec<ParticipantInfo>,
    },
    ParticipantJoined {
        participant_id: ParticipantId,
        spectator: bool,
    },
    /// Keyed by logical participant id, never by transport connection id.
    ParticipantLeft { participant_id: ParticipantId },
    /// The raw delta as sent, not the merged result -- every receiver
    /// performs the identical shallow merge locally.
    StateDelta {
        participant_id: ParticipantId,
        delta: AttributeMap,
    },
    TurnUpdated { turn: TurnDescriptor },
    RoomReset {
        shared_state: SharedState,
        turn: TurnDescriptor,
    },
    SeatOrderUpdated { order: Vec<ParticipantId> },
    StatusClaimed {
        kind: String,
        participant_id: ParticipantId,
    },
    /// Emitted on every host assignment or clearing. `None` while a room
    /// transiently has no eligible host.
    HostChanged {
        participant_id: Option<ParticipantId>,
    },
    Signal {
        from: ParticipantId,
        payload: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let msg = ClientMessage::JoinRoom {
            room_id: "kitchen-table".into(),
            participant_id: "p1".into(),
            spectator: false,
        };
        let val = serde_json::to_value(&msg).unwrap();
        assert_eq!(val["t"], "join_room");
        assert_eq!(val["p"]["room_id"], "kitchen-table");
        assert_eq!(val["p"]["spectator"], false);
    }

    #[test]
    fn test_spectator_flag_defaults_false() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"t": "join_room", "p": {"room_id": "r", "participant_id": "p"}}))
                .unwrap();
        match msg {
            ClientMessage::JoinRoom { spectator, .. } => assert!(!spectator),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_turn_descriptor_defaults() {
        let turn: TurnDescriptor = serde_json::from_value(json!({})).unwrap();
        assert_eq!(turn.active_participant_id, None);
        assert_eq!(turn.turn_count, 0);
    }

    #[test]
    fn test_server_message_roundtrip() {
        let msg = ServerMessage::HostChanged {
            participant_id: Some("p2".into()),
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_str(&encoded).unwrap();
        match decoded {
            ServerMessage::HostChanged { participant_id } => {
                assert_eq!(participant_id.as_deref(), Some("p2"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
