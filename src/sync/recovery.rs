//! Reconnection recovery.
//!
//! A client-side mirror of one session's view of its room. Feeding every
//! received [`ServerMessage`] through [`SessionMirror::observe`] keeps the
//! mirror current; on transport reconnection, [`SessionMirror::reconnect_messages`]
//! yields exactly what the protocol requires to heal both sides: a fresh
//! `JoinRoom` for the same room and participant id, a re-push of the last
//! locally-known own attribute map (repairing the server cache if the server
//! process restarted and lost memory), and -- if this session currently
//! believes itself host -- a re-broadcast of the turn descriptor to repair
//! any peer that joined during the outage. A reconnect is otherwise
//! indistinguishable from a fresh join: seat or host status lost during the
//! gap is not automatically reversed.

use crate::protocol::{
    AttributeMap, ClientMessage, ParticipantId, RoomId, ServerMessage, SharedState, TurnDescriptor,
};
use crate::sync::cache::merge_delta;
use crate::sync::turn;

#[derive(Debug, Clone)]
pub struct SessionMirror {
    room_id: RoomId,
    participant_id: ParticipantId,
    spectator: bool,
    shared: SharedState,
    seat_order: Vec<ParticipantId>,
    turn: TurnDescriptor,
    host: Option<ParticipantId>,
}

impl SessionMirror {
    pub fn new(room_id: &str, participant_id: &str, spectator: bool) -> Self {
        Self {
            room_id: room_id.to_owned(),
            participant_id: participant_id.to_owned(),
            spectator,
            shared: SharedState::new(),
            seat_order: Vec::new(),
            turn: TurnDescriptor::default(),
            host: None,
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn turn(&self) -> &TurnDescriptor {
        &self.turn
    }

    pub fn seat_order(&self) -> &[ParticipantId] {
        &self.seat_order
    }

    pub fn attributes(&self, participant_id: &str) -> Option<&AttributeMap> {
        self.shared.get(participant_id)
    }

    /// Only the session's *own* belief gates its host-only actions; this is
    /// the convention-based single-writer substitute for consensus.
    pub fn believes_host(&self) -> bool {
        self.host.as_deref() == Some(self.participant_id.as_str())
    }

    pub fn join_message(&self) -> ClientMessage {
        ClientMessage::JoinRoom {
            room_id: self.room_id.clone(),
            participant_id: self.participant_id.clone(),
            spectator: self.spectator,
        }
    }

    /// Record a local edit and produce the delta to send. The target may be
    /// another participant (counters dealt to you are recorded by you).
    pub fn local_delta(&mut self, target: &str, delta: AttributeMap) -> ClientMessage {
        let entry = self.shared.entry(target.to_owned()).or_default();
        merge_delta(entry, &delta);
        ClientMessage::StateDelta {
            participant_id: target.to_owned(),
            delta,
        }
    }

    /// Compute the next turn, if this session believes itself host. The
    /// elimination predicate reads the mirror's cached attribute maps; seats
    /// with no cached record count as alive.
    pub fn advance_turn(&self) -> Option<ClientMessage> {
        if !self.believes_host() {
            return None;
        }
        let next = turn::advance(&self.turn, &self.seat_order, |id| {
            self.shared.get(id).map(turn::is_eliminated).unwrap_or(false)
        });
        Some(ClientMessage::SetTurn { turn: next })
    }

    /// Everything to send, in order, after the transport comes back.
    pub fn reconnect_messages(&self) -> Vec<ClientMessage> {
        let mut messages = vec![self.join_message()];
        if let Some(own) = self.shared.get(&self.participant_id) {
            if !own.is_empty() {
                messages.push(ClientMessage::StateDelta {
                    participant_id: self.participant_id.clone(),
                    delta: own.clone(),
                });
            }
        }
        if self.believes_host() {
            messages.push(ClientMessage::SetTurn {
                turn: self.turn.clone(),
            });
        }
        messages
    }

    fn seat(&mut self, participant_id: &str) {
        if !self.seat_order.iter().any(|s| s == participant_id) {
            self.seat_order.push(participant_id.to_owned());
        }
    }

    /// Apply one received server message to the mirror.
    pub fn observe(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::RoomJoined {
                shared_state,
                turn,
                seat_order,
                ..
            } => {
                // The snapshot precedes our own re-pushed delta, so keep the
                // local view of ourselves layered on top: that is what the
                // room converges to once the re-push lands.
                let own = self.shared.remove(&self.participant_id);
                self.shared = shared_state.clone();
                if let Some(own) = own {
                    let entry = self.shared.entry(self.participant_id.clone()).or_default();
                    merge_delta(entry, &own);
                }
                self.turn = turn.clone();
                self.seat_order = seat_order.clone();
                // The snapshot is pre-append: our own seat is never in it.
                if !self.spectator {
                    let own = self.participant_id.clone();
                    self.seat(&own);
                }
            }
            ServerMessage::ParticipantJoined {
                participant_id,
                spectator,
            } => {
                if !spectator {
                    self.seat(participant_id);
                }
            }
            ServerMessage::ParticipantLeft { participant_id } => {
                // Attributes stay cached -- the seat may reconnect.
                self.seat_order.retain(|s| s != participant_id);
            }
            ServerMessage::StateDelta {
                participant_id,
                delta,
            } => {
                let entry = self.shared.entry(participant_id.clone()).or_default();
                merge_delta(entry, delta);
            }
            ServerMessage::TurnUpdated { turn } => {
                self.turn = turn.clone();
            }
            ServerMessage::RoomReset { shared_state, turn } => {
                self.shared = shared_state.clone();
                self.turn = turn.clone();
            }
            ServerMessage::SeatOrderUpdated { order } => {
                self.seat_order = order.clone();
            }
            ServerMessage::StatusClaimed {
                kind,
                participant_id,
            } => {
                // Exclusive by convention: clear the flag everywhere else,
                // set it on the claimant.
                for (id, attrs) in self.shared.iter_mut() {
                    if id != participant_id {
                        attrs.remove(kind);
                    }
                }
                self.shared
                    .entry(participant_id.clone())
                    .or_default()
                    .insert(kind.clone(), serde_json::Value::Bool(true));
            }
            ServerMessage::HostChanged { participant_id } => {
                self.host = participant_id.clone();
            }
            // Opaque A/V negotiation payloads never touch the mirror.
            ServerMessage::Signal { .. } => {}
        }
    }
}
