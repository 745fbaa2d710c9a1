//! Room-scoped connection registry.
//!
//! Maps each live connection to (room, participant id, spectator flag) and
//! owns the broadcast fan-out. Rooms are created lazily on first join and
//! persist in process memory for the process lifetime -- a known limitation
//! of the design, kept deliberately. Each room's mutable state sits behind
//! its own lock inside a concurrent map, so mutation is linearized per room
//! and contention scales with concurrent rooms, not total participants.
//! There is no ordering guarantee across rooms.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::protocol::{
    AttributeMap, ClientMessage, ParticipantId, ParticipantInfo, RoomId, ServerMessage,
    SharedState, TurnDescriptor,
};
use crate::sync::arbiter::{self, HostDecision};
use crate::sync::cache::SharedStateCache;

/// Transport connection identifier. Distinct from the logical participant
/// id: a reconnect is a fresh connection reusing the same participant id.
pub type ConnId = String;

/// Frames sent through a connection's outbound channel. Registry traffic is
/// always `Event`; the transport layer uses `Pong` for control frames.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Event(ServerMessage),
    Pong(Vec<u8>),
}

/// Cloneable sender handle for one connection's outbound channel.
///
/// Sends never block and failures are ignored: a closed channel just means
/// the connection is already gone and its `Leave` is in flight.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self { tx }
    }

    pub fn send(&self, msg: ServerMessage) {
        let _ = self.tx.send(OutboundFrame::Event(msg));
    }

    pub fn pong(&self, payload: Vec<u8>) {
        let _ = self.tx.send(OutboundFrame::Pong(payload));
    }
}

struct Member {
    participant_id: ParticipantId,
    spectator: bool,
    conn_id: ConnId,
    handle: ConnectionHandle,
}

/// One room's synchronized state. Only ever touched under the room lock.
#[derive(Default)]
struct Room {
    /// Registration order -- the arbiter's stable promotion order.
    members: Vec<Member>,
    /// Connected non-spectator ids defining turn and layout order.
    seat_order: Vec<ParticipantId>,
    host: Option<ParticipantId>,
    cache: SharedStateCache,
}

impl Room {
    fn players(&self) -> Vec<ParticipantId> {
        self.members
            .iter()
            .filter(|m| !m.spectator)
            .map(|m| m.participant_id.clone())
            .collect()
    }

    fn broadcast(&self, msg: &ServerMessage) {
        for member in &self.members {
            member.handle.send(msg.clone());
        }
    }

    fn broadcast_except(&self, conn_id: &str, msg: &ServerMessage) {
        for member in &self.members {
            if member.conn_id != conn_id {
                member.handle.send(msg.clone());
            }
        }
    }

    /// Record an arbiter decision. Returns true when the recorded host
    /// actually changed and `HostChanged` must be broadcast.
    fn apply_host_decision(&mut self, decision: HostDecision) -> bool {
        match decision {
            HostDecision::Unchanged => false,
            HostDecision::Assign(id) => {
                if self.host.as_ref() == Some(&id) {
                    false
                } else {
                    self.host = Some(id);
                    true
                }
            }
            HostDecision::Clear => {
                if self.host.is_none() {
                    false
                } else {
                    self.host = None;
                    true
                }
            }
        }
    }
}

/// The connection registry and per-room message router.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<Mutex<Room>>>,
    /// conn_id -> (room, participant). Entries exist only after a join.
    connections: DashMap<ConnId, (RoomId, ParticipantId)>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Route one inbound message. Nothing here is ever rejected for naming
    /// an unknown room or participant -- absence means "not yet created".
    pub fn handle_message(&self, conn_id: &str, handle: &ConnectionHandle, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinRoom {
                room_id,
                participant_id,
                spectator,
            } => self.join(conn_id, handle.clone(), &room_id, &participant_id, spectator),
            ClientMessage::StateDelta {
                participant_id,
                delta,
            } => self.apply_delta(conn_id, &participant_id, delta),
            ClientMessage::SetTurn { turn } => self.set_turn(conn_id, turn),
            ClientMessage::ResetRoom { shared_state, turn } => {
                self.reset_room(conn_id, shared_state, turn)
            }
            ClientMessage::SetSeatOrder { order } => self.set_seat_order(conn_id, order),
            ClientMessage::ClaimStatus {
                kind,
                participant_id,
            } => self.claim_status(conn_id, kind, participant_id),
            ClientMessage::Signal { to, payload } => self.relay_signal(conn_id, &to, payload),
        }
    }

    /// Register a connection in a room, lazily creating the room.
    ///
    /// The joiner receives the room's cached shared state, turn descriptor,
    /// seat order, and live participant list as they stood *before* the join;
    /// everyone else receives `ParticipantJoined`. A join that reuses an
    /// already-present participant id is a reconnect: the stale handle is
    /// replaced in place and the seat order is left without duplicates.
    pub fn join(
        &self,
        conn_id: &str,
        handle: ConnectionHandle,
        room_id: &str,
        participant_id: &str,
        spectator: bool,
    ) {
        // A connection hopping to a different room leaves its old one first.
        let previous_room = self
            .connections
            .get(conn_id)
            .map(|entry| entry.value().0.clone());
        if matches!(previous_room, Some(ref prev) if prev != room_id) {
            self.leave(conn_id);
        }

        let room_arc = self
            .rooms
            .entry(room_id.to_owned())
            .or_default()
            .value()
            .clone();
        self.connections.insert(
            conn_id.to_owned(),
            (room_id.to_owned(), participant_id.to_owned()),
        );

        let mut room = room_arc.lock().unwrap();

        // The same connection re-identifying under a new participant id is a
        // leave of its old identity; otherwise both would share one socket
        // and the orphan could never be removed.
        if let Some(index) = room
            .members
            .iter()
            .position(|m| m.conn_id == conn_id && m.participant_id != participant_id)
        {
            let stale = room.members.remove(index);
            room.seat_order.retain(|s| s != &stale.participant_id);
            room.broadcast(&ServerMessage::ParticipantLeft {
                participant_id: stale.participant_id.clone(),
            });
            let decision = arbiter::evaluate_leave(
                room.host.as_deref(),
                &stale.participant_id,
                &room.players(),
            );
            if room.apply_host_decision(decision) {
                let host = room.host.clone();
                room.broadcast(&ServerMessage::HostChanged {
                    participant_id: host,
                });
            }
        }

        // Snapshot before the joiner is appended.
        handle.send(ServerMessage::RoomJoined {
            shared_state: room.cache.snapshot(),
            turn: room.cache.turn().clone(),
            seat_order: room.seat_order.clone(),
            participants: room
                .members
                .iter()
                .filter(|m| m.participant_id != participant_id)
                .map(|m| ParticipantInfo {
                    participant_id: m.participant_id.clone(),
                    spectator: m.spectator,
                })
                .collect(),
        });

        let joined = ServerMessage::ParticipantJoined {
            participant_id: participant_id.to_owned(),
            spectator,
        };
        for member in &room.members {
            if member.participant_id != participant_id {
                member.handle.send(joined.clone());
            }
        }

        match room
            .members
            .iter_mut()
            .find(|m| m.participant_id == participant_id)
        {
            Some(member) => {
                member.conn_id = conn_id.to_owned();
                member.spectator = spectator;
                member.handle = handle.clone();
            }
            None => room.members.push(Member {
                participant_id: participant_id.to_owned(),
                spectator,
                conn_id: conn_id.to_owned(),
                handle: handle.clone(),
            }),
        }
        if spectator {
            room.seat_order.retain(|s| s != participant_id);
        } else if !room.seat_order.iter().any(|s| s == participant_id) {
            room.seat_order.push(participant_id.to_owned());
        }

        let decision =
            arbiter::evaluate_join(room.host.as_deref(), &room.players(), participant_id, spectator);
        if room.apply_host_decision(decision) {
            let host = room.host.clone();
            info!(room = room_id, host = ?host, "host assigned on join");
            room.broadcast(&ServerMessage::HostChanged {
                participant_id: host,
            });
        } else {
            // The join snapshot carries no host field; repair the joiner's
            // view directly so it learns who currently drives turns.
            handle.send(ServerMessage::HostChanged {
                participant_id: room.host.clone(),
            });
        }
        info!(room = room_id, participant = participant_id, spectator, "participant joined");
    }

    /// Remove a connection on transport disconnect.
    ///
    /// Keyed strictly by connection id: a stale socket closing after its
    /// participant already reconnected must not evict the new session.
    pub fn leave(&self, conn_id: &str) {
        let Some((_, (room_id, _))) = self.connections.remove(conn_id) else {
            return;
        };
        let Some(room_arc) = self.rooms.get(&room_id).map(|entry| entry.value().clone()) else {
            return;
        };
        let mut room = room_arc.lock().unwrap();
        let Some(index) = room.members.iter().position(|m| m.conn_id == conn_id) else {
            return;
        };
        let member = room.members.remove(index);
        room.seat_order.retain(|s| s != &member.participant_id);
        room.broadcast(&ServerMessage::ParticipantLeft {
            participant_id: member.participant_id.clone(),
        });

        let decision = arbiter::evaluate_leave(
            room.host.as_deref(),
            &member.participant_id,
            &room.players(),
        );
        if room.apply_host_decision(decision) {
            let host = room.host.clone();
            info!(room = room_id, host = ?host, "host migrated on leave");
            room.broadcast(&ServerMessage::HostChanged {
                participant_id: host,
            });
        }
        info!(room = room_id, participant = member.participant_id, "participant left");
    }

    /// Merge a delta into the target participant's cached attributes and
    /// rebroadcast the raw delta to every other room member. The cached
    /// record is created on demand; the sender does not get an echo.
    pub fn apply_delta(&self, conn_id: &str, target: &str, delta: AttributeMap) {
        let Some((room_arc, _)) = self.room_of(conn_id) else {
            return;
        };
        let mut room = room_arc.lock().unwrap();
        room.cache.apply_delta(target, &delta);
        debug!(participant = target, keys = delta.len(), "state delta applied");
        room.broadcast_except(
            conn_id,
            &ServerMessage::StateDelta {
                participant_id: target.to_owned(),
                delta,
            },
        );
    }

    /// Cache a host-computed turn descriptor and broadcast it to the whole
    /// room, sender included (spectators too).
    pub fn set_turn(&self, conn_id: &str, turn: TurnDescriptor) {
        let Some((room_arc, _)) = self.room_of(conn_id) else {
            return;
        };
        let mut room = room_arc.lock().unwrap();
        room.cache.set_turn(turn.clone());
        room.broadcast(&ServerMessage::TurnUpdated { turn });
    }

    /// Replace the room's entire cache atomically (explicit game restart).
    pub fn reset_room(&self, conn_id: &str, shared_state: SharedState, turn: TurnDescriptor) {
        let Some((room_arc, _)) = self.room_of(conn_id) else {
            return;
        };
        let mut room = room_arc.lock().unwrap();
        room.cache.reset(shared_state.clone(), turn.clone());
        info!("room reset");
        room.broadcast(&ServerMessage::RoomReset { shared_state, turn });
    }

    pub fn set_seat_order(&self, conn_id: &str, order: Vec<ParticipantId>) {
        let Some((room_arc, _)) = self.room_of(conn_id) else {
            return;
        };
        let mut room = room_arc.lock().unwrap();
        room.seat_order = order.clone();
        room.broadcast(&ServerMessage::SeatOrderUpdated { order });
    }

    /// Broadcast an exclusive-status claim. The cache stores nothing for
    /// this: clearing the flag from all other participants is a client-side
    /// convention, not cache-enforced.
    pub fn claim_status(&self, conn_id: &str, kind: String, participant_id: ParticipantId) {
        let Some((room_arc, _)) = self.room_of(conn_id) else {
            return;
        };
        let room = room_arc.lock().unwrap();
        room.broadcast(&ServerMessage::StatusClaimed {
            kind,
            participant_id,
        });
    }

    /// Relay an opaque peer-negotiation payload to one participant. The
    /// payload is never inspected.
    pub fn relay_signal(&self, conn_id: &str, to: &str, payload: serde_json::Value) {
        let Some((room_arc, from)) = self.room_of(conn_id) else {
            return;
        };
        let room = room_arc.lock().unwrap();
        if let Some(target) = room.members.iter().find(|m| m.participant_id == to) {
            target.handle.send(ServerMessage::Signal { from, payload });
        }
    }

    fn room_of(&self, conn_id: &str) -> Option<(Arc<Mutex<Room>>, ParticipantId)> {
        let (room_id, participant_id) = self.connections.get(conn_id)?.value().clone();
        let room = self.rooms.get(&room_id)?.value().clone();
        Some((room, participant_id))
    }
}
