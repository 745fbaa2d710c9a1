//! Per-room host election and migration.
//!
//! Exactly one participant per room is elected "host": the client trusted by
//! convention to run turn logic and seat reassignment. There is no atomic
//! cross-client commit -- only the host's own belief gates its host-only
//! actions, so momentary disagreement across clients is tolerated. A room may
//! transiently have no host at all (all spectators, or the gap between a
//! disconnect and re-election); turn advancement is simply unavailable then.

use crate::protocol::ParticipantId;

/// Outcome of re-evaluating a room's host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostDecision {
    /// The recorded host is still valid; nothing to broadcast.
    Unchanged,
    /// Record `participant_id` as host and broadcast the assignment.
    Assign(ParticipantId),
    /// No eligible participant remains; clear the host and broadcast.
    Clear,
}

/// Re-evaluate the host when a participant joins.
///
/// `players` is the connected non-spectator ids in registration order,
/// including the joiner. If no host is recorded, or the recorded host is no
/// longer among the connected players, the joining non-spectator becomes
/// host. A joining spectator never disturbs the recorded host.
pub fn evaluate_join(
    host: Option<&str>,
    players: &[ParticipantId],
    joiner: &str,
    spectator: bool,
) -> HostDecision {
    if spectator {
        return HostDecision::Unchanged;
    }
    match host {
        Some(current) if players.iter().any(|p| p == current) => HostDecision::Unchanged,
        _ => HostDecision::Assign(joiner.to_owned()),
    }
}

/// Re-evaluate the host when a participant leaves.
///
/// If the departing participant was host, promote the first remaining
/// connected non-spectator in registration order; if none remain, clear.
pub fn evaluate_leave(
    host: Option<&str>,
    departed: &str,
    remaining_players: &[ParticipantId],
) -> HostDecision {
    match host {
        Some(current) if current == departed => match remaining_players.first() {
            Some(next) => HostDecision::Assign(next.clone()),
            None => HostDecision::Clear,
        },
        _ => HostDecision::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players(ids: &[&str]) -> Vec<ParticipantId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_player_becomes_host() {
        let decision = evaluate_join(None, &players(&["a"]), "a", false);
        assert_eq!(decision, HostDecision::Assign("a".into()));
    }

    #[test]
    fn test_joining_spectator_never_elected() {
        let decision = evaluate_join(None, &players(&[]), "watcher", true);
        assert_eq!(decision, HostDecision::Unchanged);
    }

    #[test]
    fn test_valid_host_survives_later_joins() {
        let decision = evaluate_join(Some("a"), &players(&["a", "b"]), "b", false);
        assert_eq!(decision, HostDecision::Unchanged);
    }

    #[test]
    fn test_stale_host_replaced_by_joiner() {
        // Recorded host "ghost" no longer among connected players.
        let decision = evaluate_join(Some("ghost"), &players(&["a", "b"]), "b", false);
        assert_eq!(decision, HostDecision::Assign("b".into()));
    }

    #[test]
    fn test_host_leave_promotes_next_in_registration_order() {
        let decision = evaluate_leave(Some("a"), "a", &players(&["b", "c"]));
        assert_eq!(decision, HostDecision::Assign("b".into()));
    }

    #[test]
    fn test_last_player_leaving_clears_host() {
        let decision = evaluate_leave(Some("a"), "a", &players(&[]));
        assert_eq!(decision, HostDecision::Clear);
    }

    #[test]
    fn test_non_host_leave_is_unchanged() {
        let decision = evaluate_leave(Some("a"), "b", &players(&["a", "c"]));
        assert_eq!(decision, HostDecision::Unchanged);
    }
}
