//! Host-executed turn rotation.
//!
//! A pure state machine: transitions are computed only by whichever client
//! currently believes itself host, then broadcast and cached for the whole
//! room. Host-exclusive execution is the cheap single-writer substitute for
//! consensus -- it avoids two clients racing to emit conflicting descriptors.

use crate::protocol::{AttributeMap, ParticipantId, TurnDescriptor};

/// Seat-index walk for exactly four seats: cross-table order rather than
/// linear rotation, so opponents alternate sides.
const CROSS_TABLE_ORDER: [usize; 4] = [0, 1, 3, 2];

/// The fixed seat-index permutation for a table of `seat_count` seats.
pub fn seat_permutation(seat_count: usize) -> Vec<usize> {
    if seat_count == 4 {
        CROSS_TABLE_ORDER.to_vec()
    } else {
        (0..seat_count).collect()
    }
}

/// The one narrow predicate through which the sync core reads into the
/// otherwise-opaque attribute map: a seat is skipped when its player sits
/// at `life <= 0` or `poison >= 10`. Missing keys count as alive.
pub fn is_eliminated(attrs: &AttributeMap) -> bool {
    let life = attrs.get("life").and_then(serde_json::Value::as_f64);
    let poison = attrs
        .get("poison")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0);
    matches!(life, Some(l) if l <= 0.0) || poison >= 10.0
}

/// Advance the active seat by one step.
///
/// From no active turn: activate the first entry of `seats` with
/// `turn_count = 1`. From an active turn: step through the seat permutation,
/// incrementing `turn_count` each time the permutation wraps to its start
/// and skipping seats the `eliminated` predicate rejects, for at most one
/// full lap. If every other seat is eliminated the descriptor is returned
/// unchanged rather than looping indefinitely; a solo non-eliminated seat
/// wraps onto itself with the count bumped.
///
/// An active participant no longer present in `seats` (they disconnected)
/// restarts the walk at the first seat, preserving `turn_count`.
pub fn advance<F>(
    current: &TurnDescriptor,
    seats: &[ParticipantId],
    eliminated: F,
) -> TurnDescriptor
where
    F: Fn(&str) -> bool,
{
    if seats.is_empty() {
        return current.clone();
    }
    let permutation = seat_permutation(seats.len());

    let active_position = current
        .active_participant_id
        .as_deref()
        .and_then(|id| seats.iter().position(|seat| seat == id))
        .and_then(|seat_index| permutation.iter().position(|&p| p == seat_index));

    let position = match active_position {
        Some(position) => position,
        None => {
            // First activation, or the active seat vanished mid-game.
            let turn_count = if current.active_participant_id.is_none() {
                current.turn_count.max(1)
            } else {
                current.turn_count
            };
            return TurnDescriptor {
                active_participant_id: Some(seats[permutation[0]].clone()),
                turn_count,
            };
        }
    };

    let mut laps = 0u32;
    for step in 1..=permutation.len() {
        let next = (position + step) % permutation.len();
        if next == 0 {
            laps += 1;
        }
        if step == permutation.len() {
            // Full wrap. A solo seat legitimately starts its next turn;
            // with more seats it means every other seat is eliminated.
            if permutation.len() == 1 && !eliminated(&seats[0]) {
                return TurnDescriptor {
                    active_participant_id: Some(seats[0].clone()),
                    turn_count: current.turn_count + laps,
                };
            }
            return current.clone();
        }
        let candidate = &seats[permutation[next]];
        if !eliminated(candidate) {
            return TurnDescriptor {
                active_participant_id: Some(candidate.clone()),
                turn_count: current.turn_count + laps,
            };
        }
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn seats(ids: &[&str]) -> Vec<ParticipantId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn nobody_eliminated(_: &str) -> bool {
        false
    }

    fn descriptor(active: Option<&str>, count: u32) -> TurnDescriptor {
        TurnDescriptor {
            active_participant_id: active.map(str::to_owned),
            turn_count: count,
        }
    }

    #[test]
    fn test_first_advance_activates_first_seat() {
        let next = advance(
            &TurnDescriptor::default(),
            &seats(&["a", "b", "c"]),
            nobody_eliminated,
        );
        assert_eq!(next, descriptor(Some("a"), 1));
    }

    #[test]
    fn test_empty_seat_order_is_a_noop() {
        let current = descriptor(Some("a"), 3);
        assert_eq!(advance(&current, &[], nobody_eliminated), current);
    }

    #[test]
    fn test_four_seats_walk_cross_table_order() {
        let table = seats(&["a", "b", "c", "d"]);
        let mut turn = advance(&TurnDescriptor::default(), &table, nobody_eliminated);

        // Two full laps: a, b, d, c, a, b, d, c -- count bumps once per lap.
        let expected = [
            ("b", 1),
            ("d", 1),
            ("c", 1),
            ("a", 2),
            ("b", 2),
            ("d", 2),
            ("c", 2),
            ("a", 3),
        ];
        for (id, count) in expected {
            turn = advance(&turn, &table, nobody_eliminated);
            assert_eq!(turn, descriptor(Some(id), count));
        }
    }

    #[test]
    fn test_non_four_seat_tables_rotate_linearly() {
        let table = seats(&["a", "b", "c"]);
        let mut turn = advance(&TurnDescriptor::default(), &table, nobody_eliminated);
        for (id, count) in [("b", 1), ("c", 1), ("a", 2), ("b", 2)] {
            turn = advance(&turn, &table, nobody_eliminated);
            assert_eq!(turn, descriptor(Some(id), count));
        }
    }

    #[test]
    fn test_eliminated_seat_is_skipped_without_stalling() {
        let table = seats(&["a", "b", "c"]);
        let eliminated = |id: &str| id == "b";

        // a -> c (b skipped), then c -> a with the lap counted.
        let turn = advance(&descriptor(Some("a"), 1), &table, eliminated);
        assert_eq!(turn, descriptor(Some("c"), 1));
        let turn = advance(&turn, &table, eliminated);
        assert_eq!(turn, descriptor(Some("a"), 2));
    }

    #[test]
    fn test_all_other_seats_eliminated_remains_in_place() {
        let table = seats(&["a", "b", "c"]);
        let current = descriptor(Some("a"), 4);
        let next = advance(&current, &table, |id| id != "a");
        assert_eq!(next, current);
    }

    #[test]
    fn test_solo_seat_still_takes_turns() {
        let table = seats(&["a"]);
        let turn = advance(&descriptor(Some("a"), 2), &table, nobody_eliminated);
        assert_eq!(turn, descriptor(Some("a"), 3));
    }

    #[test]
    fn test_departed_active_seat_restarts_walk() {
        let table = seats(&["b", "c"]);
        let next = advance(&descriptor(Some("a"), 5), &table, nobody_eliminated);
        assert_eq!(next, descriptor(Some("b"), 5));
    }

    #[test]
    fn test_elimination_predicate_thresholds() {
        let mut by_id: HashMap<&str, AttributeMap> = HashMap::new();
        for (id, attrs) in [
            ("healthy", json!({"life": 35, "poison": 2})),
            ("zero_life", json!({"life": 0})),
            ("negative_life", json!({"life": -4, "poison": 0})),
            ("poisoned_out", json!({"life": 20, "poison": 10})),
            ("unknown", json!({"username": "ghost"})),
        ] {
            match attrs {
                serde_json::Value::Object(map) => {
                    by_id.insert(id, map);
                }
                _ => unreachable!(),
            }
        }

        assert!(!is_eliminated(&by_id["healthy"]));
        assert!(is_eliminated(&by_id["zero_life"]));
        assert!(is_eliminated(&by_id["negative_life"]));
        assert!(is_eliminated(&by_id["poisoned_out"]));
        // No life key at all means the seat has not reported state -- alive.
        assert!(!is_eliminated(&by_id["unknown"]));
    }
}
