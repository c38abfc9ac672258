//! Seating allocation: roster reconciliation and speaker promotion.
//!
//! Every operation takes the previous [`SeatingState`] by reference and
//! returns a [`Transition`] holding the next state plus the effects that move
//! the visible stage from one to the other. Randomness (side choice when both
//! sides are full) is injected as an [`Rng`].

use rand::Rng;
use tracing::{debug, trace};

use crate::config::{Capacity, JoinPolicy, SeatingConfig};
use crate::effect::{diff, Transition};
use crate::roster::{last_rendered_author, ChatEntry};
use crate::state::{SeatingState, Side};

fn capacity(config: &SeatingConfig, side: Side) -> Capacity {
    match side {
        Side::Left => config.capacity_left,
        Side::Right => config.capacity_right,
    }
}

fn has_room(state: &SeatingState, config: &SeatingConfig, side: Side) -> bool {
    capacity(config, side).has_room(state.side(side).len())
}

/// Choose the side for the next seated participant.
///
/// Only sides with room are candidates. With two candidates the shorter side
/// wins and left wins ties. Returns `None` when both sides are full.
pub fn pick_side(state: &SeatingState, config: &SeatingConfig) -> Option<Side> {
    let left_room = has_room(state, config, Side::Left);
    let right_room = has_room(state, config, Side::Right);

    match (left_room, right_room) {
        (true, true) => {
            if state.left.len() <= state.right.len() {
                Some(Side::Left)
            } else {
                Some(Side::Right)
            }
        }
        (true, false) => Some(Side::Left),
        (false, true) => Some(Side::Right),
        (false, false) => None,
    }
}

/// Returns true if both sides have a finite capacity and are full.
fn stage_full(state: &SeatingState, config: &SeatingConfig) -> bool {
    config.both_limited()
        && !has_room(state, config, Side::Left)
        && !has_room(state, config, Side::Right)
}

/// Move the farthest evictable seat of a random side into overflow.
///
/// Names in `keep` are never evicted. Falls back to the other side when the
/// chosen one has no evictable seat. Returns the side and the evicted name.
fn evict_random<R: Rng + ?Sized>(
    state: &mut SeatingState,
    rng: &mut R,
    keep: &[String],
) -> Option<(Side, String)> {
    let chosen = if rng.random_bool(0.5) {
        Side::Left
    } else {
        Side::Right
    };

    for side in [chosen, chosen.opposite()] {
        let seats = state.side_mut(side);
        let Some(index) = seats.iter().rposition(|n| !keep.contains(n)) else {
            continue;
        };
        let name = seats.remove(index);
        debug!(name = %name, side = %side, "evicting farthest seat into overflow");
        state.overflow.push_back(name.clone());
        return Some((side, name));
    }
    None
}

/// Move the nearest-to-center member of the longer side to current.
fn promote_from_seats(state: &mut SeatingState) -> Option<String> {
    let side = if state.left.len() >= state.right.len() {
        Side::Left
    } else {
        Side::Right
    };
    let seats = state.side_mut(side);
    if seats.is_empty() {
        return None;
    }
    Some(seats.remove(0))
}

/// Drop the last-rendered mark if its holder is no longer visible.
fn settle_last_rendered(state: &mut SeatingState) {
    if let Some(name) = state.last_rendered.as_deref() {
        if !state.is_visible(name) {
            state.last_rendered = None;
        }
    }
}

/// Reconcile the seating with a new ordered roster.
///
/// `roster` is expected to come from [`order_roster`](crate::order_roster);
/// excluded and duplicate names are filtered again here so the roster
/// invariant holds for any input.
pub fn reconcile_roster<S, R>(
    state: &SeatingState,
    roster: &[S],
    config: &SeatingConfig,
    rng: &mut R,
) -> Transition
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    let mut next = state.clone();

    let mut new_roster: Vec<String> = Vec::with_capacity(roster.len());
    for name in roster.iter().map(|n| n.as_ref().trim()) {
        if name.is_empty() || config.is_excluded(name) || new_roster.iter().any(|n| n == name) {
            continue;
        }
        new_roster.push(name.to_string());
    }

    let removed: Vec<String> = state
        .roster
        .iter()
        .filter(|n| !new_roster.contains(*n))
        .cloned()
        .collect();
    let added: Vec<String> = new_roster
        .iter()
        .filter(|n| !state.roster.contains(*n))
        .cloned()
        .collect();

    for name in &removed {
        let was = next.unseat(name);
        debug!(name = %name, was = ?was, "participant left roster");
    }
    next.roster = new_roster;

    for side in [Side::Left, Side::Right] {
        while capacity(config, side).is_exceeded_by(next.side(side).len()) {
            if let Some(name) = next.side_mut(side).pop() {
                debug!(name = %name, side = %side, "side over capacity, moving to overflow");
                next.overflow.push_back(name);
            }
        }
    }

    let mut pending = added.into_iter();
    if next.current.is_none() {
        let promoted = pending
            .next()
            .or_else(|| next.overflow.pop_front())
            .or_else(|| promote_from_seats(&mut next));
        if let Some(name) = &promoted {
            debug!(name = %name, "promoting participant to vacant current seat");
        }
        next.current = promoted;
    }

    // Joiners only displace members seated before this pass.
    let mut joined: Vec<String> = Vec::new();
    for name in pending {
        if let Some(side) = pick_side(&next, config) {
            trace!(name = %name, side = %side, "seating new participant");
            next.side_mut(side).push(name.clone());
            joined.push(name);
            continue;
        }

        let displaced = match config.join_policy {
            JoinPolicy::Displace if config.both_limited() => {
                evict_random(&mut next, rng, &joined)
            }
            _ => None,
        };
        match displaced {
            Some((side, _)) => {
                next.side_mut(side).push(name.clone());
                joined.push(name);
            }
            None => {
                trace!(name = %name, "stage full, queueing new participant");
                next.overflow.push_back(name);
            }
        }
    }

    while !next.overflow.is_empty() {
        let Some(side) = pick_side(&next, config) else {
            break;
        };
        if let Some(name) = next.overflow.pop_front() {
            trace!(name = %name, side = %side, "readmitting participant from overflow");
            next.side_mut(side).push(name);
        }
    }

    settle_last_rendered(&mut next);

    let effects = diff(state, &next, &removed);
    if !effects.is_empty() {
        debug!(
            removed = removed.len(),
            effect_count = effects.len(),
            "roster reconciled"
        );
    }

    Transition {
        state: next,
        effects,
    }
}

/// Promote `speaker` to current, demoting the previous speaker to a side.
///
/// No-op when `speaker` is already current or not on the roster.
pub fn on_speaker_changed<R: Rng + ?Sized>(
    state: &SeatingState,
    speaker: &str,
    config: &SeatingConfig,
    rng: &mut R,
) -> Transition {
    let speaker = speaker.trim();
    if state.current() == Some(speaker) || !state.roster.iter().any(|n| n == speaker) {
        return Transition::unchanged(state);
    }

    let mut next = state.clone();
    let last_rendered = next.last_rendered.take();
    next.unseat(speaker);
    next.last_rendered = last_rendered;

    if let Some(previous) = next.current.take() {
        if stage_full(&next, config) {
            evict_random(&mut next, rng, &[]);
        }
        match pick_side(&next, config) {
            Some(side) => {
                debug!(name = %previous, side = %side, "demoting previous speaker");
                next.side_mut(side).insert(0, previous);
            }
            None => {
                debug!(name = %previous, "no seat for previous speaker, moving to overflow");
                next.overflow.push_back(previous);
            }
        }
    }

    next.current = Some(speaker.to_string());
    settle_last_rendered(&mut next);

    let effects = diff(state, &next, &[]);
    debug!(speaker = %speaker, effect_count = effects.len(), "speaker changed");

    Transition {
        state: next,
        effects,
    }
}

/// Move the "spoke last" mark to the author of the newest rendered message.
pub fn mark_last_rendered(state: &SeatingState, history: &[ChatEntry]) -> Transition {
    let author = last_rendered_author(history, |name| state.is_visible(name));
    if state.last_rendered() == author {
        return Transition::unchanged(state);
    }

    let mut next = state.clone();
    next.last_rendered = author.map(str::to_string);
    let effects = diff(state, &next, &[]);

    Transition {
        state: next,
        effects,
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    use super::*;
    use crate::effect::Effect;
    use crate::state::Position;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn seated(current: Option<&str>, left: &[&str], right: &[&str]) -> SeatingState {
        let mut state = SeatingState::new();
        state.current = current.map(str::to_string);
        state.left = left.iter().map(|s| s.to_string()).collect();
        state.right = right.iter().map(|s| s.to_string()).collect();
        state.roster = current
            .iter()
            .chain(left.iter())
            .chain(right.iter())
            .map(|s| s.to_string())
            .collect();
        state
    }

    #[rstest]
    #[case::both_empty(0, 0, -1, -1, Some(Side::Left))]
    #[case::left_shorter(1, 2, -1, -1, Some(Side::Left))]
    #[case::right_shorter(2, 1, -1, -1, Some(Side::Right))]
    #[case::equal_prefers_left(2, 2, 3, 3, Some(Side::Left))]
    #[case::left_full(2, 2, 2, 3, Some(Side::Right))]
    #[case::right_full_left_longer(3, 1, -1, 1, Some(Side::Left))]
    #[case::both_full(1, 1, 1, 1, None)]
    #[case::zero_capacity(0, 0, 0, 0, None)]
    fn test_pick_side(
        #[case] left_len: usize,
        #[case] right_len: usize,
        #[case] cap_left: i64,
        #[case] cap_right: i64,
        #[case] expected: Option<Side>,
    ) {
        let left: Vec<String> = (0..left_len).map(|i| format!("L{i}")).collect();
        let right: Vec<String> = (0..right_len).map(|i| format!("R{i}")).collect();
        let mut state = SeatingState::new();
        state.left = left;
        state.right = right;

        let config = SeatingConfig::new(cap_left, cap_right);
        assert_eq!(pick_side(&state, &config), expected);
    }

    #[test]
    fn test_speaker_change_closes_gap() {
        let state = seated(Some("A"), &["B", "C", "X", "D"], &["E"]);
        let config = SeatingConfig::new(-1, -1);

        let t = on_speaker_changed(&state, "X", &config, &mut rng());

        assert_eq!(t.state.current(), Some("X"));
        // A goes to the shorter side (right) at slot 0.
        assert_eq!(t.state.left(), &["B", "C", "D"]);
        assert_eq!(t.state.right(), &["A", "E"]);
        assert_eq!(t.state.position("D"), Position::SeatedLeft { slot: 2 });
        assert!(t.effects.contains(&Effect::PromoteToCurrent {
            name: "X".to_string()
        }));
        assert!(t.effects.contains(&Effect::Reorder {
            name: "D".to_string(),
            side: Side::Left,
            slot: 2
        }));
        assert!(t.effects.contains(&Effect::Reorder {
            name: "E".to_string(),
            side: Side::Right,
            slot: 1
        }));
    }

    #[test]
    fn test_speaker_change_is_noop_for_current_or_stranger() {
        let state = seated(Some("A"), &["B"], &[]);
        let config = SeatingConfig::default();

        assert!(on_speaker_changed(&state, "A", &config, &mut rng()).is_noop());
        assert!(on_speaker_changed(&state, "Zed", &config, &mut rng()).is_noop());
    }

    #[test]
    fn test_speaker_change_evicts_when_full() {
        let mut state = seated(Some("A"), &["B"], &["C"]);
        state.roster.push("D".to_string());
        state.overflow.push_back("D".to_string());
        let config = SeatingConfig::new(1, 1);

        let t = on_speaker_changed(&state, "D", &config, &mut rng());

        assert_eq!(t.state.current(), Some("D"));
        assert_eq!(t.state.overflow().count(), 1);
        let evicted = t.state.overflow().next().unwrap().to_string();
        assert!(evicted == "B" || evicted == "C");
        assert!(t.effects.contains(&Effect::Exit { name: evicted }));
        assert!(t.state.is_visible("A"));
        assert_eq!(t.state.validate(&config), Ok(()));
    }

    #[test]
    fn test_speaker_without_previous_current_takes_center() {
        let mut state = seated(None, &["B"], &["C"]);
        state.roster.insert(0, "A".to_string());
        state.overflow.push_back("A".to_string());
        let config = SeatingConfig::new(1, 1);

        let t = on_speaker_changed(&state, "A", &config, &mut rng());

        assert_eq!(t.state.current(), Some("A"));
        assert_eq!(t.state.left(), &["B"]);
        assert_eq!(t.state.right(), &["C"]);
        assert_eq!(t.state.overflow().count(), 0);
    }

    #[test]
    fn test_shrinking_capacity_moves_farthest_to_overflow() {
        let state = seated(Some("A"), &["B", "C", "D"], &["E"]);
        let config = SeatingConfig::new(1, 1);
        let roster: Vec<String> = state.roster.clone();

        let t = reconcile_roster(&state, &roster, &config, &mut rng());

        assert_eq!(t.state.left(), &["B"]);
        assert_eq!(t.state.overflow().collect::<Vec<_>>(), vec!["D", "C"]);
        assert!(t.effects.contains(&Effect::Exit {
            name: "C".to_string()
        }));
        assert!(t.effects.contains(&Effect::Exit {
            name: "D".to_string()
        }));
    }

    #[test]
    fn test_overflow_readmitted_when_room_appears() {
        let mut state = seated(Some("A"), &["B"], &["C"]);
        state.roster.push("D".to_string());
        state.overflow.push_back("D".to_string());
        let config = SeatingConfig::new(1, 1);

        let t = reconcile_roster(&state, &["A", "B", "D"], &config, &mut rng());

        assert_eq!(t.state.right(), &["D"]);
        assert_eq!(t.state.overflow().count(), 0);
        assert_eq!(
            t.effects,
            vec![
                Effect::Exit {
                    name: "C".to_string()
                },
                Effect::Enter {
                    name: "D".to_string(),
                    side: Side::Right,
                    slot: 0
                },
            ]
        );
    }

    #[test]
    fn test_queue_policy_keeps_seats() {
        let state = seated(Some("A"), &["B"], &["C"]);
        let config = SeatingConfig::new(1, 1).with_join_policy(JoinPolicy::Queue);

        let t = reconcile_roster(&state, &["A", "B", "C", "D"], &config, &mut rng());

        assert_eq!(t.state.left(), &["B"]);
        assert_eq!(t.state.right(), &["C"]);
        assert_eq!(t.state.overflow().collect::<Vec<_>>(), vec!["D"]);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_mark_last_rendered_moves_highlight() {
        let state = seated(Some("A"), &["B"], &[]);

        let history = vec![ChatEntry::character("B")];
        let t = mark_last_rendered(&state, &history);
        assert_eq!(t.state.last_rendered(), Some("B"));
        assert_eq!(
            t.effects,
            vec![Effect::MarkLastRendered {
                name: Some("B".to_string())
            }]
        );

        let history = vec![ChatEntry::character("B"), ChatEntry::user("You")];
        let t = mark_last_rendered(&t.state, &history);
        assert_eq!(t.state.last_rendered(), None);
        assert_eq!(t.effects, vec![Effect::MarkLastRendered { name: None }]);

        assert!(mark_last_rendered(&t.state, &history).is_noop());
    }

    #[test]
    fn test_highlight_cleared_when_holder_overflows() {
        let mut state = seated(Some("A"), &["B"], &["C"]);
        state.last_rendered = Some("C".to_string());
        state.roster.push("D".to_string());
        state.overflow.push_back("D".to_string());
        let config = SeatingConfig::new(1, 0);

        let t = reconcile_roster(&state, &state.roster.clone(), &config, &mut rng());

        assert!(!t.state.is_visible("C"));
        assert_eq!(t.state.last_rendered(), None);
        assert!(t
            .effects
            .contains(&Effect::MarkLastRendered { name: None }));
    }
}
