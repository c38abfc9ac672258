//! Seating state: who is current, who sits where, who waits.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SeatingConfig;
use crate::error::SeatingError;

/// A side of the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The other side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Horizontal direction used by renderers (`-1` left, `1` right).
    pub fn direction(&self) -> i8 {
        match self {
            Side::Left => -1,
            Side::Right => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Where a participant currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Position {
    /// Not on the roster.
    Unseated,
    /// Shown centered as the current speaker.
    Current,
    /// Seated on the left; slot 0 is nearest to center.
    SeatedLeft { slot: usize },
    /// Seated on the right; slot 0 is nearest to center.
    SeatedRight { slot: usize },
    /// On the roster but waiting for a seat.
    Overflow,
}

impl Position {
    /// Returns true if the participant has a visible portrait.
    pub fn is_visible(&self) -> bool {
        matches!(
            self,
            Position::Current | Position::SeatedLeft { .. } | Position::SeatedRight { .. }
        )
    }

    /// Side and slot, for seated positions.
    pub fn seat(&self) -> Option<(Side, usize)> {
        match self {
            Position::SeatedLeft { slot } => Some((Side::Left, *slot)),
            Position::SeatedRight { slot } => Some((Side::Right, *slot)),
            _ => None,
        }
    }

    pub(crate) fn seated(side: Side, slot: usize) -> Self {
        match side {
            Side::Left => Position::SeatedLeft { slot },
            Side::Right => Position::SeatedRight { slot },
        }
    }
}

/// Seating of one active group.
///
/// Both sides are ordered nearest-to-center first, so the last element of a
/// side is the "oldest" seat and the first one evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatingState {
    pub(crate) current: Option<String>,
    pub(crate) left: Vec<String>,
    pub(crate) right: Vec<String>,
    pub(crate) roster: Vec<String>,
    pub(crate) overflow: VecDeque<String>,
    pub(crate) last_rendered: Option<String>,
}

impl SeatingState {
    /// Create an empty state for a newly active group.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current speaker.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Left side, nearest to center first.
    pub fn left(&self) -> &[String] {
        &self.left
    }

    /// Right side, nearest to center first.
    pub fn right(&self) -> &[String] {
        &self.right
    }

    /// Known participants in discovery order.
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// Participants waiting for a seat, front first.
    pub fn overflow(&self) -> impl ExactSizeIterator<Item = &str> {
        self.overflow.iter().map(String::as_str)
    }

    /// The participant marked as author of the last rendered message.
    pub fn last_rendered(&self) -> Option<&str> {
        self.last_rendered.as_deref()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
            && self.current.is_none()
            && self.left.is_empty()
            && self.right.is_empty()
            && self.overflow.is_empty()
    }

    /// The seats on one side.
    pub fn side(&self, side: Side) -> &[String] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub(crate) fn side_mut(&mut self, side: Side) -> &mut Vec<String> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Where `name` currently is.
    pub fn position(&self, name: &str) -> Position {
        if self.current.as_deref() == Some(name) {
            return Position::Current;
        }
        if let Some(slot) = self.left.iter().position(|n| n == name) {
            return Position::SeatedLeft { slot };
        }
        if let Some(slot) = self.right.iter().position(|n| n == name) {
            return Position::SeatedRight { slot };
        }
        if self.overflow.iter().any(|n| n == name) {
            return Position::Overflow;
        }
        Position::Unseated
    }

    /// Returns true if `name` has a visible portrait.
    pub fn is_visible(&self, name: &str) -> bool {
        self.position(name).is_visible()
    }

    /// Visible participants: current first, then left, then right.
    pub fn visible(&self) -> impl Iterator<Item = (&str, Position)> {
        let current = self
            .current
            .iter()
            .map(|n| (n.as_str(), Position::Current));
        let left = self
            .left
            .iter()
            .enumerate()
            .map(|(slot, n)| (n.as_str(), Position::SeatedLeft { slot }));
        let right = self
            .right
            .iter()
            .enumerate()
            .map(|(slot, n)| (n.as_str(), Position::SeatedRight { slot }));
        current.chain(left).chain(right)
    }

    /// Remove `name` from every placement. Returns where it was.
    pub(crate) fn unseat(&mut self, name: &str) -> Position {
        let position = self.position(name);
        match position {
            Position::Current => self.current = None,
            Position::SeatedLeft { slot } => {
                self.left.remove(slot);
            }
            Position::SeatedRight { slot } => {
                self.right.remove(slot);
            }
            Position::Overflow => self.overflow.retain(|n| n != name),
            Position::Unseated => {}
        }
        if self.last_rendered.as_deref() == Some(name) {
            self.last_rendered = None;
        }
        position
    }

    /// Check every seating invariant against `config`.
    pub fn validate(&self, config: &SeatingConfig) -> Result<(), SeatingError> {
        for side in [Side::Left, Side::Right] {
            let capacity = match side {
                Side::Left => config.capacity_left,
                Side::Right => config.capacity_right,
            };
            let len = self.side(side).len();
            if let Some(cap) = capacity.limit() {
                if len > cap {
                    return Err(SeatingError::OverCapacity {
                        side,
                        len,
                        capacity: cap,
                    });
                }
            }
        }

        let roster: BTreeSet<&str> = self.roster.iter().map(String::as_str).collect();
        if let Some(name) = self.roster.iter().find(|n| config.is_excluded(n)) {
            return Err(SeatingError::Excluded(name.clone()));
        }

        let mut placed = BTreeSet::new();
        let all = self
            .current
            .iter()
            .chain(self.left.iter())
            .chain(self.right.iter())
            .chain(self.overflow.iter());
        for name in all {
            if !placed.insert(name.as_str()) {
                return Err(SeatingError::DuplicatePlacement(name.clone()));
            }
            if !roster.contains(name.as_str()) {
                return Err(SeatingError::NotOnRoster(name.clone()));
            }
        }
        if let Some(name) = self.roster.iter().find(|n| !placed.contains(n.as_str())) {
            return Err(SeatingError::Unplaced(name.clone()));
        }

        if let Some(name) = &self.last_rendered {
            if !self.is_visible(name) {
                return Err(SeatingError::HiddenLastRendered(name.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> SeatingState {
        SeatingState {
            current: Some("A".to_string()),
            left: names(&["B", "D"]),
            right: names(&["C"]),
            roster: names(&["A", "B", "C", "D", "E"]),
            overflow: VecDeque::from(names(&["E"])),
            last_rendered: None,
        }
    }

    #[test]
    fn test_position_lookup() {
        let state = sample();
        assert_eq!(state.position("A"), Position::Current);
        assert_eq!(state.position("D"), Position::SeatedLeft { slot: 1 });
        assert_eq!(state.position("C"), Position::SeatedRight { slot: 0 });
        assert_eq!(state.position("E"), Position::Overflow);
        assert_eq!(state.position("Z"), Position::Unseated);
        assert!(!state.is_visible("E"));
    }

    #[test]
    fn test_unseat_closes_gap() {
        let mut state = sample();
        assert_eq!(state.unseat("B"), Position::SeatedLeft { slot: 0 });
        assert_eq!(state.left(), &names(&["D"])[..]);
        assert_eq!(state.position("D"), Position::SeatedLeft { slot: 0 });
    }

    #[test]
    fn test_validate_accepts_consistent_state() {
        let config = SeatingConfig::new(2, 1);
        assert_eq!(sample().validate(&config), Ok(()));
    }

    #[test]
    fn test_validate_rejects_over_capacity() {
        let config = SeatingConfig::new(1, 1);
        let err = sample().validate(&config).unwrap_err();
        assert!(err.is_capacity_error());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_strays() {
        let config = SeatingConfig::default();

        let mut state = sample();
        state.right.push("B".to_string());
        assert_eq!(
            state.validate(&config),
            Err(SeatingError::DuplicatePlacement("B".to_string()))
        );

        let mut state = sample();
        state.overflow.push_back("Z".to_string());
        assert_eq!(
            state.validate(&config),
            Err(SeatingError::NotOnRoster("Z".to_string()))
        );

        let mut state = sample();
        state.overflow.clear();
        assert_eq!(
            state.validate(&config),
            Err(SeatingError::Unplaced("E".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_hidden_last_rendered() {
        let mut state = sample();
        state.last_rendered = Some("E".to_string());
        assert_eq!(
            state.validate(&SeatingConfig::default()),
            Err(SeatingError::HiddenLastRendered("E".to_string()))
        );
    }
}
