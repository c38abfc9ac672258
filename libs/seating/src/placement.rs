//! Numeric placement parameters for renderers.

use serde::{Deserialize, Serialize};

use crate::state::{Position, SeatingState};

/// Style-level parameters of one visible portrait.
///
/// `order` is 0 for the current speaker and `slot + 1` on the sides; `dir` is
/// `-1` for left and `1` for right and current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub name: String,
    pub order: usize,
    pub dir: i8,
    pub is_current: bool,
    pub is_last_rendered: bool,
}

impl Placement {
    fn from_position(name: &str, position: Position, last_rendered: Option<&str>) -> Option<Self> {
        let (order, dir) = match position {
            Position::Current => (0, 1),
            _ => {
                let (side, slot) = position.seat()?;
                (slot + 1, side.direction())
            }
        };
        Some(Self {
            name: name.to_string(),
            order,
            dir,
            is_current: position == Position::Current,
            is_last_rendered: last_rendered == Some(name),
        })
    }
}

/// Placement parameters for every visible participant: current first, then
/// left, then right.
pub fn placements(state: &SeatingState) -> Vec<Placement> {
    state
        .visible()
        .filter_map(|(name, position)| {
            Placement::from_position(name, position, state.last_rendered())
        })
        .collect()
}
