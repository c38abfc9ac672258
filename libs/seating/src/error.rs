//! Error types for seating state validation.

use thiserror::Error;

use crate::state::Side;

/// Invariant violations detected in a [`SeatingState`](crate::SeatingState).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeatingError {
    /// A side holds more participants than its capacity allows.
    #[error("{side} side over capacity: {len} seated, capacity {capacity}")]
    OverCapacity {
        side: Side,
        len: usize,
        capacity: usize,
    },

    /// A name is held by more than one collection.
    #[error("participant {0:?} is placed more than once")]
    DuplicatePlacement(String),

    /// A placed name is not part of the roster.
    #[error("participant {0:?} is placed but not on the roster")]
    NotOnRoster(String),

    /// An excluded name made it onto the roster.
    #[error("participant {0:?} is excluded but on the roster")]
    Excluded(String),

    /// A roster name has no placement at all.
    #[error("participant {0:?} is on the roster but unplaced")]
    Unplaced(String),

    /// The last-rendered mark points at a participant that is not visible.
    #[error("last-rendered participant {0:?} is not visible")]
    HiddenLastRendered(String),
}

impl SeatingError {
    /// Returns true if this error is a capacity violation.
    pub fn is_capacity_error(&self) -> bool {
        matches!(self, SeatingError::OverCapacity { .. })
    }
}
