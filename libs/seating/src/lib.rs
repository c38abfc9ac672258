//! # tableau-seating
//!
//! Seating allocation for a group portrait stage.
//!
//! A stage shows one centered *current speaker* and two sides of portraits,
//! each ordered nearest-to-center first. This crate decides who is visible,
//! on which side, in which slot, and who waits in overflow when the sides
//! are full.
//!
//! ## Model
//!
//! - [`SeatingState`]: current speaker, left, right, roster, overflow
//! - [`SeatingConfig`]: side capacities, exclusions, join policy
//! - [`Effect`]: placement instructions for a renderer
//!
//! ## Operations
//!
//! All operations are pure: they take the previous state and return a
//! [`Transition`] with the next state and its effects.
//!
//! - [`reconcile_roster`]: membership changed
//! - [`on_speaker_changed`]: someone else spoke last
//! - [`mark_last_rendered`]: move the "spoke last" highlight
//!
//! # Invariants
//!
//! - A name is in at most one of current, left, right, overflow
//! - A side never exceeds a finite capacity
//! - The roster is exactly the non-excluded members
//! - Reconciling the same roster twice produces no effects the second time

mod allocator;
mod config;
mod effect;
mod error;
mod placement;
mod roster;
mod state;

pub use allocator::{mark_last_rendered, on_speaker_changed, pick_side, reconcile_roster};
pub use config::{Capacity, JoinPolicy, SeatingConfig};
pub use effect::{Effect, Transition};
pub use error::SeatingError;
pub use placement::{placements, Placement};
pub use roster::{last_rendered_author, last_speaker, order_roster, parse_exclude_list, ChatEntry};
pub use state::{Position, SeatingState, Side};
