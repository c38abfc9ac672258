//! Placement effects consumed by renderers.

use serde::{Deserialize, Serialize};

use crate::state::{Position, SeatingState, Side};

/// A single placement or eviction instruction for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// A portrait becomes visible at a side slot.
    Enter { name: String, side: Side, slot: usize },

    /// A portrait leaves the stage.
    Exit { name: String },

    /// A visible portrait moves to another side or slot.
    Reorder { name: String, side: Side, slot: usize },

    /// A participant becomes the centered current speaker.
    PromoteToCurrent { name: String },

    /// The "spoke last" highlight moves (or is cleared).
    MarkLastRendered { name: Option<String> },

    /// A portrait's image changes.
    SetImage { name: String, url: Option<String> },
}

impl Effect {
    /// The participant this effect targets, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Effect::Enter { name, .. }
            | Effect::Exit { name }
            | Effect::Reorder { name, .. }
            | Effect::PromoteToCurrent { name }
            | Effect::SetImage { name, .. } => Some(name),
            Effect::MarkLastRendered { name } => name.as_deref(),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Enter { .. } => "enter",
            Effect::Exit { .. } => "exit",
            Effect::Reorder { .. } => "reorder",
            Effect::PromoteToCurrent { .. } => "promote_to_current",
            Effect::MarkLastRendered { .. } => "mark_last_rendered",
            Effect::SetImage { .. } => "set_image",
        }
    }
}

/// Result of an allocator operation: the next state and what changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SeatingState,
    pub effects: Vec<Effect>,
}

impl Transition {
    /// A transition that changes nothing.
    pub fn unchanged(state: &SeatingState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }

    /// Returns true if no effects were produced.
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Derive the effects that take the visible stage from `before` to `after`.
///
/// Names in `exited` get an `Exit` first, whether or not they were visible.
/// Then: visible-to-hidden names exit, the new current is promoted, and
/// seated names enter or reorder left side first, slot order.
pub(crate) fn diff(before: &SeatingState, after: &SeatingState, exited: &[String]) -> Vec<Effect> {
    let mut effects: Vec<Effect> = exited
        .iter()
        .map(|name| Effect::Exit { name: name.clone() })
        .collect();

    for (name, _) in before.visible() {
        if exited.iter().any(|n| n == name) {
            continue;
        }
        if !after.is_visible(name) {
            effects.push(Effect::Exit {
                name: name.to_string(),
            });
        }
    }

    if let Some(current) = after.current() {
        if before.current() != Some(current) {
            effects.push(Effect::PromoteToCurrent {
                name: current.to_string(),
            });
        }
    }

    for side in [Side::Left, Side::Right] {
        for (slot, name) in after.side(side).iter().enumerate() {
            let now = Position::seated(side, slot);
            let was = before.position(name);
            if was == now {
                continue;
            }
            let effect = if was.is_visible() {
                Effect::Reorder {
                    name: name.clone(),
                    side,
                    slot,
                }
            } else {
                Effect::Enter {
                    name: name.clone(),
                    side,
                    slot,
                }
            };
            effects.push(effect);
        }
    }

    if before.last_rendered() != after.last_rendered() {
        effects.push(Effect::MarkLastRendered {
            name: after.last_rendered().map(str::to_string),
        });
    }

    effects
}
