//! Seating configuration: side capacities, exclusions, join policy.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of participants on one side of the stage.
///
/// Serialized as an integer where `-1` (or any negative value) means
/// unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Capacity {
    /// No limit.
    #[default]
    Unlimited,
    /// At most this many participants.
    Limited(usize),
}

impl Capacity {
    /// Returns true if a side holding `len` participants can take another.
    pub fn has_room(&self, len: usize) -> bool {
        match self {
            Capacity::Unlimited => true,
            Capacity::Limited(cap) => len < *cap,
        }
    }

    /// Returns true if `len` participants exceed this capacity.
    pub fn is_exceeded_by(&self, len: usize) -> bool {
        match self {
            Capacity::Unlimited => false,
            Capacity::Limited(cap) => len > *cap,
        }
    }

    /// Returns true if the capacity is finite.
    pub fn is_limited(&self) -> bool {
        matches!(self, Capacity::Limited(_))
    }

    /// The finite limit, if any.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Capacity::Unlimited => None,
            Capacity::Limited(cap) => Some(*cap),
        }
    }
}

impl From<i64> for Capacity {
    fn from(value: i64) -> Self {
        usize::try_from(value)
            .map(Capacity::Limited)
            .unwrap_or(Capacity::Unlimited)
    }
}

impl From<Capacity> for i64 {
    fn from(value: Capacity) -> Self {
        match value {
            Capacity::Unlimited => -1,
            Capacity::Limited(cap) => i64::try_from(cap).unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Unlimited => write!(f, "unlimited"),
            Capacity::Limited(cap) => write!(f, "{}", cap),
        }
    }
}

/// What happens when a participant joins while both sides are full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Evict the farthest member of a random side into overflow and seat the
    /// newcomer in its place.
    #[default]
    Displace,
    /// Append the newcomer to overflow; it waits for a free seat.
    Queue,
}

/// Allocator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeatingConfig {
    /// Capacity of the left side.
    pub capacity_left: Capacity,

    /// Capacity of the right side.
    pub capacity_right: Capacity,

    /// Lowercased names that are never shown.
    #[serde(default)]
    pub exclude: BTreeSet<String>,

    /// Behavior when a participant joins a full stage.
    #[serde(default)]
    pub join_policy: JoinPolicy,
}

impl SeatingConfig {
    /// Create a config with the given capacities (`-1` = unlimited) and no
    /// exclusions.
    pub fn new(capacity_left: i64, capacity_right: i64) -> Self {
        Self {
            capacity_left: Capacity::from(capacity_left),
            capacity_right: Capacity::from(capacity_right),
            exclude: BTreeSet::new(),
            join_policy: JoinPolicy::default(),
        }
    }

    /// Add names to the exclusion set (case-insensitive).
    pub fn with_exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude.extend(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty()),
        );
        self
    }

    /// Set the join policy.
    pub fn with_join_policy(mut self, policy: JoinPolicy) -> Self {
        self.join_policy = policy;
        self
    }

    /// Returns true if `name` is hidden by the exclusion set.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude.contains(&name.trim().to_lowercase())
    }

    /// Returns true if both capacities are finite.
    pub fn both_limited(&self) -> bool {
        self.capacity_left.is_limited() && self.capacity_right.is_limited()
    }
}
