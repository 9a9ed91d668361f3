//! Static, read-only configuration describing the shape of the cluster and
//! the grouping of application names, supplied once at scheduler
//! construction (see `Scheduler::new`) rather than reached for as
//! process-wide state.

use std::collections::HashMap;

/// A coarse equivalence class over application names, used by the
/// complementarity estimator. `NO_GROUP` is the sentinel meaning
/// "no information" / "no preference", matching the estimator's group-aware
/// query contract.
pub type GroupTag = i64;

pub const NO_GROUP: GroupTag = -1;

/// A static partition label assigned to each node address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterSlot {
    Slot1,
    Slot2,
}

impl std::fmt::Display for ClusterSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ClusterSlot::Slot1 => "slot-1",
                ClusterSlot::Slot2 => "slot-2",
            }
        )
    }
}

/// Maps a node address to its static cluster slot.
#[derive(Debug, Clone, Default)]
pub struct SlotIndex(HashMap<String, ClusterSlot>);

impl SlotIndex {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, address: impl Into<String>, slot: ClusterSlot) -> &mut Self {
        self.0.insert(address.into(), slot);
        self
    }

    pub fn get(&self, address: &str) -> Option<ClusterSlot> {
        self.0.get(address).copied()
    }
}

/// Maps an application name to its static group tag.
#[derive(Debug, Clone, Default)]
pub struct GroupIndex(HashMap<String, GroupTag>);

impl GroupIndex {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, group: GroupTag) -> &mut Self {
        self.0.insert(name.into(), group);
        self
    }

    /// Unknown names map to `NO_GROUP` rather than panicking: a name absent
    /// from the static index simply carries no complementarity signal.
    pub fn get(&self, name: &str) -> GroupTag {
        self.0.get(name).copied().unwrap_or(NO_GROUP)
    }
}
