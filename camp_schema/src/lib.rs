//! Data contracts for the Emberhold camp-lifecycle core.
//!
//! This crate defines the identity, spatial, and entity types shared between
//! the simulation runtime in `camp_core` and its hosts, plus the interfaces
//! of the external collaborators the core consumes (presence enumeration,
//! world entity queries, notification delivery). It deliberately carries no
//! Bevy dependency so host adapters can implement the traits without pulling
//! in the full ECS runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identity of the player controlling a camp.
///
/// Owner identities are never reused within a session and are independent of
/// connection state: an owner that disconnects keeps the same id when they
/// return.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The realms a camp can be anchored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Overworld,
    Underhollow,
    Rift,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Overworld => "overworld",
            Dimension::Underhollow => "underhollow",
            Dimension::Rift => "rift",
        }
    }

    /// Parses the identifiers accepted by host commands.
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "overworld" => Some(Dimension::Overworld),
            "underhollow" => Some(Dimension::Underhollow),
            "rift" => Some(Dimension::Rift),
            _ => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block-grid position used as a camp's spatial anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &BlockPos) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        let dz = i64::from(self.z) - i64::from(other.z);
        dx * dx + dy * dy + dz * dz
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Kinds of world entities the core cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CampGuard,
    Raider,
    Wildlife,
}

/// Predicate handed to [`EntityQuery::entities_near`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFilter {
    pub kind: EntityKind,
    /// Maximum distance from the query center, in blocks.
    pub radius: u32,
}

impl EntityFilter {
    pub fn new(kind: EntityKind, radius: u32) -> Self {
        Self { kind, radius }
    }

    pub fn matches(&self, center: &BlockPos, candidate_kind: EntityKind, position: &BlockPos) -> bool {
        if candidate_kind != self.kind {
            return false;
        }
        let radius = i64::from(self.radius);
        center.distance_squared(position) <= radius * radius
    }
}

/// Opaque reference to a live world entity returned by queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityHandle {
    pub id: u64,
    pub kind: EntityKind,
    pub position: BlockPos,
}

/// Serializable view of one registered camp, used by status reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CampSnapshot {
    pub owner: OwnerId,
    pub dimension: Dimension,
    pub location: BlockPos,
    pub spawning_complete: bool,
    pub guard_count: u32,
    pub last_spawn_day: u64,
    /// Consecutive ticks the owner has been absent; zero while present.
    pub absent_ticks: u32,
}

/// Failure enumerating connected owners.
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("presence source unavailable: {0}")]
    Unavailable(String),
}

/// Failure querying the live world for entities.
#[derive(Debug, Error)]
pub enum WorldQueryError {
    #[error("dimension {0} is not loaded")]
    DimensionUnloaded(Dimension),
    #[error("world query failed near {position}: {reason}")]
    QueryFailed { position: BlockPos, reason: String },
}

/// Authoritative enumeration of the owners currently connected to the
/// session. Called once per polling tick; implementations must not cache
/// across calls on the core's behalf.
pub trait PresenceSource: Send + Sync {
    fn connected_owners(&self) -> Result<Vec<OwnerId>, PresenceError>;
}

/// Live world entity lookup. Implementations may fail transiently (chunk
/// unloaded, dimension unavailable); callers own the failure boundary.
pub trait EntityQuery: Send + Sync {
    fn entities_near(
        &self,
        dimension: Dimension,
        center: BlockPos,
        filter: &EntityFilter,
    ) -> Result<Vec<EntityHandle>, WorldQueryError>;
}

/// Delivery channel for player-facing notifications. The core hands over a
/// plain message; formatting beyond that and localization belong to the host.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, owner: &OwnerId, message: &str);
}
