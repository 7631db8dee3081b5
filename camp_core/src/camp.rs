use std::collections::HashMap;

use bevy::prelude::*;
use tracing::{info, warn};

use camp_schema::{BlockPos, CampSnapshot, Dimension, OwnerId};

use crate::config::CampPolicyHandle;
use crate::deferred::DeferredQueue;
use crate::metrics::SimulationMetrics;
use crate::notify::RateLimitCache;
use crate::presence::PresenceIndex;
use crate::resources::SimulationTick;

/// A player's registered encampment.
#[derive(Debug, Clone, PartialEq)]
pub struct CampEntry {
    pub owner: OwnerId,
    pub location: BlockPos,
    pub dimension: Dimension,
    /// True once the initial guard population has finished spawning. Camps
    /// still mid-spawn are excluded from guard recounts.
    pub spawning_complete: bool,
    /// Cached count of guards near the camp, corrected by the recount pass.
    pub guard_count: u32,
    /// Day counter written by the external spawn scheduler; stored verbatim.
    pub last_spawn_day: u64,
}

impl CampEntry {
    pub fn new(owner: OwnerId, location: BlockPos, dimension: Dimension) -> Self {
        Self {
            owner,
            location,
            dimension,
            spawning_complete: false,
            guard_count: 0,
            last_spawn_day: 0,
        }
    }
}

/// Authoritative registry of active camps, keyed by owner.
///
/// At most one entry exists per owner; registering again overwrites the
/// previous entry.
#[derive(Resource, Debug, Clone, Default)]
pub struct CampRegistry {
    camps: HashMap<OwnerId, CampEntry>,
}

impl CampRegistry {
    pub fn register(&mut self, entry: CampEntry) {
        let owner = entry.owner.clone();
        if self.camps.insert(owner.clone(), entry).is_some() {
            warn!(
                target: "emberhold::camps",
                %owner,
                "camp.register=replaced_existing_entry"
            );
        }
    }

    pub fn remove(&mut self, owner: &OwnerId) -> Option<CampEntry> {
        self.camps.remove(owner)
    }

    pub fn get(&self, owner: &OwnerId) -> Option<&CampEntry> {
        self.camps.get(owner)
    }

    pub fn get_mut(&mut self, owner: &OwnerId) -> Option<&mut CampEntry> {
        self.camps.get_mut(owner)
    }

    pub fn contains(&self, owner: &OwnerId) -> bool {
        self.camps.contains_key(owner)
    }

    pub fn len(&self) -> usize {
        self.camps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.camps.is_empty()
    }

    pub fn owners(&self) -> Vec<OwnerId> {
        self.camps.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CampEntry> {
        self.camps.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut CampEntry> {
        self.camps.values_mut()
    }

    /// Marks the owner's camp as fully spawned. Returns false when no entry
    /// exists, letting deferred callers treat the mutation as a no-op.
    pub fn mark_spawning_complete(&mut self, owner: &OwnerId) -> bool {
        match self.camps.get_mut(owner) {
            Some(entry) => {
                entry.spawning_complete = true;
                true
            }
            None => false,
        }
    }

    /// Stores the spawn scheduler's day counter. The core never interprets
    /// the value.
    pub fn set_last_spawn_day(&mut self, owner: &OwnerId, day: u64) -> bool {
        match self.camps.get_mut(owner) {
            Some(entry) => {
                entry.last_spawn_day = day;
                true
            }
            None => false,
        }
    }

    pub fn snapshot_entries(&self, counters: &StaleCounters) -> Vec<CampSnapshot> {
        let mut snapshot: Vec<CampSnapshot> = self
            .camps
            .values()
            .map(|entry| CampSnapshot {
                owner: entry.owner.clone(),
                dimension: entry.dimension,
                location: entry.location,
                spawning_complete: entry.spawning_complete,
                guard_count: entry.guard_count,
                last_spawn_day: entry.last_spawn_day,
                absent_ticks: counters.get(&entry.owner),
            })
            .collect();
        snapshot.sort_by(|a, b| a.owner.cmp(&b.owner));
        snapshot
    }

    pub fn clear(&mut self) {
        self.camps.clear();
    }
}

/// Consecutive-absence counters for camp owners missing from the presence
/// index.
///
/// An entry exists only while its owner is absent: the sweep deletes the
/// counter the moment the owner shows up again, so absence is counted
/// consecutively, never cumulatively.
#[derive(Resource, Debug, Clone, Default)]
pub struct StaleCounters {
    counts: HashMap<OwnerId, u32>,
}

impl StaleCounters {
    pub fn get(&self, owner: &OwnerId) -> u32 {
        self.counts.get(owner).copied().unwrap_or(0)
    }

    pub fn bump(&mut self, owner: &OwnerId) -> u32 {
        let count = self.counts.entry(owner.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset(&mut self, owner: &OwnerId) {
        self.counts.remove(owner);
    }

    pub fn tracked(&self) -> usize {
        self.counts.len()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Drops counters whose owner no longer has a registry entry. Expiry
    /// removes its own counter, so anything found here points at an
    /// out-of-band removal and is logged.
    pub fn prune_unregistered(&mut self, registry: &CampRegistry) {
        let orphaned: Vec<OwnerId> = self
            .counts
            .keys()
            .filter(|owner| !registry.contains(owner))
            .cloned()
            .collect();
        for owner in orphaned {
            warn!(
                target: "emberhold::camps",
                %owner,
                "stale_counter.pruned=no_registry_entry"
            );
            self.counts.remove(&owner);
        }
    }
}

/// Emitted when a camp is reclaimed after its owner stayed absent for the
/// configured number of consecutive ticks.
#[derive(Event, Debug, Clone)]
pub struct CampExpiredEvent {
    pub tick: u64,
    pub owner: OwnerId,
    pub location: BlockPos,
    pub dimension: Dimension,
    pub absent_ticks: u32,
}

/// Per-tick staleness sweep over every registered camp.
///
/// Present owners get their counter deleted; absent owners get it bumped,
/// and a bump that reaches the policy threshold removes the camp. This is
/// the only path that destroys a camp because of absence.
pub fn sweep_stale_camps(
    tick: Res<SimulationTick>,
    policy: Res<CampPolicyHandle>,
    presence: Res<PresenceIndex>,
    mut registry: ResMut<CampRegistry>,
    mut counters: ResMut<StaleCounters>,
    mut metrics: ResMut<SimulationMetrics>,
    mut expired: EventWriter<CampExpiredEvent>,
) {
    let threshold = policy.get().stale_threshold_ticks;

    counters.prune_unregistered(&registry);

    for owner in registry.owners() {
        if presence.contains(&owner) {
            counters.reset(&owner);
            continue;
        }

        let absent = counters.bump(&owner);
        if absent < threshold {
            continue;
        }

        counters.reset(&owner);
        match registry.remove(&owner) {
            Some(entry) => {
                info!(
                    target: "emberhold::camps",
                    %owner,
                    absent_ticks = absent,
                    dimension = %entry.dimension,
                    "camp.expired=stale_owner"
                );
                metrics.camps_expired += 1;
                expired.send(CampExpiredEvent {
                    tick: tick.0,
                    owner: entry.owner,
                    location: entry.location,
                    dimension: entry.dimension,
                    absent_ticks: absent,
                });
            }
            None => warn!(
                target: "emberhold::camps",
                %owner,
                "camp.expire_failed=missing_entry"
            ),
        }
    }
}

/// Empties every piece of per-session camp state in one pass.
///
/// Runs on the single simulation thread, so no partial-clear state is
/// observable to other systems.
pub fn clear_session_state(world: &mut World) {
    world.resource_mut::<CampRegistry>().clear();
    world.resource_mut::<StaleCounters>().clear();
    world.resource_mut::<PresenceIndex>().clear();
    world.resource_mut::<DeferredQueue>().clear();
    world.resource_mut::<RateLimitCache>().clear();
    info!(target: "emberhold::camps", "session_state.cleared");
}
