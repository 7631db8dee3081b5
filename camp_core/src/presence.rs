use std::collections::HashSet;
use std::sync::Arc;

use bevy::prelude::*;
use tracing::warn;

use camp_schema::{OwnerId, PresenceSource};

/// Snapshot of the owners connected to the session, rebuilt at the top of
/// every polling tick from the authoritative enumeration call.
///
/// Staleness decisions read this snapshot only. It is never carried across
/// ticks, so a reconnect is visible to the very next sweep.
#[derive(Resource, Debug, Default)]
pub struct PresenceIndex {
    connected: HashSet<OwnerId>,
}

impl PresenceIndex {
    pub fn contains(&self, owner: &OwnerId) -> bool {
        self.connected.contains(owner)
    }

    pub fn len(&self) -> usize {
        self.connected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connected.is_empty()
    }

    pub fn clear(&mut self) {
        self.connected.clear();
    }

    fn replace(&mut self, owners: Vec<OwnerId>) {
        self.connected.clear();
        self.connected.extend(owners);
    }
}

#[derive(Resource, Clone)]
pub struct PresenceSourceHandle(Arc<dyn PresenceSource>);

impl PresenceSourceHandle {
    pub fn new(source: Arc<dyn PresenceSource>) -> Self {
        Self(source)
    }

    pub fn get(&self) -> Arc<dyn PresenceSource> {
        self.0.clone()
    }
}

/// Rebuilds [`PresenceIndex`] from the presence source.
///
/// A failed enumeration leaves the index empty for this tick: every owner
/// reads as absent, which only advances stale counters by one and
/// self-corrects on the next successful refresh.
pub fn refresh_presence(handle: Res<PresenceSourceHandle>, mut index: ResMut<PresenceIndex>) {
    match handle.get().connected_owners() {
        Ok(owners) => index.replace(owners),
        Err(err) => {
            index.clear();
            warn!(
                target: "emberhold::presence",
                error = %err,
                "presence.enumeration_failed"
            );
        }
    }
}
