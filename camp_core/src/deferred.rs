use std::collections::VecDeque;

use bevy::prelude::*;
use tracing::debug;

use camp_schema::OwnerId;

use crate::camp::CampRegistry;
use crate::metrics::SimulationMetrics;
use crate::notify::NotificationSinkHandle;

/// A mutation scheduled from an event callback, applied at the next tick
/// boundary instead of inside the callback that observed the trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredAction {
    Notify { owner: OwnerId, message: String },
    MarkSpawningComplete { owner: OwnerId },
    SetLastSpawnDay { owner: OwnerId, day: u64 },
}

impl DeferredAction {
    pub fn owner(&self) -> &OwnerId {
        match self {
            DeferredAction::Notify { owner, .. }
            | DeferredAction::MarkSpawningComplete { owner }
            | DeferredAction::SetLastSpawnDay { owner, .. } => owner,
        }
    }
}

/// FIFO queue of deferred mutations.
///
/// Drained at the top of every tick, before the staleness sweep reads any
/// state the queued mutations touch. Scheduled order is execution order.
#[derive(Resource, Debug, Clone, Default)]
pub struct DeferredQueue {
    actions: VecDeque<DeferredAction>,
}

impl DeferredQueue {
    pub fn push(&mut self, action: DeferredAction) {
        self.actions.push_back(action);
    }

    pub fn pop(&mut self) -> Option<DeferredAction> {
        self.actions.pop_front()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}

/// Applies every queued mutation in the order it was scheduled.
///
/// A deferred mutation is not cancellable, but its target registry entry may
/// have been destroyed since it was scheduled; each action re-checks
/// existence and degrades to a logged no-op instead of assuming the entry
/// survived.
pub fn drain_deferred(
    mut queue: ResMut<DeferredQueue>,
    mut registry: ResMut<CampRegistry>,
    sink: Res<NotificationSinkHandle>,
    mut metrics: ResMut<SimulationMetrics>,
) {
    while let Some(action) = queue.pop() {
        match action {
            DeferredAction::Notify { owner, message } => {
                if registry.contains(&owner) {
                    sink.get().deliver(&owner, &message);
                    metrics.notifications_sent += 1;
                } else {
                    debug!(
                        target: "emberhold::notify",
                        %owner,
                        "deferred.dropped=camp_gone"
                    );
                }
            }
            DeferredAction::MarkSpawningComplete { owner } => {
                if !registry.mark_spawning_complete(&owner) {
                    debug!(
                        target: "emberhold::camps",
                        %owner,
                        "deferred.dropped=camp_gone"
                    );
                }
            }
            DeferredAction::SetLastSpawnDay { owner, day } => {
                if !registry.set_last_spawn_day(&owner, day) {
                    debug!(
                        target: "emberhold::camps",
                        %owner,
                        day,
                        "deferred.dropped=camp_gone"
                    );
                }
            }
        }
    }
}
