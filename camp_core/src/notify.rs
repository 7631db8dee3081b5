use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bevy::prelude::*;
use tracing::debug;

use camp_schema::{NotificationSink, OwnerId};

use crate::camp::CampRegistry;
use crate::config::CampPolicyHandle;
use crate::deferred::{DeferredAction, DeferredQueue};
use crate::metrics::SimulationMetrics;
use crate::resources::SimulationTick;

/// Bounded map of subject to the last tick a notification was permitted.
///
/// Eviction is strictly by insertion order, not access recency: a subject
/// that keeps getting throttled never refreshes its slot, so only subjects
/// whose notifications are actually allowed stay away from the front of the
/// queue. The size bound holds after every call.
#[derive(Resource, Debug, Clone)]
pub struct RateLimitCache {
    capacity: usize,
    last_allowed: HashMap<OwnerId, u64>,
    insertion_order: VecDeque<OwnerId>,
}

impl RateLimitCache {
    pub fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "rate limit cache capacity must be positive");
        Self {
            capacity,
            last_allowed: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Returns true when a notification to `subject` is permitted at
    /// `now_tick`, recording the permission. A denied call mutates nothing.
    pub fn should_allow(&mut self, subject: &OwnerId, now_tick: u64, min_interval_ticks: u64) -> bool {
        if let Some(&last) = self.last_allowed.get(subject) {
            if now_tick.saturating_sub(last) < min_interval_ticks {
                return false;
            }
        }
        self.insert(subject.clone(), now_tick);
        true
    }

    fn insert(&mut self, subject: OwnerId, now_tick: u64) {
        if self.last_allowed.insert(subject.clone(), now_tick).is_some() {
            // Re-insertion: drop the stale order slot so the deque keeps
            // tracking latest insertion.
            self.insertion_order.retain(|existing| existing != &subject);
        }
        self.insertion_order.push_back(subject);

        while self.last_allowed.len() > self.capacity {
            match self.insertion_order.pop_front() {
                Some(oldest) => {
                    self.last_allowed.remove(&oldest);
                    debug!(
                        target: "emberhold::notify",
                        subject = %oldest,
                        "rate_limit.evicted=oldest_insertion"
                    );
                }
                None => break,
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.last_allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_allowed.is_empty()
    }

    pub fn contains(&self, subject: &OwnerId) -> bool {
        self.last_allowed.contains_key(subject)
    }

    pub fn clear(&mut self) {
        self.last_allowed.clear();
        self.insertion_order.clear();
    }
}

/// Raised by the host when a camp guard takes damage.
#[derive(Event, Debug, Clone)]
pub struct GuardHurtEvent {
    pub owner: OwnerId,
    pub guard_id: u64,
}

#[derive(Resource, Clone)]
pub struct NotificationSinkHandle(Arc<dyn NotificationSink>);

impl NotificationSinkHandle {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self(sink)
    }

    pub fn get(&self) -> Arc<dyn NotificationSink> {
        self.0.clone()
    }
}

/// Turns guard-hurt reports into deferred notifications, throttled per owner.
///
/// The handler never touches world state directly: an allowed notification is
/// queued and delivered at the next tick boundary by the deferred drain.
pub fn collect_guard_hurt(
    tick: Res<SimulationTick>,
    policy: Res<CampPolicyHandle>,
    registry: Res<CampRegistry>,
    mut cache: ResMut<RateLimitCache>,
    mut deferred: ResMut<DeferredQueue>,
    mut metrics: ResMut<SimulationMetrics>,
    mut events: EventReader<GuardHurtEvent>,
) {
    let min_interval = policy.get().notify_min_interval_ticks;
    for event in events.read() {
        if !registry.contains(&event.owner) {
            // The guard outlived its camp; nothing to notify.
            continue;
        }
        if cache.should_allow(&event.owner, tick.0, min_interval) {
            deferred.push(DeferredAction::Notify {
                owner: event.owner.clone(),
                message: format!("A camp guard is under attack (guard #{}).", event.guard_id),
            });
        } else {
            metrics.notifications_throttled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str) -> OwnerId {
        OwnerId::new(name)
    }

    #[test]
    fn first_call_is_allowed_and_recorded() {
        let mut cache = RateLimitCache::with_capacity(4);
        assert!(cache.should_allow(&owner("ash"), 100, 60));
        assert!(cache.contains(&owner("ash")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn calls_inside_interval_are_denied_without_mutation() {
        let mut cache = RateLimitCache::with_capacity(4);
        assert!(cache.should_allow(&owner("ash"), 100, 60));
        assert!(!cache.should_allow(&owner("ash"), 159, 60));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn interval_boundary_is_allowed() {
        let mut cache = RateLimitCache::with_capacity(4);
        assert!(cache.should_allow(&owner("ash"), 100, 60));
        assert!(cache.should_allow(&owner("ash"), 160, 60));
    }

    #[test]
    fn eviction_removes_earliest_surviving_insertion() {
        let mut cache = RateLimitCache::with_capacity(2);
        assert!(cache.should_allow(&owner("x"), 0, 60));
        assert!(cache.should_allow(&owner("y"), 10, 60));
        assert!(cache.should_allow(&owner("z"), 20, 60));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&owner("x")), "x was the oldest insertion");
        assert!(cache.contains(&owner("y")));
        assert!(cache.contains(&owner("z")));
    }

    #[test]
    fn throttled_checks_do_not_protect_from_eviction() {
        let mut cache = RateLimitCache::with_capacity(2);
        assert!(cache.should_allow(&owner("x"), 0, 1000));
        assert!(cache.should_allow(&owner("y"), 1, 1000));
        // "x" keeps getting checked, but every check is denied and therefore
        // does not refresh its insertion slot.
        assert!(!cache.should_allow(&owner("x"), 2, 1000));
        assert!(!cache.should_allow(&owner("x"), 3, 1000));

        assert!(cache.should_allow(&owner("z"), 4, 1000));
        assert!(!cache.contains(&owner("x")), "x still evicted first");
    }

    #[test]
    fn reinsertion_refreshes_the_order_slot() {
        let mut cache = RateLimitCache::with_capacity(2);
        assert!(cache.should_allow(&owner("x"), 0, 10));
        assert!(cache.should_allow(&owner("y"), 5, 10));
        // Past the interval, "x" is allowed again, which re-inserts it at the
        // back of the order queue.
        assert!(cache.should_allow(&owner("x"), 20, 10));

        assert!(cache.should_allow(&owner("z"), 21, 10));
        assert!(!cache.contains(&owner("y")), "y became the oldest insertion");
        assert!(cache.contains(&owner("x")));
        assert!(cache.contains(&owner("z")));
    }

    #[test]
    fn size_bound_holds_across_a_mixed_sequence() {
        let mut cache = RateLimitCache::with_capacity(3);
        for step in 0..50u64 {
            let subject = owner(&format!("owner_{}", step % 7));
            cache.should_allow(&subject, step, 4);
            assert!(cache.len() <= cache.capacity());
        }
    }
}
