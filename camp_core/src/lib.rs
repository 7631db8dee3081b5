//! Core simulation crate for the Emberhold headless camp-lifecycle prototype.
//!
//! Provides deterministic ECS systems that resolve a single polling tick when
//! [`run_tick`] is invoked: deferred mutations drain first, the presence
//! index is rebuilt, stale camps are swept, guard counts are re-validated,
//! and inbound hurt reports are throttled into the deferred queue for the
//! next tick.

mod camp;
mod config;
mod deferred;
mod guards;
pub mod metrics;
mod notify;
mod presence;
mod resources;

use std::sync::Arc;

use bevy::prelude::*;

use camp_schema::{EntityQuery, NotificationSink, PresenceSource};

pub use camp::{
    clear_session_state, sweep_stale_camps, CampEntry, CampExpiredEvent, CampRegistry,
    StaleCounters,
};
pub use config::{
    load_camp_policy_from_env, CampPolicyConfig, CampPolicyError, CampPolicyHandle,
    CampPolicyMetadata, BUILTIN_CAMP_POLICY,
};
pub use deferred::{DeferredAction, DeferredQueue};
pub use guards::EntityQueryHandle;
pub use metrics::SimulationMetrics;
pub use notify::{GuardHurtEvent, NotificationSinkHandle, RateLimitCache};
pub use presence::{PresenceIndex, PresenceSourceHandle};
pub use resources::{SimulationConfig, SimulationTick};

/// External collaborators injected into the tick-loop driver.
///
/// The core owns no ambient globals: everything it needs from the host world
/// comes through these handles, constructed at session start and dropped at
/// shutdown.
#[derive(Clone)]
pub struct WorldAdapters {
    pub presence: Arc<dyn PresenceSource>,
    pub entities: Arc<dyn EntityQuery>,
    pub notifications: Arc<dyn NotificationSink>,
}

/// Construct a Bevy [`App`] configured with the Emberhold polling pipeline.
pub fn build_headless_app(adapters: WorldAdapters) -> App {
    let mut app = App::new();

    let (policy, policy_metadata) = config::load_camp_policy_from_env();
    let rate_cache = RateLimitCache::with_capacity(policy.notify_cache_capacity);

    app.insert_resource(SimulationConfig::default())
        .insert_resource(SimulationTick::default())
        .insert_resource(CampPolicyHandle::new(policy))
        .insert_resource(policy_metadata)
        .insert_resource(PresenceIndex::default())
        .insert_resource(CampRegistry::default())
        .insert_resource(StaleCounters::default())
        .insert_resource(DeferredQueue::default())
        .insert_resource(rate_cache)
        .insert_resource(SimulationMetrics::default())
        .insert_resource(PresenceSourceHandle::new(adapters.presence))
        .insert_resource(EntityQueryHandle::new(adapters.entities))
        .insert_resource(NotificationSinkHandle::new(adapters.notifications))
        .add_plugins(MinimalPlugins)
        .add_event::<GuardHurtEvent>()
        .add_event::<CampExpiredEvent>()
        .add_systems(
            Update,
            (
                deferred::drain_deferred,
                presence::refresh_presence,
                camp::sweep_stale_camps,
                guards::recount_guards,
                notify::collect_guard_hurt,
                resources::advance_tick,
                metrics::collect_metrics,
            )
                .chain(),
        );

    app
}

/// Execute a single polling tick.
///
/// Each call processes the chained systems configured in
/// [`build_headless_app`] (deferred drain → presence refresh → staleness
/// sweep → guard recount → hurt collection → tick increment → metrics).
/// Everything runs on the calling thread; callers own the pacing.
pub fn run_tick(app: &mut App) {
    app.update();
}
