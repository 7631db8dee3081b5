use bevy::prelude::*;

use crate::camp::{CampRegistry, StaleCounters};
use crate::notify::RateLimitCache;
use crate::resources::SimulationTick;

/// Aggregate counters sampled at the end of every tick.
///
/// Gauges are recomputed by [`collect_metrics`]; the cumulative counters are
/// bumped by the owning systems as events happen.
#[derive(Resource, Default, Debug, Clone)]
pub struct SimulationMetrics {
    pub tick: u64,
    pub active_camps: usize,
    pub stale_tracked: usize,
    pub guards_cached: u64,
    pub throttle_entries: usize,
    pub camps_expired: u64,
    pub notifications_sent: u64,
    pub notifications_throttled: u64,
    pub recount_failures: u64,
}

pub fn collect_metrics(
    tick: Res<SimulationTick>,
    registry: Res<CampRegistry>,
    counters: Res<StaleCounters>,
    cache: Res<RateLimitCache>,
    mut metrics: ResMut<SimulationMetrics>,
) {
    metrics.tick = tick.0;
    metrics.active_camps = registry.len();
    metrics.stale_tracked = counters.tracked();
    metrics.guards_cached = registry
        .entries()
        .map(|entry| u64::from(entry.guard_count))
        .sum();
    metrics.throttle_entries = cache.len();
}
