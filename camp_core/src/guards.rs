use std::sync::Arc;

use bevy::prelude::*;
use log::debug;
use tracing::warn;

use camp_schema::{EntityFilter, EntityKind, EntityQuery};

use crate::camp::CampRegistry;
use crate::config::CampPolicyHandle;
use crate::metrics::SimulationMetrics;

#[derive(Resource, Clone)]
pub struct EntityQueryHandle(Arc<dyn EntityQuery>);

impl EntityQueryHandle {
    pub fn new(queries: Arc<dyn EntityQuery>) -> Self {
        Self(queries)
    }

    pub fn get(&self) -> Arc<dyn EntityQuery> {
        self.0.clone()
    }
}

/// Re-validates cached guard counts against the live world.
///
/// Only camps whose initial spawning has completed are counted; a camp still
/// mid-spawn has no meaningful guard population yet. Each camp's query runs
/// inside its own failure boundary: a transient world error leaves that
/// camp's cached count as-is and never stops the remaining camps from being
/// recounted in the same tick.
pub fn recount_guards(
    policy: Res<CampPolicyHandle>,
    queries: Res<EntityQueryHandle>,
    mut registry: ResMut<CampRegistry>,
    mut metrics: ResMut<SimulationMetrics>,
) {
    let filter = EntityFilter::new(EntityKind::CampGuard, policy.get().guard_scan_radius);
    let queries = queries.get();

    for entry in registry.entries_mut() {
        if !entry.spawning_complete {
            continue;
        }

        match queries.entities_near(entry.dimension, entry.location, &filter) {
            Ok(found) => {
                let counted = match u32::try_from(found.len()) {
                    Ok(value) => value,
                    Err(_) => {
                        warn!(
                            target: "emberhold::guards",
                            owner = %entry.owner,
                            found = found.len(),
                            "guards.recount_rejected=count_overflow"
                        );
                        continue;
                    }
                };
                if counted != entry.guard_count {
                    debug!(
                        "guard recount corrected {}: {} -> {}",
                        entry.owner, entry.guard_count, counted
                    );
                }
                entry.guard_count = counted;
            }
            Err(err) => {
                metrics.recount_failures += 1;
                warn!(
                    target: "emberhold::guards",
                    owner = %entry.owner,
                    error = %err,
                    "guards.recount_failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use camp_schema::{BlockPos, Dimension, EntityHandle, OwnerId, WorldQueryError};

    use crate::camp::CampEntry;
    use crate::config::{CampPolicyConfig, CampPolicyHandle};

    use super::*;

    /// Entities grouped by dimension; queries against a poisoned dimension
    /// fail the way an unloaded chunk would.
    struct ScriptedWorld {
        entities: Mutex<Vec<(Dimension, EntityHandle)>>,
        poisoned: Option<Dimension>,
    }

    impl ScriptedWorld {
        fn new(entities: Vec<(Dimension, EntityHandle)>, poisoned: Option<Dimension>) -> Self {
            Self {
                entities: Mutex::new(entities),
                poisoned,
            }
        }
    }

    impl EntityQuery for ScriptedWorld {
        fn entities_near(
            &self,
            dimension: Dimension,
            center: BlockPos,
            filter: &EntityFilter,
        ) -> Result<Vec<EntityHandle>, WorldQueryError> {
            if self.poisoned == Some(dimension) {
                return Err(WorldQueryError::DimensionUnloaded(dimension));
            }
            let entities = self.entities.lock().expect("lock");
            Ok(entities
                .iter()
                .filter(|(entity_dimension, handle)| {
                    *entity_dimension == dimension
                        && filter.matches(&center, handle.kind, &handle.position)
                })
                .map(|(_, handle)| *handle)
                .collect())
        }
    }

    fn guard(id: u64, position: BlockPos) -> EntityHandle {
        EntityHandle {
            id,
            kind: EntityKind::CampGuard,
            position,
        }
    }

    fn run_recount(world: Arc<dyn EntityQuery>, registry: CampRegistry) -> (CampRegistry, SimulationMetrics) {
        let mut app = App::new();
        app.insert_resource(CampPolicyHandle::new(Arc::new(CampPolicyConfig::default())));
        app.insert_resource(EntityQueryHandle::new(world));
        app.insert_resource(registry);
        app.insert_resource(SimulationMetrics::default());
        app.add_systems(Update, recount_guards);
        app.update();
        let registry = app.world.remove_resource::<CampRegistry>().expect("registry");
        let metrics = app.world.remove_resource::<SimulationMetrics>().expect("metrics");
        (registry, metrics)
    }

    #[test]
    fn recount_overwrites_cached_count() {
        let anchor = BlockPos::new(0, 64, 0);
        let world = Arc::new(ScriptedWorld::new(
            vec![
                (Dimension::Overworld, guard(1, BlockPos::new(2, 64, 2))),
                (Dimension::Overworld, guard(2, BlockPos::new(-3, 64, 5))),
                // Outside the scan radius, must not be counted.
                (Dimension::Overworld, guard(3, BlockPos::new(500, 64, 0))),
            ],
            None,
        ));

        let mut registry = CampRegistry::default();
        let mut entry = CampEntry::new(OwnerId::new("ash"), anchor, Dimension::Overworld);
        entry.spawning_complete = true;
        entry.guard_count = 9;
        registry.register(entry);

        let (registry, metrics) = run_recount(world, registry);
        assert_eq!(registry.get(&OwnerId::new("ash")).expect("entry").guard_count, 2);
        assert_eq!(metrics.recount_failures, 0);
    }

    #[test]
    fn mid_spawn_camps_are_skipped() {
        let world = Arc::new(ScriptedWorld::new(
            vec![(Dimension::Overworld, guard(1, BlockPos::new(0, 64, 0)))],
            None,
        ));

        let mut registry = CampRegistry::default();
        let mut entry = CampEntry::new(
            OwnerId::new("ash"),
            BlockPos::new(0, 64, 0),
            Dimension::Overworld,
        );
        entry.guard_count = 7;
        registry.register(entry);

        let (registry, _) = run_recount(world, registry);
        assert_eq!(
            registry.get(&OwnerId::new("ash")).expect("entry").guard_count,
            7,
            "mid-spawn camp must keep its cached count"
        );
    }

    #[test]
    fn one_failing_camp_does_not_starve_the_rest() {
        let world = Arc::new(ScriptedWorld::new(
            vec![(Dimension::Overworld, guard(1, BlockPos::new(1, 64, 1)))],
            Some(Dimension::Rift),
        ));

        let mut registry = CampRegistry::default();
        let mut broken = CampEntry::new(
            OwnerId::new("bram"),
            BlockPos::new(0, 40, 0),
            Dimension::Rift,
        );
        broken.spawning_complete = true;
        broken.guard_count = 5;
        registry.register(broken);

        let mut healthy = CampEntry::new(
            OwnerId::new("ash"),
            BlockPos::new(0, 64, 0),
            Dimension::Overworld,
        );
        healthy.spawning_complete = true;
        healthy.guard_count = 0;
        registry.register(healthy);

        let (registry, metrics) = run_recount(world, registry);

        let broken = registry.get(&OwnerId::new("bram")).expect("entry");
        assert_eq!(broken.guard_count, 5, "failed query keeps previous count");
        let healthy = registry.get(&OwnerId::new("ash")).expect("entry");
        assert_eq!(healthy.guard_count, 1, "other camps still recounted");
        assert_eq!(metrics.recount_failures, 1);
    }
}
