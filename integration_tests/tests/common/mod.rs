use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};

use camp_core::WorldAdapters;
use camp_schema::{
    BlockPos, Dimension, EntityFilter, EntityHandle, EntityQuery, NotificationSink, OwnerId,
    PresenceError, PresenceSource, WorldQueryError,
};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_camp_policy.json");

        debug_assert!(
            config_path.exists(),
            "missing test camp policy at {}",
            config_path.display()
        );

        std::env::set_var("CAMP_POLICY_PATH", &config_path);
    });
}

/// Presence source the test scripts by connecting and disconnecting owners.
#[derive(Default)]
pub struct ScriptedPresence {
    connected: Mutex<HashSet<OwnerId>>,
    failing: Mutex<bool>,
}

impl ScriptedPresence {
    pub fn connect(&self, owner: &str) {
        self.connected
            .lock()
            .expect("presence lock")
            .insert(OwnerId::new(owner));
    }

    pub fn disconnect(&self, owner: &str) {
        self.connected
            .lock()
            .expect("presence lock")
            .remove(&OwnerId::new(owner));
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("presence lock") = failing;
    }
}

impl PresenceSource for ScriptedPresence {
    fn connected_owners(&self) -> Result<Vec<OwnerId>, PresenceError> {
        if *self.failing.lock().expect("presence lock") {
            return Err(PresenceError::Unavailable("scripted outage".into()));
        }
        Ok(self
            .connected
            .lock()
            .expect("presence lock")
            .iter()
            .cloned()
            .collect())
    }
}

/// Entity store the test populates directly; whole dimensions can be marked
/// as failing to exercise the recount failure boundary.
#[derive(Default)]
pub struct ScriptedEntities {
    entities: Mutex<Vec<(Dimension, EntityHandle)>>,
    failing_dimensions: Mutex<HashSet<Dimension>>,
}

impl ScriptedEntities {
    pub fn add(&self, dimension: Dimension, handle: EntityHandle) {
        self.entities
            .lock()
            .expect("entity lock")
            .push((dimension, handle));
    }

    pub fn remove(&self, id: u64) {
        self.entities
            .lock()
            .expect("entity lock")
            .retain(|(_, handle)| handle.id != id);
    }

    pub fn fail_dimension(&self, dimension: Dimension) {
        self.failing_dimensions
            .lock()
            .expect("entity lock")
            .insert(dimension);
    }
}

impl EntityQuery for ScriptedEntities {
    fn entities_near(
        &self,
        dimension: Dimension,
        center: BlockPos,
        filter: &EntityFilter,
    ) -> Result<Vec<EntityHandle>, WorldQueryError> {
        if self
            .failing_dimensions
            .lock()
            .expect("entity lock")
            .contains(&dimension)
        {
            return Err(WorldQueryError::DimensionUnloaded(dimension));
        }
        Ok(self
            .entities
            .lock()
            .expect("entity lock")
            .iter()
            .filter(|(entity_dimension, handle)| {
                *entity_dimension == dimension
                    && filter.matches(&center, handle.kind, &handle.position)
            })
            .map(|(_, handle)| *handle)
            .collect())
    }
}

/// Sink recording every delivered notification.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(OwnerId, String)>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<(OwnerId, String)> {
        self.delivered.lock().expect("sink lock").clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, owner: &OwnerId, message: &str) {
        self.delivered
            .lock()
            .expect("sink lock")
            .push((owner.clone(), message.to_string()));
    }
}

pub struct TestHarness {
    pub presence: Arc<ScriptedPresence>,
    pub entities: Arc<ScriptedEntities>,
    pub sink: Arc<RecordingSink>,
}

impl TestHarness {
    pub fn adapters(&self) -> WorldAdapters {
        WorldAdapters {
            presence: self.presence.clone(),
            entities: self.entities.clone(),
            notifications: self.sink.clone(),
        }
    }
}

pub fn test_harness() -> TestHarness {
    ensure_test_config();
    TestHarness {
        presence: Arc::new(ScriptedPresence::default()),
        entities: Arc::new(ScriptedEntities::default()),
        sink: Arc::new(RecordingSink::default()),
    }
}
