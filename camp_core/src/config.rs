use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_CAMP_POLICY: &str = include_str!("data/camp_policy.json");

/// Tunables governing camp staleness and notification throttling.
///
/// Threshold and capacity are deliberately range-checked: a threshold below 2
/// would let a single missed enumeration expire a camp, and an unbounded
/// cache capacity would defeat the memory bound the cache exists for.
#[derive(Debug, Clone, Deserialize)]
pub struct CampPolicyConfig {
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_ticks: u32,
    #[serde(default = "default_notify_capacity")]
    pub notify_cache_capacity: usize,
    #[serde(default = "default_notify_interval")]
    pub notify_min_interval_ticks: u64,
    #[serde(default = "default_guard_scan_radius")]
    pub guard_scan_radius: u32,
}

fn default_stale_threshold() -> u32 {
    3
}

fn default_notify_capacity() -> usize {
    256
}

fn default_notify_interval() -> u64 {
    60
}

fn default_guard_scan_radius() -> u32 {
    24
}

impl Default for CampPolicyConfig {
    fn default() -> Self {
        Self {
            stale_threshold_ticks: default_stale_threshold(),
            notify_cache_capacity: default_notify_capacity(),
            notify_min_interval_ticks: default_notify_interval(),
            guard_scan_radius: default_guard_scan_radius(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CampPolicyError {
    #[error("failed to parse camp policy: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read camp policy from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("stale_threshold_ticks must be within 2..=10, got {0}")]
    ThresholdOutOfRange(u32),
    #[error("notify_cache_capacity must be within 1..=10000, got {0}")]
    CapacityOutOfRange(usize),
    #[error("notify_min_interval_ticks must be at least 1")]
    IntervalZero,
    #[error("guard_scan_radius must be at least 1")]
    RadiusZero,
}

impl CampPolicyConfig {
    pub fn from_str(contents: &str) -> Result<Self, CampPolicyError> {
        let config: CampPolicyConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CampPolicyError> {
        let contents = fs::read_to_string(path).map_err(|source| CampPolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&contents)
    }

    pub fn builtin() -> Self {
        Self::from_str(BUILTIN_CAMP_POLICY).unwrap_or_else(|err| {
            tracing::warn!(
                target: "emberhold::config",
                error = %err,
                "camp_policy.builtin_invalid"
            );
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), CampPolicyError> {
        if !(2..=10).contains(&self.stale_threshold_ticks) {
            return Err(CampPolicyError::ThresholdOutOfRange(
                self.stale_threshold_ticks,
            ));
        }
        if self.notify_cache_capacity == 0 || self.notify_cache_capacity > 10_000 {
            return Err(CampPolicyError::CapacityOutOfRange(
                self.notify_cache_capacity,
            ));
        }
        if self.notify_min_interval_ticks == 0 {
            return Err(CampPolicyError::IntervalZero);
        }
        if self.guard_scan_radius == 0 {
            return Err(CampPolicyError::RadiusZero);
        }
        Ok(())
    }
}

#[derive(Resource, Debug, Clone)]
pub struct CampPolicyHandle(Arc<CampPolicyConfig>);

impl CampPolicyHandle {
    pub fn new(config: Arc<CampPolicyConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<CampPolicyConfig> {
        self.0.clone()
    }
}

/// Records where the active policy document came from, for diagnostics.
#[derive(Resource, Debug, Clone)]
pub struct CampPolicyMetadata {
    path: Option<PathBuf>,
}

impl CampPolicyMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

pub fn load_camp_policy_from_env() -> (Arc<CampPolicyConfig>, CampPolicyMetadata) {
    let override_path = env::var("CAMP_POLICY_PATH").ok().map(PathBuf::from);
    let default_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/camp_policy.json");
    let candidates: Vec<PathBuf> = match override_path {
        Some(ref path) => vec![path.clone()],
        None => vec![default_path.clone()],
    };

    for path in candidates {
        match CampPolicyConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "emberhold::config",
                    path = %path.display(),
                    "camp_policy.loaded=file"
                );
                return (Arc::new(config), CampPolicyMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "emberhold::config",
                    path = %path.display(),
                    error = %err,
                    "camp_policy.load_failed"
                );
            }
        }
    }

    let config = CampPolicyConfig::builtin();
    tracing::info!(
        target: "emberhold::config",
        "camp_policy.loaded=builtin"
    );
    (Arc::new(config), CampPolicyMetadata::new(None))
}
