use crate::config::ExporterConfig;
use crate::logging::LogLevels;
use prism_common::HealthRegistry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Section name to cluster UUID. Filled once per section, never invalidated.
#[derive(Default)]
pub struct ClusterUuidCache {
    uuids: RwLock<HashMap<String, String>>,
}

impl ClusterUuidCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, section: &str) -> Option<String> {
        self.uuids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(section)
            .cloned()
    }

    /// Keeps the first uuid stored for a section.
    pub fn insert(&self, section: &str, uuid: String) -> String {
        let mut uuids = self.uuids.write().unwrap_or_else(|e| e.into_inner());
        uuids.entry(section.to_string()).or_insert(uuid).clone()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ExporterConfig>,
    pub health: Arc<HealthRegistry>,
    pub cluster_uuids: Arc<ClusterUuidCache>,
    pub log_levels: Arc<LogLevels>,
}

impl AppState {
    pub fn new(config: ExporterConfig, log_levels: LogLevels) -> Self {
        Self {
            config: Arc::new(config),
            health: Arc::new(HealthRegistry::new()),
            cluster_uuids: Arc::new(ClusterUuidCache::new()),
            log_levels: Arc::new(log_levels),
        }
    }
}
