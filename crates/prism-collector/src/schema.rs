//! Metric descriptor derivation from sampled entities.

use prism_common::entity::object_field;
use prism_common::{normalize_key, Entity};
use std::collections::HashSet;

/// Name of the per-entity identity gauge every collector emits.
pub const PROPERTIES: &str = "properties";

/// Static set of upstream stat keys a collector publishes.
#[derive(Debug, Clone, Copy)]
pub struct AllowList {
    keys: &'static [&'static str],
    excluded_fragment: Option<&'static str>,
}

impl AllowList {
    pub const fn new(keys: &'static [&'static str]) -> Self {
        Self {
            keys,
            excluded_fragment: None,
        }
    }

    /// Refuse any key containing `fragment`, even when it is listed.
    pub const fn excluding(self, fragment: &'static str) -> Self {
        Self {
            keys: self.keys,
            excluded_fragment: Some(fragment),
        }
    }

    pub fn permits(&self, key: &str) -> bool {
        if let Some(fragment) = self.excluded_fragment {
            if key.contains(fragment) {
                return false;
            }
        }
        self.keys.contains(&key)
    }
}

/// One gauge family derived from an upstream stat key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    pub namespace: String,
    /// Normalized metric name, without the namespace.
    pub name: String,
    pub labels: Vec<String>,
    /// Upstream key the value is read from.
    pub raw_key: String,
}

impl MetricDesc {
    pub fn fq_name(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }

    pub fn help(&self) -> String {
        format!("Nutanix {} stat {}", self.namespace, self.raw_key)
    }
}

/// Derive descriptors from the stat maps of one sample entity.
///
/// Maps are visited in the order given and keys in their document order.
/// Only allow-listed keys are kept; when two raw keys normalize to the same
/// name the first one wins.
pub fn derive_descriptors(
    sample: &Entity,
    stat_maps: &[&str],
    allow: &AllowList,
    namespace: &str,
    labels: &[&str],
) -> Vec<MetricDesc> {
    let mut seen = HashSet::new();
    let mut descriptors = Vec::new();
    for map_key in stat_maps {
        let Some(stats) = object_field(sample, map_key) else {
            continue;
        };
        for key in stats.keys() {
            if !allow.permits(key) {
                continue;
            }
            let name = normalize_key(key);
            if !seen.insert(name.clone()) {
                continue;
            }
            descriptors.push(MetricDesc {
                namespace: namespace.to_string(),
                name,
                labels: labels.iter().map(|l| l.to_string()).collect(),
                raw_key: key.clone(),
            });
        }
    }
    descriptors
}

/// Union of [`derive_descriptors`] over every entity, in first-seen order.
///
/// An entity with a missing or malformed stat map contributes nothing, so it
/// cannot hide the stats of the entities after it.
pub fn merge_descriptors<'a>(
    entities: impl IntoIterator<Item = &'a Entity>,
    stat_maps: &[&str],
    allow: &AllowList,
    namespace: &str,
    labels: &[&str],
) -> Vec<MetricDesc> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for entity in entities {
        for desc in derive_descriptors(entity, stat_maps, allow, namespace, labels) {
            if seen.insert(desc.name.clone()) {
                merged.push(desc);
            }
        }
    }
    merged
}
