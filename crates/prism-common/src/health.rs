//! Exporter self-health, tracked per configured section.
//!
//! Every section gets a [`HealthRecord`] on first reference. Records are never
//! removed; they live as long as the owning [`HealthRegistry`]. The record
//! counters are exported by [`HealthExporter`] on every scrape, so operators can
//! tell "exporter up, Prism unreachable" apart from "exporter down".

use crate::sink::MetricSink;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Counters and cumulative durations for one section.
#[derive(Debug, Default)]
struct HealthRecord {
    err_conn_timeout: u64,
    err_collection_still_running: u64,
    err_exception: u64,
    err_dns_failure: u64,
    success_device_cmd: u64,
    failure_device_cmd: u64,
    total_poll_cycles: u64,
    successful_collections: u64,
    failed_collections: u64,

    total_success_cmd_us: u64,
    total_failure_cmd_us: u64,
    total_success_collection_us: u64,
    total_failure_collection_us: u64,

    active_collections: u32,
}

/// Point-in-time copy of a section's health counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub err_conn_timeout: u64,
    pub err_collection_still_running: u64,
    pub err_exception: u64,
    pub err_dns_failure: u64,
    pub success_device_cmd: u64,
    pub failure_device_cmd: u64,
    pub total_poll_cycles: u64,
    pub successful_collections: u64,
    pub failed_collections: u64,
    pub total_success_cmd_us: u64,
    pub total_failure_cmd_us: u64,
    pub total_success_collection_us: u64,
    pub total_failure_collection_us: u64,
    pub active_collections: u32,
}

impl From<&HealthRecord> for HealthSnapshot {
    fn from(r: &HealthRecord) -> Self {
        Self {
            err_conn_timeout: r.err_conn_timeout,
            err_collection_still_running: r.err_collection_still_running,
            err_exception: r.err_exception,
            err_dns_failure: r.err_dns_failure,
            success_device_cmd: r.success_device_cmd,
            failure_device_cmd: r.failure_device_cmd,
            total_poll_cycles: r.total_poll_cycles,
            successful_collections: r.successful_collections,
            failed_collections: r.failed_collections,
            total_success_cmd_us: r.total_success_cmd_us,
            total_failure_cmd_us: r.total_failure_cmd_us,
            total_success_collection_us: r.total_success_collection_us,
            total_failure_collection_us: r.total_failure_collection_us,
            active_collections: r.active_collections,
        }
    }
}

type SharedRecord = Arc<RwLock<HealthRecord>>;

/// Section name to health record map.
///
/// The outer lock only guards record creation/lookup; counters are mutated
/// under each record's own lock. No lock is held across an `.await`.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    sections: RwLock<HashMap<String, SharedRecord>>,
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, section: &str) -> SharedRecord {
        {
            let map = self.sections.read().unwrap_or_else(|e| e.into_inner());
            if let Some(rec) = map.get(section) {
                return Arc::clone(rec);
            }
        }
        let mut map = self.sections.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(map.entry(section.to_string()).or_default())
    }

    fn update<F: FnOnce(&mut HealthRecord)>(&self, section: &str, f: F) {
        let rec = self.record(section);
        let mut guard: RwLockWriteGuard<'_, HealthRecord> =
            rec.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    /// Mark a collection as started for `section`.
    ///
    /// Returns `false` and counts an overlap when a collection is already
    /// active; the caller must then skip its own collection and must not call
    /// [`Self::mark_collection_end`].
    pub fn mark_collection_start(&self, section: &str) -> bool {
        let mut started = false;
        self.update(section, |h| {
            if h.active_collections > 0 {
                h.err_collection_still_running += 1;
            } else {
                h.active_collections += 1;
                started = true;
            }
        });
        started
    }

    pub fn mark_collection_end(&self, section: &str, success: bool, duration: Duration) {
        let us = micros(duration);
        self.update(section, |h| {
            if success {
                h.total_success_collection_us = h.total_success_collection_us.saturating_add(us);
                h.successful_collections += 1;
            } else {
                h.total_failure_collection_us = h.total_failure_collection_us.saturating_add(us);
                h.failed_collections += 1;
            }
            h.total_poll_cycles += 1;
            h.active_collections = h.active_collections.saturating_sub(1);
        });
    }

    pub fn mark_cmd_success(&self, section: &str, duration: Duration) {
        let us = micros(duration);
        self.update(section, |h| {
            h.success_device_cmd += 1;
            h.total_success_cmd_us = h.total_success_cmd_us.saturating_add(us);
        });
    }

    pub fn mark_cmd_failure(&self, section: &str, duration: Duration) {
        let us = micros(duration);
        self.update(section, |h| {
            h.failure_device_cmd += 1;
            h.total_failure_cmd_us = h.total_failure_cmd_us.saturating_add(us);
        });
    }

    pub fn inc_conn_timeout(&self, section: &str) {
        self.update(section, |h| h.err_conn_timeout += 1);
    }

    pub fn inc_dns_failure(&self, section: &str) {
        self.update(section, |h| h.err_dns_failure += 1);
    }

    pub fn inc_exception(&self, section: &str) {
        self.update(section, |h| h.err_exception += 1);
    }

    pub fn snapshot(&self, section: &str) -> HealthSnapshot {
        let rec = self.record(section);
        let guard: RwLockReadGuard<'_, HealthRecord> =
            rec.read().unwrap_or_else(|e| e.into_inner());
        HealthSnapshot::from(&*guard)
    }
}

/// An admitted collection for one section.
///
/// Obtained from [`HealthRegistry::begin_collection`]. [`Self::finish`]
/// records the outcome; a guard dropped before that (a cancelled scrape)
/// records a failed collection, so the section is never left marked active.
#[derive(Debug)]
pub struct CollectionGuard {
    registry: Arc<HealthRegistry>,
    section: String,
    started: Instant,
    finished: bool,
}

impl CollectionGuard {
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Record the outcome and return the collection's duration.
    pub fn finish(mut self, success: bool) -> Duration {
        self.finished = true;
        let elapsed = self.started.elapsed();
        self.registry.mark_collection_end(&self.section, success, elapsed);
        elapsed
    }
}

impl Drop for CollectionGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(section = %self.section, "collection abandoned before completion");
            self.registry
                .mark_collection_end(&self.section, false, self.started.elapsed());
        }
    }
}

impl HealthRegistry {
    /// [`Self::mark_collection_start`] paired with a guard that ends the
    /// collection on every path. `None` when another collection is active.
    pub fn begin_collection(self: &Arc<Self>, section: &str) -> Option<CollectionGuard> {
        self.mark_collection_start(section).then(|| CollectionGuard {
            registry: Arc::clone(self),
            section: section.to_string(),
            started: Instant::now(),
            finished: false,
        })
    }
}

/// Label names carried by every health series.
pub const HEALTH_LABELS: [&str; 3] = ["section", "uuid", "cluster_uuid"];

struct HealthFamily {
    name: &'static str,
    help: &'static str,
    value: fn(&HealthSnapshot) -> u64,
}

const HEALTH_FAMILIES: [HealthFamily; 13] = [
    HealthFamily {
        name: "nutanix_exporter_ErrorPCNoDataConnectionTimeout_C",
        help: "Exporter: connection timeouts encountered while calling Prism API",
        value: |s| s.err_conn_timeout,
    },
    HealthFamily {
        name: "nutanix_exporter_ErrorPCNoDataCollectionStillRunning_C",
        help: "Exporter: collection overlap occurrences",
        value: |s| s.err_collection_still_running,
    },
    HealthFamily {
        name: "nutanix_exporter_ErrorPCNoDataException_C",
        help: "Exporter: generic errors while calling Prism API",
        value: |s| s.err_exception,
    },
    HealthFamily {
        name: "nutanix_exporter_ErrorPCNoDataDNSLookupFailure_C",
        help: "Exporter: DNS lookup failures",
        value: |s| s.err_dns_failure,
    },
    HealthFamily {
        name: "nutanix_exporter_SuccessDeviceCommand_C",
        help: "Exporter: successful device/API commands",
        value: |s| s.success_device_cmd,
    },
    HealthFamily {
        name: "nutanix_exporter_TotalSuccessDeviceCmdExecDuration_US",
        help: "Exporter: total duration of successful API commands (microseconds)",
        value: |s| s.total_success_cmd_us,
    },
    HealthFamily {
        name: "nutanix_exporter_TotalSuccessDeviceCollectionDuration_US",
        help: "Exporter: total duration of successful collections (microseconds)",
        value: |s| s.total_success_collection_us,
    },
    HealthFamily {
        name: "nutanix_exporter_FailureDeviceCommand_C",
        help: "Exporter: failed device/API commands",
        value: |s| s.failure_device_cmd,
    },
    HealthFamily {
        name: "nutanix_exporter_TotalFailureDeviceCmdExecDuration_US",
        help: "Exporter: total duration of failed API commands (microseconds)",
        value: |s| s.total_failure_cmd_us,
    },
    HealthFamily {
        name: "nutanix_exporter_TotalFailureDeviceCollectionDuration_US",
        help: "Exporter: total duration of failed collections (microseconds)",
        value: |s| s.total_failure_collection_us,
    },
    HealthFamily {
        name: "nutanix_exporter_TotalPollCycles_C",
        help: "Exporter: completed poll cycles (successful or not)",
        value: |s| s.total_poll_cycles,
    },
    HealthFamily {
        name: "nutanix_exporter_SuccessfulPCCallNoErrors_C",
        help: "Exporter: successful poll cycles with no errors",
        value: |s| s.successful_collections,
    },
    HealthFamily {
        name: "nutanix_exporter_FailedCollections_C",
        help: "Exporter: failed collection attempts",
        value: |s| s.failed_collections,
    },
];

/// Renders one section's health record as the `nutanix_exporter_*` family.
#[derive(Debug, Clone)]
pub struct HealthExporter {
    pub section: String,
    pub uuid: String,
    pub cluster_uuid: String,
}

impl HealthExporter {
    pub fn new(section: impl Into<String>, uuid: impl Into<String>, cluster_uuid: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            uuid: uuid.into(),
            cluster_uuid: cluster_uuid.into(),
        }
    }

    pub fn family_names() -> impl Iterator<Item = &'static str> {
        HEALTH_FAMILIES.iter().map(|f| f.name)
    }

    /// Emit every health family for this section into `sink`.
    pub fn collect(&self, registry: &HealthRegistry, sink: &mut MetricSink) {
        let snap = registry.snapshot(&self.section);
        let values = [
            self.section.as_str(),
            self.uuid.as_str(),
            self.cluster_uuid.as_str(),
        ];
        for family in &HEALTH_FAMILIES {
            sink.add_counter(family.name, family.help, &HEALTH_LABELS, &values, (family.value)(&snap));
        }
    }
}
