//! Calculated stats inserted next to the raw upstream ones before
//! descriptors are derived, so they flow through the same allow-list.
//!
//! Raw inputs are floored at zero: Prism reports `-1` for "not sampled".

use prism_common::{value_to_f64, Entity};
use serde_json::Value;

pub const TOTAL_WRITE_IO_SIZE: &str = "controller_total_write_io_size_kbytes";
pub const MEMORY_USAGE_BYTES: &str = "memory_usage_bytes";
pub const MEMORY_FREE_BYTES: &str = "memory_free_bytes";
pub const SWAP_IN_RATE_BYTES: &str = "memory_swap_in_rate_bytes";
pub const SWAP_OUT_RATE_BYTES: &str = "memory_swap_out_rate_bytes";
pub const TIER_TOTAL_USAGE_BYTES: &str = "controller.storage_tier.total.usage_bytes";

pub const TOTAL_IO_SIZE: &str = "controller_total_io_size_kbytes";
pub const READ_IO_SIZE: &str = "controller_total_read_io_size_kbytes";
pub const MEMORY_USAGE_PPM: &str = "hypervisor_memory_usage_ppm";
pub const TIMESPAN_USECS: &str = "controller_timespan_usecs";
pub const SWAPPED_IN_BYTES: &str = "hypervisor.memory_swapped_in_bytes";
pub const SWAPPED_OUT_BYTES: &str = "hypervisor.memory_swapped_out_bytes";

pub const TIER_USAGE_KEYS: [&str; 6] = [
    "controller.storage_tier.cloud.pinned_usage_bytes",
    "controller.storage_tier.cloud.usage_bytes",
    "controller.storage_tier.das-sata.pinned_usage_bytes",
    "controller.storage_tier.das-sata.usage_bytes",
    "controller.storage_tier.ssd.pinned_usage_bytes",
    "controller.storage_tier.ssd.usage_bytes",
];

fn floored(map: &Entity, key: &str) -> f64 {
    map.get(key)
        .and_then(value_to_f64)
        .map(|v| v.max(0.0))
        .unwrap_or(0.0)
}

fn insert(map: &mut Entity, key: &str, value: f64) {
    map.insert(key.to_string(), Value::from(value));
}

/// total − read, each floored at zero.
pub fn write_io_size(stats: &Entity) -> f64 {
    floored(stats, TOTAL_IO_SIZE) - floored(stats, READ_IO_SIZE)
}

/// `(used, free)` bytes from a usage ratio in parts per million.
pub fn memory_usage(capacity_bytes: f64, usage_ppm: f64) -> (f64, f64) {
    let used = (usage_ppm.max(0.0) / 1_000_000.0) * capacity_bytes;
    (used, capacity_bytes - used)
}

/// Bytes per second over a sampling window given in microseconds.
pub fn swap_rate(swapped_bytes: f64, timespan_usecs: f64) -> f64 {
    if timespan_usecs <= 0.0 {
        return 0.0;
    }
    swapped_bytes * 1_000_000.0 / timespan_usecs
}

pub fn tier_usage_total(stats: &Entity) -> f64 {
    TIER_USAGE_KEYS
        .iter()
        .filter(|k| stats.contains_key(**k))
        .map(|k| floored(stats, k))
        .sum()
}

fn stats_mut(entity: &mut Entity) -> Option<&mut Entity> {
    entity.get_mut("stats").and_then(Value::as_object_mut)
}

/// Add [`TOTAL_WRITE_IO_SIZE`] to the entity's `stats` map.
pub fn add_write_io_size(entity: &mut Entity) {
    if let Some(stats) = stats_mut(entity) {
        let value = write_io_size(stats);
        insert(stats, TOTAL_WRITE_IO_SIZE, value);
    }
}

/// Add used/free memory to `stats`, reading capacity from the first of
/// `capacity_keys` present on the entity itself.
pub fn add_memory_stats(entity: &mut Entity, capacity_keys: &[&str]) {
    let capacity = capacity_keys
        .iter()
        .find_map(|k| entity.get(*k).and_then(value_to_f64))
        .unwrap_or(0.0);
    if let Some(stats) = stats_mut(entity) {
        let (used, free) = memory_usage(capacity, floored(stats, MEMORY_USAGE_PPM));
        insert(stats, MEMORY_USAGE_BYTES, used);
        insert(stats, MEMORY_FREE_BYTES, free);
    }
}

pub fn add_swap_rates(entity: &mut Entity) {
    if let Some(stats) = stats_mut(entity) {
        let timespan = floored(stats, TIMESPAN_USECS);
        let swap_in = swap_rate(floored(stats, SWAPPED_IN_BYTES), timespan);
        let swap_out = swap_rate(floored(stats, SWAPPED_OUT_BYTES), timespan);
        insert(stats, SWAP_IN_RATE_BYTES, swap_in);
        insert(stats, SWAP_OUT_RATE_BYTES, swap_out);
    }
}

pub fn add_tier_usage_total(entity: &mut Entity) {
    if let Some(stats) = stats_mut(entity) {
        let value = tier_usage_total(stats);
        insert(stats, TIER_TOTAL_USAGE_BYTES, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_common::entity::object_field;
    use serde_json::json;

    fn entity(v: Value) -> Entity {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn write_io_size_subtracts_read_from_total() {
        let stats = entity(json!({TOTAL_IO_SIZE: "100", READ_IO_SIZE: "40"}));
        assert_eq!(write_io_size(&stats), 60.0);
    }

    #[test]
    fn write_io_size_floors_negative_inputs() {
        let stats = entity(json!({TOTAL_IO_SIZE: 100, READ_IO_SIZE: "-40"}));
        assert_eq!(write_io_size(&stats), 100.0);
        let stats = entity(json!({TOTAL_IO_SIZE: "-1", READ_IO_SIZE: "-1"}));
        assert_eq!(write_io_size(&stats), 0.0);
        assert_eq!(write_io_size(&Entity::new()), 0.0);
    }

    #[test]
    fn memory_usage_from_ppm() {
        assert_eq!(memory_usage(1000.0, 250_000.0), (250.0, 750.0));
        assert_eq!(memory_usage(1000.0, -1.0), (0.0, 1000.0));
    }

    #[test]
    fn swap_rate_guards_zero_timespan() {
        assert_eq!(swap_rate(4096.0, 0.0), 0.0);
        assert_eq!(swap_rate(4096.0, 2_000_000.0), 2048.0);
    }

    #[test]
    fn tier_total_sums_present_keys_floored() {
        let stats = entity(json!({
            "controller.storage_tier.ssd.usage_bytes": "100",
            "controller.storage_tier.das-sata.usage_bytes": 50,
            "controller.storage_tier.cloud.usage_bytes": "-1",
            "unrelated": 999
        }));
        assert_eq!(tier_usage_total(&stats), 150.0);
    }

    #[test]
    fn add_helpers_write_into_stats_map() {
        let mut host = entity(json!({
            "memory_capacity_in_bytes": 2000,
            "stats": {
                TOTAL_IO_SIZE: "10",
                READ_IO_SIZE: "4",
                MEMORY_USAGE_PPM: "500000",
                TIMESPAN_USECS: "1000000",
                SWAPPED_IN_BYTES: "10"
            }
        }));
        add_write_io_size(&mut host);
        add_memory_stats(&mut host, &["memory_capacity_in_bytes"]);
        add_swap_rates(&mut host);

        let stats = object_field(&host, "stats").unwrap();
        assert_eq!(stats[TOTAL_WRITE_IO_SIZE].as_f64(), Some(6.0));
        assert_eq!(stats[MEMORY_USAGE_BYTES].as_f64(), Some(1000.0));
        assert_eq!(stats[MEMORY_FREE_BYTES].as_f64(), Some(1000.0));
        assert_eq!(stats[SWAP_IN_RATE_BYTES].as_f64(), Some(10.0));
        assert_eq!(stats[SWAP_OUT_RATE_BYTES].as_f64(), Some(0.0));
    }

    #[test]
    fn add_helpers_ignore_entities_without_stats() {
        let mut bare = entity(json!({"uuid": "x"}));
        add_write_io_size(&mut bare);
        add_tier_usage_total(&mut bare);
        assert_eq!(bare.len(), 1);
    }
}
