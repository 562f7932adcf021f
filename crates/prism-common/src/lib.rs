//! Types shared by the Prism client, the entity collectors and the exporter
//! binary: the untyped [`Entity`] record, key/value normalization, the
//! registry-backed [`sink::MetricSink`] and the exporter self-health tracker.

pub mod entity;
pub mod health;
pub mod normalize;
pub mod sink;

pub use entity::Entity;
pub use health::{CollectionGuard, HealthExporter, HealthRegistry, HealthSnapshot};
pub use normalize::{normalize_key, stat_value, value_to_f64};
pub use sink::MetricSink;
