use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;

/// Per-scrape write sink backed by a fresh [`Registry`].
///
/// Families are created on first use and looked up by fully-qualified name
/// afterwards, so several collectors (or the NIC sub-collectors of one parent)
/// can emit into the same family. A family is bound to the label set it was
/// first created with; emitting the same name with other labels is refused.
pub struct MetricSink {
    registry: Registry,
    gauges: HashMap<String, (Vec<String>, GaugeVec)>,
    counters: HashMap<String, (Vec<String>, IntCounterVec)>,
}

impl Default for MetricSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSink {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gauges: HashMap::new(),
            counters: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Set one gauge sample. Returns `false` when the sample was dropped.
    pub fn set_gauge(
        &mut self,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
        value: f64,
    ) -> bool {
        let Some(vec) = self.gauge_family(name, help, labels) else {
            return false;
        };
        match vec.get_metric_with_label_values(values) {
            Ok(gauge) => {
                gauge.set(value);
                true
            }
            Err(e) => {
                tracing::warn!(metric = name, error = %e, "dropping gauge sample");
                false
            }
        }
    }

    /// Add `value` to a counter sample. Returns `false` when the sample was dropped.
    pub fn add_counter(
        &mut self,
        name: &str,
        help: &str,
        labels: &[&str],
        values: &[&str],
        value: u64,
    ) -> bool {
        let Some(vec) = self.counter_family(name, help, labels) else {
            return false;
        };
        match vec.get_metric_with_label_values(values) {
            Ok(counter) => {
                counter.inc_by(value);
                true
            }
            Err(e) => {
                tracing::warn!(metric = name, error = %e, "dropping counter sample");
                false
            }
        }
    }

    /// Render everything registered so far in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    fn gauge_family(&mut self, name: &str, help: &str, labels: &[&str]) -> Option<GaugeVec> {
        if let Some((known, vec)) = self.gauges.get(name) {
            return same_labels(name, known, labels).then(|| vec.clone());
        }
        if self.counters.contains_key(name) {
            tracing::warn!(metric = name, "name already registered as counter");
            return None;
        }
        let vec = match GaugeVec::new(Opts::new(name, help), labels) {
            Ok(vec) => vec,
            Err(e) => {
                tracing::warn!(metric = name, error = %e, "invalid gauge descriptor");
                return None;
            }
        };
        if let Err(e) = self.registry.register(Box::new(vec.clone())) {
            tracing::warn!(metric = name, error = %e, "failed to register gauge");
            return None;
        }
        self.gauges
            .insert(name.to_string(), (to_owned(labels), vec.clone()));
        Some(vec)
    }

    fn counter_family(&mut self, name: &str, help: &str, labels: &[&str]) -> Option<IntCounterVec> {
        if let Some((known, vec)) = self.counters.get(name) {
            return same_labels(name, known, labels).then(|| vec.clone());
        }
        if self.gauges.contains_key(name) {
            tracing::warn!(metric = name, "name already registered as gauge");
            return None;
        }
        let vec = match IntCounterVec::new(Opts::new(name, help), labels) {
            Ok(vec) => vec,
            Err(e) => {
                tracing::warn!(metric = name, error = %e, "invalid counter descriptor");
                return None;
            }
        };
        if let Err(e) = self.registry.register(Box::new(vec.clone())) {
            tracing::warn!(metric = name, error = %e, "failed to register counter");
            return None;
        }
        self.counters
            .insert(name.to_string(), (to_owned(labels), vec.clone()));
        Some(vec)
    }
}

fn to_owned(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

fn same_labels(name: &str, known: &[String], labels: &[&str]) -> bool {
    let same = known.len() == labels.len() && known.iter().zip(labels).all(|(a, b)| a == b);
    if !same {
        tracing::warn!(
            metric = name,
            registered = ?known,
            requested = ?labels,
            "label set collision, sample dropped"
        );
    }
    same
}
