//! Stat table shared by the entity collectors.
//!
//! A [`Layout`] describes one entity kind statically (namespace, stat maps,
//! allow-list, identity labels, properties and plain fields). A [`StatTable`]
//! holds the entities fetched during Describe together with the descriptors
//! derived from them, and emits everything during Collect.

use crate::schema::{merge_descriptors, AllowList, MetricDesc, PROPERTIES};
use prism_common::entity::{label_text, str_field};
use prism_common::{stat_value, value_to_f64, Entity, MetricSink};

/// How a property value is turned into label text.
#[derive(Debug, Clone, Copy)]
pub enum Convert {
    /// Used verbatim (see [`label_text`]).
    Text,
    /// Numeric, rendered without decimals.
    Integer,
    /// Numeric, divided then rendered without decimals (bytes→MB, Hz→MHz).
    Scaled(f64),
}

/// Label on the `<namespace>_properties` gauge.
#[derive(Debug, Clone, Copy)]
pub struct Property {
    pub label: &'static str,
    pub source: &'static str,
    pub convert: Convert,
}

impl Property {
    pub const fn text(name: &'static str) -> Self {
        Self::converted(name, name, Convert::Text)
    }

    pub const fn converted(label: &'static str, source: &'static str, convert: Convert) -> Self {
        Self {
            label,
            source,
            convert,
        }
    }

    fn render(&self, entity: &Entity) -> String {
        let Some(value) = entity.get(self.source) else {
            return String::new();
        };
        match self.convert {
            Convert::Text => label_text(value),
            Convert::Integer => value_to_f64(value)
                .map(|v| format!("{v:.0}"))
                .unwrap_or_default(),
            Convert::Scaled(divisor) => value_to_f64(value)
                .map(|v| format!("{:.0}", v / divisor))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Number,
    /// 1 when the value equals the given text (case-insensitive), else 0.
    Flag(&'static str),
}

/// Top-level entity field exported as its own gauge.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    /// Candidate source keys, first present wins.
    pub sources: &'static [&'static str],
    pub kind: FieldKind,
}

impl Field {
    pub const fn number(name: &'static str) -> Self {
        Self {
            name,
            sources: &[],
            kind: FieldKind::Number,
        }
    }

    pub const fn sourced(name: &'static str, sources: &'static [&'static str], kind: FieldKind) -> Self {
        Self { name, sources, kind }
    }

    fn value(&self, entity: &Entity) -> Option<f64> {
        let raw = if self.sources.is_empty() {
            entity.get(self.name)
        } else {
            self.sources.iter().find_map(|k| entity.get(*k))
        }?;
        match self.kind {
            FieldKind::Number => stat_value(raw),
            FieldKind::Flag(expected) => raw
                .as_str()
                .map(|s| if s.eq_ignore_ascii_case(expected) { 1.0 } else { 0.0 }),
        }
    }
}

/// Label identifying the entity on every stat and field gauge.
#[derive(Debug, Clone, Copy)]
pub struct IdentityLabel {
    pub label: &'static str,
    pub sources: &'static [&'static str],
    /// Entities without a required label are skipped entirely.
    pub required: bool,
}

impl IdentityLabel {
    pub const fn required(label: &'static str, sources: &'static [&'static str]) -> Self {
        Self {
            label,
            sources,
            required: true,
        }
    }

    pub const fn optional(label: &'static str, sources: &'static [&'static str]) -> Self {
        Self {
            label,
            sources,
            required: false,
        }
    }
}

/// Static description of one entity kind.
pub struct Layout {
    pub namespace: &'static str,
    pub stat_maps: &'static [&'static str],
    pub allow: AllowList,
    pub identity: &'static [IdentityLabel],
    pub properties: &'static [Property],
    pub fields: &'static [Field],
    /// Adds calculated stats to a fetched entity.
    pub calculate: fn(&mut Entity),
}

pub fn no_calculated_stats(_: &mut Entity) {}

pub struct StatTable {
    layout: &'static Layout,
    entities: Vec<Entity>,
    descriptors: Vec<MetricDesc>,
    described: bool,
}

impl StatTable {
    pub fn new(layout: &'static Layout) -> Self {
        Self {
            layout,
            entities: Vec::new(),
            descriptors: Vec::new(),
            described: false,
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.layout.namespace
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn descriptors(&self) -> &[MetricDesc] {
        &self.descriptors
    }

    /// Forget everything from a previous Describe.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.descriptors.clear();
        self.described = false;
    }

    /// Replace the table contents with freshly fetched entities.
    ///
    /// Calculated stats are added to every entity; descriptors are the union
    /// over all of them.
    pub fn load(&mut self, mut entities: Vec<Entity>) {
        for entity in &mut entities {
            (self.layout.calculate)(entity);
        }
        let labels: Vec<&str> = self.layout.identity.iter().map(|l| l.label).collect();
        self.descriptors = merge_descriptors(
            &entities,
            self.layout.stat_maps,
            &self.layout.allow,
            self.layout.namespace,
            &labels,
        );
        self.entities = entities;
        self.described = true;
    }

    fn identity_values(&self, entity: &Entity) -> Option<Vec<String>> {
        let mut values = Vec::with_capacity(self.layout.identity.len());
        for id in self.layout.identity {
            let found = id.sources.iter().find_map(|k| str_field(entity, k));
            match found {
                Some(v) => values.push(v.to_string()),
                None if id.required => return None,
                None => values.push(String::new()),
            }
        }
        Some(values)
    }

    fn stat(&self, entity: &Entity, raw_key: &str) -> Option<f64> {
        self.layout
            .stat_maps
            .iter()
            .filter_map(|m| entity.get(*m).and_then(|v| v.as_object()))
            .find_map(|stats| stats.get(raw_key))
            .and_then(stat_value)
    }

    /// Emit properties, stats and fields for every loaded entity.
    pub fn emit(&self, sink: &mut MetricSink) {
        if !self.described {
            return;
        }
        let ns = self.layout.namespace;
        let id_labels: Vec<&str> = self.layout.identity.iter().map(|l| l.label).collect();
        let prop_labels: Vec<&str> = self.layout.properties.iter().map(|p| p.label).collect();
        let prop_name = format!("{ns}_{PROPERTIES}");
        let prop_help = format!("Nutanix {ns} properties");

        let mut skipped = 0usize;
        for entity in &self.entities {
            let Some(ids) = self.identity_values(entity) else {
                skipped += 1;
                continue;
            };
            let id_values: Vec<&str> = ids.iter().map(String::as_str).collect();

            if !prop_labels.is_empty() {
                let props: Vec<String> = self
                    .layout
                    .properties
                    .iter()
                    .map(|p| p.render(entity))
                    .collect();
                let prop_values: Vec<&str> = props.iter().map(String::as_str).collect();
                sink.set_gauge(&prop_name, &prop_help, &prop_labels, &prop_values, 1.0);
            }

            for desc in &self.descriptors {
                if let Some(value) = self.stat(entity, &desc.raw_key) {
                    sink.set_gauge(&desc.fq_name(), &desc.help(), &id_labels, &id_values, value);
                }
            }

            for field in self.layout.fields {
                if let Some(value) = field.value(entity) {
                    let name = format!("{ns}_{}", field.name);
                    let help = format!("Nutanix {ns} field {}", field.name);
                    sink.set_gauge(&name, &help, &id_labels, &id_values, value);
                }
            }
        }

        if skipped > 0 {
            tracing::debug!(namespace = ns, skipped, "entities without identity skipped");
        }
    }
}
