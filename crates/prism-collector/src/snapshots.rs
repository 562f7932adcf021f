use crate::EntityCollector;
use prism_client::{ApiVersion, PrismClient};
use prism_common::entity::{entities_from_body, object_field, str_field};
use prism_common::{stat_value, value_to_f64, Entity, MetricSink};
use serde_json::Value;
use std::sync::Arc;

const NAMESPACE: &str = "nutanix_snapshots";
const SNAPSHOT_LABELS: [&str; 4] = ["snapshot_uuid", "snapshot_name", "vm_uuid", "vm_name"];
const FIELDS: [&str; 1] = ["created_time"];

/// VM snapshots (v2 `snapshots/`): a total count plus per-snapshot fields.
pub struct SnapshotsCollector {
    client: Arc<PrismClient>,
    total: Option<f64>,
    snapshots: Vec<Entity>,
    described: bool,
}

impl SnapshotsCollector {
    pub fn new(client: Arc<PrismClient>) -> Self {
        Self {
            client,
            total: None,
            snapshots: Vec::new(),
            described: false,
        }
    }
}

/// `[uuid, name, vm_uuid, vm_name]`, or `None` if any is missing.
fn snapshot_labels(snapshot: &Entity) -> Option<[&str; 4]> {
    let vm_name = object_field(snapshot, "vm_create_spec").and_then(|spec| str_field(spec, "name"))?;
    Some([
        str_field(snapshot, "uuid")?,
        str_field(snapshot, "snapshot_name")?,
        str_field(snapshot, "vm_uuid")?,
        vm_name,
    ])
}

#[async_trait::async_trait]
impl EntityCollector for SnapshotsCollector {
    fn name(&self) -> &str {
        "snapshots"
    }

    async fn describe(&mut self) -> prism_client::Result<()> {
        self.total = None;
        self.snapshots.clear();
        self.described = false;

        let body = self.client.get(ApiVersion::V2, "snapshots", &[]).await?;
        self.total = body
            .get("metadata")
            .and_then(|m| m.get("total_entities"))
            .and_then(value_to_f64);
        self.snapshots = match body {
            Value::Object(_) => entities_from_body(body),
            other => {
                tracing::warn!(body = %other, "snapshots response is not an object");
                Vec::new()
            }
        };
        self.described = true;
        Ok(())
    }

    fn collect(&self, sink: &mut MetricSink) {
        if !self.described {
            return;
        }
        if let Some(total) = self.total {
            sink.set_gauge(
                &format!("{NAMESPACE}_total"),
                "Count Snapshots on the cluster",
                &[],
                &[],
                total,
            );
        }

        for snapshot in &self.snapshots {
            let Some(labels) = snapshot_labels(snapshot) else {
                tracing::debug!("snapshot without identity skipped");
                continue;
            };
            for field in FIELDS {
                if let Some(value) = snapshot.get(field).and_then(stat_value) {
                    sink.set_gauge(
                        &format!("{NAMESPACE}_{field}"),
                        &format!("Nutanix snapshot field {field}"),
                        &SNAPSHOT_LABELS,
                        &labels,
                        value,
                    );
                }
            }
        }
    }
}
