use crate::calc;
use crate::schema::AllowList;
use crate::table::{Field, IdentityLabel, Layout, Property, StatTable};
use crate::EntityCollector;
use prism_client::{ApiVersion, PrismClient};
use prism_common::entity::str_field;
use prism_common::{Entity, MetricSink};
use serde_json::Value;
use std::sync::Arc;

pub const HEALTH_STATUS: &str = "nutanix_cluster_health_status";

static CLUSTER_LAYOUT: Layout = Layout {
    namespace: "nutanix_cluster",
    stat_maps: &["stats", "usage_stats"],
    allow: AllowList::new(&[
        "storage.capacity_bytes",
        "storage.usage_bytes",
        "storage.logical_usage_bytes",
        "controller_total_read_io_size_kbytes",
        "controller_total_io_size_kbytes",
        "controller_num_read_io",
        "controller_num_write_io",
        "controller_avg_read_io_latency_usecs",
        "controller_avg_write_io_latency_usecs",
        "hypervisor_cpu_usage_ppm",
        "cpu_capacity_in_hz",
        "hypervisor_memory_usage_ppm",
        "hypervisor_num_received_bytes",
        "hypervisor_num_transmitted_bytes",
        calc::TOTAL_WRITE_IO_SIZE,
    ]),
    identity: &[IdentityLabel::required("uuid", &["uuid"])],
    properties: &[
        Property::text("uuid"),
        Property::text("name"),
        Property::text("cluster_external_ipaddress"),
        Property::text("version"),
    ],
    fields: &[Field::number("num_nodes")],
    calculate: calc::add_write_io_size,
};

/// Overall cluster health: 0 OK, 1 warning, 2 critical, 3 unknown.
///
/// `operation_mode` NORMAL with no `status` field counts as OK. Only an
/// explicit status other than ONLINE downgrades a NORMAL cluster to warning.
pub fn health_status(cluster: &Entity) -> f64 {
    let mode = str_field(cluster, "operation_mode").map(str::to_ascii_uppercase);
    let status = str_field(cluster, "status").map(str::to_ascii_uppercase);

    if status.as_deref() == Some("OFFLINE") {
        return 2.0;
    }
    match (mode.as_deref(), status.as_deref()) {
        (None, None) => 3.0,
        (Some("NORMAL"), None | Some("ONLINE")) => 0.0,
        (None, Some("ONLINE")) => 0.0,
        _ => 1.0,
    }
}

/// The cluster behind the endpoint (v2 `cluster/`).
pub struct ClusterCollector {
    client: Arc<PrismClient>,
    table: StatTable,
}

impl ClusterCollector {
    pub fn new(client: Arc<PrismClient>) -> Self {
        Self {
            client,
            table: StatTable::new(&CLUSTER_LAYOUT),
        }
    }
}

#[async_trait::async_trait]
impl EntityCollector for ClusterCollector {
    fn name(&self) -> &str {
        "cluster"
    }

    async fn describe(&mut self) -> prism_client::Result<()> {
        self.table.reset();
        let body = self.client.get(ApiVersion::V2, "cluster", &[]).await?;
        match body {
            Value::Object(cluster) => self.table.load(vec![cluster]),
            other => {
                tracing::warn!(body = %other, "cluster response is not an object");
                self.table.load(Vec::new());
            }
        }
        Ok(())
    }

    fn collect(&self, sink: &mut MetricSink) {
        self.table.emit(sink);
        for cluster in self.table.entities() {
            let Some(uuid) = str_field(cluster, "uuid") else {
                continue;
            };
            let name = str_field(cluster, "name").unwrap_or_default();
            sink.set_gauge(
                HEALTH_STATUS,
                "Overall health status of the Nutanix cluster (0=OK,1=Warning,2=Critical,3=Unknown)",
                &["uuid", "cluster_name"],
                &[uuid, name],
                health_status(cluster),
            );
        }
    }
}
