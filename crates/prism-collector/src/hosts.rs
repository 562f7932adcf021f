use crate::calc;
use crate::fanout::NicFanout;
use crate::nics::NicKind;
use crate::schema::AllowList;
use crate::table::{Convert, Field, IdentityLabel, Layout, Property, StatTable};
use crate::EntityCollector;
use prism_client::{ApiVersion, PrismClient};
use prism_common::entity::str_field;
use prism_common::{Entity, MetricSink};
use std::sync::Arc;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const HZ_PER_MHZ: f64 = 1_000_000.0;

fn host_calculations(host: &mut Entity) {
    calc::add_write_io_size(host);
    calc::add_memory_stats(host, &["memory_capacity_in_bytes"]);
}

static HOST_LAYOUT: Layout = Layout {
    namespace: "nutanix_hosts",
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
        calc::MEMORY_USAGE_BYTES,
        calc::MEMORY_FREE_BYTES,
    ]),
    identity: &[
        IdentityLabel::required("uuid", &["uuid"]),
        IdentityLabel::optional("cluster_uuid", &["cluster_uuid"]),
    ],
    properties: &[
        Property::text("uuid"),
        Property::text("cluster_uuid"),
        Property::text("name"),
        Property::text("host_type"),
        Property::text("hypervisor_address"),
        Property::text("serial"),
        Property::text("hypervisor_full_name"),
        Property::converted("num_vms", "num_vms", Convert::Integer),
        Property::converted("num_cpu_cores", "num_cpu_cores", Convert::Integer),
        Property::converted("num_cpu_sockets", "num_cpu_sockets", Convert::Integer),
        Property::converted("num_cpu_threads", "num_cpu_threads", Convert::Integer),
        Property::converted("cpu_frequency_in_mhz", "cpu_frequency_in_hz", Convert::Scaled(HZ_PER_MHZ)),
        Property::converted("cpu_capacity_in_mhz", "cpu_capacity_in_hz", Convert::Scaled(HZ_PER_MHZ)),
        Property::converted("memory_capacity_in_mb", "memory_capacity_in_bytes", Convert::Scaled(BYTES_PER_MB)),
        Property::text("block_model_name"),
    ],
    fields: &[
        Field::number("num_vms"),
        Field::number("num_cpu_cores"),
        Field::number("num_cpu_sockets"),
        Field::number("num_cpu_threads"),
        Field::number("cpu_frequency_in_hz"),
        Field::number("cpu_capacity_in_hz"),
        Field::number("memory_capacity_in_bytes"),
        Field::number("boot_time_in_usecs"),
    ],
    calculate: host_calculations,
};

/// Hypervisor hosts (v2 `hosts/`, paged), optionally with their NICs.
pub struct HostsCollector {
    client: Arc<PrismClient>,
    table: StatTable,
    nics: Option<NicFanout>,
}

impl HostsCollector {
    pub fn new(client: Arc<PrismClient>, collect_nics: bool, max_parallel: usize) -> Self {
        Self {
            client,
            table: StatTable::new(&HOST_LAYOUT),
            nics: collect_nics.then(|| NicFanout::new(NicKind::Host, max_parallel)),
        }
    }
}

#[async_trait::async_trait]
impl EntityCollector for HostsCollector {
    fn name(&self) -> &str {
        "hosts"
    }

    async fn describe(&mut self) -> prism_client::Result<()> {
        self.table.reset();
        let hosts = self.client.fetch_all_pages(ApiVersion::V2, "hosts", &[]).await?;
        tracing::debug!(hosts = hosts.len(), "host discovery done");
        self.table.load(hosts);

        if let Some(nics) = self.nics.as_mut() {
            let parents = self
                .table
                .entities()
                .iter()
                .filter_map(|h| {
                    let uuid = str_field(h, "uuid")?;
                    let name = str_field(h, "name").unwrap_or_default();
                    Some((uuid.to_string(), name.to_string()))
                })
                .collect();
            nics.describe(&self.client, parents).await;
        }
        Ok(())
    }

    fn collect(&self, sink: &mut MetricSink) {
        self.table.emit(sink);
        if let Some(nics) = &self.nics {
            nics.collect(sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    fn router() -> Router {
        Router::new()
            .route(
                "/PrismGateway/services/rest/v2.0/hosts/",
                get(|| async {
                    Json(json!({
                        "metadata": {"end_index": 1, "grand_total_entities": 1},
                        "entities": [{
                            "uuid": "h1",
                            "cluster_uuid": "c1",
                            "name": "node-1",
                            "num_vms": 12,
                            "cpu_frequency_in_hz": 2_600_000_000u64,
                            "memory_capacity_in_bytes": 4_294_967_296u64,
                            "stats": {
                                "hypervisor_memory_usage_ppm": "250000",
                                "hypervisor_cpu_usage_ppm": "-1"
                            }
                        }]
                    }))
                }),
            )
            .route(
                "/PrismGateway/services/rest/v2.0/hosts/h1/host_nics/",
                get(|| async {
                    Json(json!([{"uuid": "nic-1", "stats": {"network.received_bytes": 5}}]))
                }),
            )
    }

    #[tokio::test]
    async fn hosts_emit_converted_properties_and_memory_stats() {
        let client = testutil::client(testutil::serve(router()).await);
        let mut collector = HostsCollector::new(client, false, 4);
        collector.describe().await.unwrap();
        let text = testutil::render(&collector).await;

        assert!(text.contains("cpu_frequency_in_mhz=\"2600\""));
        assert!(text.contains("memory_capacity_in_mb=\"4096\""));
        assert!(text.contains("num_vms=\"12\""));
        assert!(text.contains("nutanix_hosts_memory_usage_bytes{cluster_uuid=\"c1\",uuid=\"h1\"} 1073741824"));
        assert!(text.contains("nutanix_hosts_memory_free_bytes{cluster_uuid=\"c1\",uuid=\"h1\"} 3221225472"));
        assert!(text.contains("nutanix_hosts_num_vms{cluster_uuid=\"c1\",uuid=\"h1\"} 12"));
        assert!(!text.contains("nutanix_hosts_hypervisor_cpu_usage_ppm{"));
        assert!(!text.contains("nutanix_hosts_network"));
    }

    #[tokio::test]
    async fn host_nics_are_collected_when_enabled() {
        let client = testutil::client(testutil::serve(router()).await);
        let mut collector = HostsCollector::new(client, true, 4);
        collector.describe().await.unwrap();
        let text = testutil::render(&collector).await;

        assert!(text.contains(
            "nutanix_hosts_network_network_received_bytes{host_uuid=\"h1\",uuid=\"nic-1\"} 5"
        ));
    }
}
