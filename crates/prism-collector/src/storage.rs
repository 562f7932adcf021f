use crate::calc;
use crate::schema::AllowList;
use crate::table::{IdentityLabel, Layout, Property, StatTable};
use crate::EntityCollector;
use prism_client::{ApiVersion, PrismClient};
use prism_common::MetricSink;
use std::sync::Arc;

static STORAGE_CONTAINER_LAYOUT: Layout = Layout {
    namespace: "nutanix_storage_containers",
    stat_maps: &["stats", "usage_stats"],
    allow: AllowList::new(&[
        "storage.usage_bytes",
        "storage.capacity_bytes",
        "storage.logical_usage_bytes",
        "storage.container_reserved_capacity_bytes",
        "controller_total_read_io_size_kbytes",
        "controller_total_io_size_kbytes",
        "controller_num_read_iops",
        "controller_num_write_iops",
        "controller_avg_read_io_latency_usecs",
        "controller_avg_write_io_latency_usecs",
        calc::TOTAL_WRITE_IO_SIZE,
    ]),
    identity: &[
        IdentityLabel::required("storage_container_uuid", &["storage_container_uuid"]),
        IdentityLabel::optional("cluster_uuid", &["cluster_uuid"]),
    ],
    properties: &[
        Property::text("storage_container_uuid"),
        Property::text("cluster_uuid"),
        Property::text("name"),
        Property::text("replication_factor"),
        Property::text("compression_enabled"),
        Property::text("max_capacity"),
    ],
    fields: &[],
    calculate: calc::add_write_io_size,
};

/// Storage containers (v2 `storage_containers/`, paged).
pub struct StorageContainersCollector {
    client: Arc<PrismClient>,
    table: StatTable,
}

impl StorageContainersCollector {
    pub fn new(client: Arc<PrismClient>) -> Self {
        Self {
            client,
            table: StatTable::new(&STORAGE_CONTAINER_LAYOUT),
        }
    }
}

#[async_trait::async_trait]
impl EntityCollector for StorageContainersCollector {
    fn name(&self) -> &str {
        "storage_containers"
    }

    async fn describe(&mut self) -> prism_client::Result<()> {
        self.table.reset();
        let containers = self
            .client
            .fetch_all_pages(ApiVersion::V2, "storage_containers", &[])
            .await?;
        self.table.load(containers);
        Ok(())
    }

    fn collect(&self, sink: &mut MetricSink) {
        self.table.emit(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    #[tokio::test]
    async fn containers_are_labeled_by_container_and_cluster() {
        let router = Router::new().route(
            "/PrismGateway/services/rest/v2.0/storage_containers/",
            get(|| async {
                Json(json!({
                    "metadata": {"end_index": 1, "grand_total_entities": 1},
                    "entities": [{
                        "storage_container_uuid": "sc-1",
                        "cluster_uuid": "c1",
                        "name": "default-container",
                        "replication_factor": 2,
                        "compression_enabled": true,
                        "stats": {
                            "controller_total_io_size_kbytes": "10",
                            "controller_total_read_io_size_kbytes": "-5"
                        },
                        "usage_stats": {"storage.usage_bytes": "512"}
                    }]
                }))
            }),
        );
        let mut collector =
            StorageContainersCollector::new(testutil::client(testutil::serve(router).await));
        collector.describe().await.unwrap();
        let text = testutil::render(&collector).await;

        assert!(text.contains(
            "nutanix_storage_containers_controller_total_write_io_size_kbytes{cluster_uuid=\"c1\",storage_container_uuid=\"sc-1\"} 10"
        ));
        assert!(text.contains(
            "nutanix_storage_containers_storage_usage_bytes{cluster_uuid=\"c1\",storage_container_uuid=\"sc-1\"} 512"
        ));
        assert!(text.contains("compression_enabled=\"true\""));
        assert!(text.contains("replication_factor=\"2\""));
    }
}
