pub mod calc;
pub mod cluster;
mod fanout;
pub mod hosts;
pub mod nics;
pub mod schema;
pub mod snapshots;
pub mod storage;
pub mod table;
pub mod vdisks;
pub mod vms;

pub use cluster::ClusterCollector;
pub use hosts::HostsCollector;
pub use nics::{NicCollector, NicKind};
pub use schema::{derive_descriptors, merge_descriptors, AllowList, MetricDesc};
pub use snapshots::SnapshotsCollector;
pub use storage::StorageContainersCollector;
pub use vdisks::VirtualDisksCollector;
pub use vms::VmsCollector;

use prism_client::PrismClient;
use prism_common::MetricSink;
use std::sync::Arc;

/// Default bound on concurrent NIC discovery calls per scrape.
pub const DEFAULT_MAX_PARALLEL_REQUESTS: usize = 10;

/// One entity type exported from a Prism endpoint.
///
/// `describe` fetches live state and derives this scrape's descriptors;
/// `collect` emits what was described. A collector that was never described,
/// or whose describe failed, emits nothing.
#[async_trait::async_trait]
pub trait EntityCollector: Send + Sync {
    fn name(&self) -> &str;

    async fn describe(&mut self) -> prism_client::Result<()>;

    fn collect(&self, sink: &mut MetricSink);
}

/// Which collectors run for a section.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub cluster: bool,
    pub hosts: bool,
    pub vms: bool,
    pub storage_containers: bool,
    pub snapshots: bool,
    pub virtual_disks: bool,
    pub host_nics: bool,
    pub vm_nics: bool,
    pub max_parallel_requests: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            cluster: true,
            hosts: true,
            vms: true,
            storage_containers: true,
            snapshots: true,
            virtual_disks: true,
            host_nics: false,
            vm_nics: false,
            max_parallel_requests: DEFAULT_MAX_PARALLEL_REQUESTS,
        }
    }
}

/// Build the enabled collectors, in emission order.
pub fn build_collectors(
    client: Arc<PrismClient>,
    options: &CollectOptions,
) -> Vec<Box<dyn EntityCollector>> {
    let parallel = options.max_parallel_requests.max(1);
    let mut collectors: Vec<Box<dyn EntityCollector>> = Vec::new();
    if options.cluster {
        collectors.push(Box::new(ClusterCollector::new(Arc::clone(&client))));
    }
    if options.hosts {
        collectors.push(Box::new(HostsCollector::new(
            Arc::clone(&client),
            options.host_nics,
            parallel,
        )));
    }
    if options.vms {
        collectors.push(Box::new(VmsCollector::new(
            Arc::clone(&client),
            options.vm_nics,
            parallel,
        )));
    }
    if options.storage_containers {
        collectors.push(Box::new(StorageContainersCollector::new(Arc::clone(&client))));
    }
    if options.snapshots {
        collectors.push(Box::new(SnapshotsCollector::new(Arc::clone(&client))));
    }
    if options.virtual_disks {
        collectors.push(Box::new(VirtualDisksCollector::new(client)));
    }
    collectors
}

#[cfg(test)]
pub(crate) mod testutil {
    use axum::Router;
    use prism_client::{ClientSettings, PrismClient};
    use prism_common::{Entity, HealthRegistry};
    use std::sync::Arc;
    use std::time::Duration;

    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub fn client(base_url: String) -> Arc<PrismClient> {
        Arc::new(
            PrismClient::new(
                ClientSettings {
                    base_url,
                    username: "admin".into(),
                    password: "secret".into(),
                    section: "test".into(),
                    timeout: Duration::from_secs(5),
                },
                Arc::new(HealthRegistry::new()),
            )
            .unwrap(),
        )
    }

    /// A client pointed at a closed port, for discovery-failure paths.
    pub fn dead_client() -> Arc<PrismClient> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        client(format!("http://{addr}"))
    }

    pub fn entity(v: serde_json::Value) -> Entity {
        v.as_object().cloned().unwrap()
    }

    pub async fn render(collector: &dyn super::EntityCollector) -> String {
        let mut sink = prism_common::MetricSink::new();
        collector.collect(&mut sink);
        sink.render().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_enable_all_but_nics() {
        let client = testutil::dead_client();
        let names: Vec<String> = build_collectors(client, &CollectOptions::default())
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["cluster", "hosts", "vms", "storage_containers", "snapshots", "virtual_disks"]
        );
    }

    #[test]
    fn disabled_collectors_are_not_built() {
        let options = CollectOptions {
            hosts: false,
            snapshots: false,
            ..CollectOptions::default()
        };
        let names: Vec<String> = build_collectors(testutil::dead_client(), &options)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert!(!names.contains(&"hosts".to_string()));
        assert!(!names.contains(&"snapshots".to_string()));
        assert_eq!(names.len(), 4);
    }
}
