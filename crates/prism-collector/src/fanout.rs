use crate::nics::{NicCollector, NicKind};
use crate::EntityCollector;
use prism_client::PrismClient;
use prism_common::MetricSink;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Per-parent NIC collectors of a host or VM collector.
///
/// Describe calls run concurrently, bounded by a semaphore sized to the
/// section's parallel request limit, and all of them are joined before
/// [`NicFanout::describe`] returns.
pub(crate) struct NicFanout {
    kind: NicKind,
    max_parallel: usize,
    nics: Vec<NicCollector>,
}

impl NicFanout {
    pub(crate) fn new(kind: NicKind, max_parallel: usize) -> Self {
        Self {
            kind,
            max_parallel: max_parallel.max(1),
            nics: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nics.len()
    }

    /// Rebuild one NIC collector per `(uuid, name)` parent and describe them all.
    pub(crate) async fn describe(
        &mut self,
        client: &Arc<PrismClient>,
        parents: Vec<(String, String)>,
    ) {
        self.nics.clear();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = Vec::with_capacity(parents.len());

        for (uuid, name) in parents {
            let sem = Arc::clone(&semaphore);
            let mut nic = NicCollector::new(Arc::clone(client), self.kind, uuid, name);
            tasks.push(tokio::spawn(async move {
                let _permit = match sem.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        tracing::error!(error = %e, "NIC semaphore closed");
                        return nic;
                    }
                };
                if let Err(e) = nic.describe().await {
                    tracing::warn!(
                        parent = nic.parent_uuid(),
                        collector = nic.name(),
                        error = %e,
                        "NIC discovery failed"
                    );
                }
                nic
            }));
        }

        for task in tasks {
            match task.await {
                Ok(nic) => self.nics.push(nic),
                Err(e) => tracing::error!("NIC describe task panicked: {}", e),
            }
        }
    }

    pub(crate) fn collect(&self, sink: &mut MetricSink) {
        for nic in &self.nics {
            nic.collect(sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use axum::{extract::Path, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn describe_is_bounded_and_joins_every_parent() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (cur, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let router = Router::new().route(
            "/PrismGateway/services/rest/v2.0/hosts/{uuid}/host_nics/",
            get(move |Path(uuid): Path<String>| {
                let (cur, max) = (Arc::clone(&cur), Arc::clone(&max));
                async move {
                    let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    cur.fetch_sub(1, Ordering::SeqCst);
                    Json(json!([{"uuid": format!("nic-{uuid}"), "stats": {"network.received_pkts": 1}}]))
                }
            }),
        );
        let client = testutil::client(testutil::serve(router).await);

        let mut fanout = NicFanout::new(NicKind::Host, 2);
        let parents = (0..6).map(|i| (format!("h{i}"), format!("host-{i}"))).collect();
        fanout.describe(&client, parents).await;

        assert_eq!(fanout.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);

        let mut sink = MetricSink::new();
        fanout.collect(&mut sink);
        let text = sink.render().unwrap();
        for i in 0..6 {
            assert!(text.contains(&format!("uuid=\"nic-h{i}\"")));
        }
    }
}
