//! Per-request collection: section lookup, overlap guard, collector
//! describe/collect and health bookkeeping.

use crate::config::SectionConfig;
use crate::state::AppState;
use prism_client::PrismClient;
use prism_collector::build_collectors;
use prism_common::{HealthExporter, MetricSink};
use std::sync::Arc;

/// `uuid`/`cluster_uuid` label value for `health=true` requests.
pub const HEALTH_ONLY_UUID: &str = "exporter-health";

/// Run one scrape for `section` and render it in the Prometheus text format.
///
/// Never contacts Prism when `health_only` is set, when the section is not
/// configured, or when another scrape of the same section is still running.
pub async fn scrape(state: &AppState, section: &str, health_only: bool) -> prometheus::Result<String> {
    let mut sink = MetricSink::new();

    if health_only {
        HealthExporter::new(section, HEALTH_ONLY_UUID, HEALTH_ONLY_UUID).collect(&state.health, &mut sink);
        return sink.render();
    }

    let Some(config) = state.config.section(section) else {
        tracing::warn!(section, "section not configured, serving health only");
        HealthExporter::new(section, section, section).collect(&state.health, &mut sink);
        return sink.render();
    };

    let Some(collection) = state.health.begin_collection(section) else {
        tracing::warn!(section, "previous collection still running, serving health only");
        let uuid = state
            .cluster_uuids
            .get(section)
            .unwrap_or_else(|| section.to_string());
        HealthExporter::new(section, uuid.clone(), uuid).collect(&state.health, &mut sink);
        return sink.render();
    };

    // dropping this future before `finish` ends the collection as failed
    let (success, uuid) = collect_section(state, section, config, &mut sink).await;
    let elapsed = collection.finish(success);
    tracing::info!(
        section,
        success,
        elapsed_ms = elapsed.as_millis() as u64,
        "collection finished"
    );

    HealthExporter::new(section, uuid.clone(), uuid).collect(&state.health, &mut sink);
    sink.render()
}

/// Returns whether every collector described cleanly, and the uuid label to
/// attach to the section's health series.
async fn collect_section(
    state: &AppState,
    section: &str,
    config: &SectionConfig,
    sink: &mut MetricSink,
) -> (bool, String) {
    state.log_levels.apply(config.log_directive());

    let client = match PrismClient::new(config.client_settings(section), Arc::clone(&state.health)) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(section, error = %e, "cannot create Prism client");
            return (false, section.to_string());
        }
    };

    let uuid = resolve_cluster_uuid(state, section, &client).await;

    let options = config.to_collect_options();
    let mut collectors = build_collectors(client, &options);
    tracing::debug!(section, collectors = collectors.len(), "collectors registered");

    let mut success = true;
    for collector in collectors.iter_mut() {
        if let Err(e) = collector.describe().await {
            tracing::warn!(section, collector = collector.name(), error = %e, "describe failed");
            success = false;
        }
    }
    for collector in &collectors {
        collector.collect(sink);
    }
    (success, uuid)
}

async fn resolve_cluster_uuid(state: &AppState, section: &str, client: &PrismClient) -> String {
    if let Some(uuid) = state.cluster_uuids.get(section) {
        return uuid;
    }
    match client.cluster_uuid().await {
        Ok(uuid) => {
            tracing::info!(section, cluster_uuid = %uuid, "cached cluster uuid");
            state.cluster_uuids.insert(section, uuid)
        }
        Err(e) => {
            tracing::warn!(section, error = %e, "cluster uuid unavailable, using section name");
            section.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterConfig;
    use crate::logging::LogLevels;

    fn state(toml: &str) -> AppState {
        AppState::new(ExporterConfig::parse(toml).unwrap(), LogLevels::disabled())
    }

    #[tokio::test]
    async fn health_only_never_marks_a_collection() {
        let state = state("");
        let text = scrape(&state, "default", true).await.unwrap();
        assert!(text.contains(
            "nutanix_exporter_TotalPollCycles_C{cluster_uuid=\"exporter-health\",section=\"default\",uuid=\"exporter-health\"} 0"
        ));
        assert_eq!(state.health.snapshot("default").total_poll_cycles, 0);
    }

    #[tokio::test]
    async fn unknown_section_uses_section_as_uuid() {
        let state = state("");
        let text = scrape(&state, "nowhere", false).await.unwrap();
        assert!(text.contains("section=\"nowhere\",uuid=\"nowhere\""));
        assert!(!text.contains("nutanix_cluster"));
        assert_eq!(state.health.snapshot("nowhere").total_poll_cycles, 0);
    }

    #[tokio::test]
    async fn running_collection_rejects_overlap() {
        let state = state(
            r#"
[sections.lab]
nutanix_host = "http://127.0.0.1:1"
"#,
        );
        state.cluster_uuids.insert("lab", "c-9".into());
        assert!(state.health.mark_collection_start("lab"));

        let text = scrape(&state, "lab", false).await.unwrap();
        assert!(text.contains(
            "nutanix_exporter_ErrorPCNoDataCollectionStillRunning_C{cluster_uuid=\"c-9\",section=\"lab\",uuid=\"c-9\"} 1"
        ));
        assert_eq!(state.health.snapshot("lab").success_device_cmd, 0);
        assert_eq!(state.health.snapshot("lab").failure_device_cmd, 0);
    }

    #[tokio::test]
    async fn cancelled_scrape_releases_the_section() {
        use axum::routing::get;
        use std::time::Duration;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = axum::Router::new().fallback(get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "{}"
        }));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let state = state(&format!("[sections.lab]\nnutanix_host = \"http://{addr}\"\n"));

        let cut = tokio::time::timeout(Duration::from_millis(200), scrape(&state, "lab", false)).await;
        assert!(cut.is_err());

        let snap = state.health.snapshot("lab");
        assert_eq!(snap.active_collections, 0);
        assert_eq!(snap.total_poll_cycles, 1);
        assert_eq!(snap.failed_collections, 1);
        assert!(state.health.mark_collection_start("lab"));
    }

    #[tokio::test]
    async fn unreachable_upstream_records_a_failed_cycle() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let state = state(&format!(
            "[sections.lab]\nnutanix_host = \"http://{addr}\"\ntimeout_secs = 2\n\n[sections.lab.collect]\nhosts = false\nvms = false\nstorage_containers = false\nsnapshots = false\nvirtual_disks = false\n"
        ));

        let text = scrape(&state, "lab", false).await.unwrap();
        let snap = state.health.snapshot("lab");
        assert_eq!(snap.total_poll_cycles, 1);
        assert_eq!(snap.failed_collections, 1);
        assert_eq!(snap.failure_device_cmd, 2);
        assert!(state.cluster_uuids.get("lab").is_none());
        assert!(text.contains("section=\"lab\",uuid=\"lab\""));
        assert!(!text.contains("nutanix_cluster_"));
    }
}
