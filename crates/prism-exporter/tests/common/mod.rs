#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use prism_exporter::app;
use prism_exporter::config::ExporterConfig;
use prism_exporter::logging::LogLevels;
use prism_exporter::state::AppState;
use serde_json::json;
use tower::util::ServiceExt;

pub struct TestContext {
    pub state: AppState,
    pub app: Router,
}

pub struct TextResponse {
    pub status: StatusCode,
    pub body: String,
    pub content_type: Option<String>,
    pub trace_id: Option<String>,
}

pub fn build_test_context(config_toml: &str) -> Result<TestContext> {
    let config = ExporterConfig::parse(config_toml)?;
    let state = AppState::new(config, LogLevels::disabled());
    let app = app::build_http_app(state.clone());
    Ok(TestContext { state, app })
}

pub async fn get_text(app: &Router, uri: &str) -> TextResponse {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let resp = app.clone().oneshot(req).await.expect("request should run");
    let status = resp.status();
    let header_text = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let content_type = header_text(header::CONTENT_TYPE.as_str());
    let trace_id = header_text("x-trace-id");
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    TextResponse {
        status,
        body: String::from_utf8_lossy(&bytes).into_owned(),
        content_type,
        trace_id,
    }
}

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn serve_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// Config with a single `lab` section pointing at `base_url`.
pub fn section_config(base_url: &str, extra: &str) -> String {
    format!(
        "[sections.lab]\nnutanix_host = \"{base_url}\"\nnutanix_user = \"admin\"\nnutanix_password = \"secret\"\n{extra}"
    )
}

/// Value of the first sample line starting with `family`.
pub fn sample_value(text: &str, family: &str) -> Option<f64> {
    text.lines()
        .find(|line| line.starts_with(family) && !line.starts_with('#'))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|v| v.parse().ok())
}

const REST: &str = "/PrismGateway/services/rest";

/// A small but complete Prism endpoint: one of everything.
pub fn prism_router() -> Router {
    Router::new()
        .route(
            &format!("{REST}/v2.0/cluster/"),
            get(|| async {
                Json(json!({
                    "uuid": "c-1",
                    "name": "lab-cluster",
                    "operation_mode": "NORMAL",
                    "num_nodes": 3,
                    "stats": {
                        "controller_total_io_size_kbytes": "100",
                        "controller_total_read_io_size_kbytes": "40"
                    },
                    "usage_stats": {"storage.capacity_bytes": "1000"}
                }))
            }),
        )
        .route(
            &format!("{REST}/v2.0/hosts/"),
            get(|| async {
                Json(json!({
                    "metadata": {"end_index": 1, "grand_total_entities": 1},
                    "entities": [{
                        "uuid": "h-1",
                        "cluster_uuid": "c-1",
                        "name": "node-1",
                        "num_vms": 4,
                        "stats": {"hypervisor_cpu_usage_ppm": "120000"}
                    }]
                }))
            }),
        )
        .route(
            &format!("{REST}/v1/vms/"),
            get(|| async {
                Json(json!({
                    "metadata": {"endIndex": 1, "grandTotalEntities": 1},
                    "entities": [{
                        "uuid": "vm-1",
                        "vmName": "web",
                        "hostUuid": "h-1",
                        "powerState": "on",
                        "stats": {"hypervisor_cpu_usage_ppm": "5000"}
                    }]
                }))
            }),
        )
        .route(
            &format!("{REST}/v2.0/storage_containers/"),
            get(|| async {
                Json(json!({
                    "metadata": {"end_index": 1, "grand_total_entities": 1},
                    "entities": [{
                        "storage_container_uuid": "sc-1",
                        "cluster_uuid": "c-1",
                        "name": "default",
                        "usage_stats": {"storage.usage_bytes": "10"}
                    }]
                }))
            }),
        )
        .route(
            &format!("{REST}/v2.0/snapshots/"),
            get(|| async { Json(json!({"metadata": {"total_entities": 0}, "entities": []})) }),
        )
        .route(
            &format!("{REST}/v2.0/virtual_disks/"),
            get(|| async {
                Json(json!({
                    "metadata": {"end_index": 1, "grand_total_entities": 1},
                    "entities": [{
                        "uuid": "vd-1",
                        "attached_vm_uuid": "vm-1",
                        "stats": {"controller_num_read_io": "7"}
                    }]
                }))
            }),
        )
}
