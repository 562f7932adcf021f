use crate::config::DEFAULT_SECTION;
use crate::logging::{self, TraceId};
use crate::scrape::scrape;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};
use serde::Deserialize;
use tracing::Instrument;

const LANDING_PAGE: &str = r#"<html>
<head><title>Nutanix Exporter</title></head>
<body>
<h1>Nutanix Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>"#;

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub section: Option<String>,
    pub health: Option<String>,
}

impl MetricsQuery {
    fn section(&self) -> &str {
        match self.section.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => DEFAULT_SECTION,
        }
    }

    fn health_only(&self) -> bool {
        self.health.as_deref() == Some("true")
    }
}

async fn metrics(
    State(state): State<AppState>,
    trace_id: Option<Extension<TraceId>>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let section = query.section();
    let trace_id = trace_id.map(|Extension(id)| id.0).unwrap_or_default();
    let span = tracing::info_span!("scrape", trace_id = %trace_id, section);
    match scrape(&state, section, query.health_only()).instrument(span).await {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::error!(section, error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(logging::request_logging))
        .with_state(state)
}
