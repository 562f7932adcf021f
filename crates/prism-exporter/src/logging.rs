use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::fmt::Write;
use std::sync::Mutex;
use std::time::Instant;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Crate-prefix directive shared by every `prism_*` target.
const LOG_TARGET: &str = "prism";

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Trace id of the current request, stored in request extensions and
/// attached to the scrape span.
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

/// Generate a 16-character hex trace ID (8 random bytes).
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let mut s = String::with_capacity(16);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Format elapsed time as a human-readable string.
fn format_elapsed(elapsed_us: u128) -> String {
    if elapsed_us < 1000 {
        format!("{elapsed_us}µs")
    } else if elapsed_us < 1_000_000 {
        format!("{}ms", elapsed_us / 1000)
    } else {
        format!("{:.1}s", elapsed_us as f64 / 1_000_000.0)
    }
}

/// `RUST_LOG` plus `prism=<level>`.
pub fn env_filter(level: &str) -> EnvFilter {
    let filter = EnvFilter::from_default_env();
    match format!("{LOG_TARGET}={level}").parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(e) => {
            tracing::warn!(level, error = %e, "ignoring invalid log level");
            filter
        }
    }
}

/// Applies a section's `log_level` to the running subscriber.
///
/// The filter is only reloaded when the requested level differs from the
/// one in effect. Without a handle (tests, embedded use) this is a no-op.
pub struct LogLevels {
    handle: Option<FilterHandle>,
    current: Mutex<String>,
}

impl LogLevels {
    pub fn new(handle: FilterHandle, initial: &str) -> Self {
        Self {
            handle: Some(handle),
            current: Mutex::new(initial.to_string()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            handle: None,
            current: Mutex::new("info".to_string()),
        }
    }

    pub fn apply(&self, level: &str) {
        let Some(handle) = &self.handle else {
            return;
        };
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if *current == level {
            return;
        }
        match handle.reload(env_filter(level)) {
            Ok(()) => {
                tracing::info!(from = %current, to = level, "log level changed");
                *current = level.to_string();
            }
            Err(e) => tracing::warn!(level, error = %e, "failed to reload log filter"),
        }
    }

    pub fn current(&self) -> String {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Request/response logging middleware.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let uri = req.uri().clone();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    tracing::info!(
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        ua = %user_agent,
        "--> request"
    );

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status();

    let status_code = status.as_u16();
    if status.is_server_error() {
        tracing::error!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, "<-- response");
    } else if status.is_client_error() {
        tracing::warn!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, "<-- response");
    } else {
        tracing::info!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, "<-- response");
    }

    if let Ok(v) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("X-Trace-Id", v);
    }
    response
}
