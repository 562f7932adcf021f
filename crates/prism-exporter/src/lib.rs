//! HTTP front end of the Prism exporter: configuration, the `/metrics`
//! route and the per-scrape orchestration around `prism-collector`.

pub mod app;
pub mod config;
pub mod logging;
pub mod scrape;
pub mod state;
pub mod watch;
