use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::interval;

/// How often the config file is checked.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(60);

/// Tracks the config file between checks.
///
/// The first successful check only records the modification time. After
/// that, a changed mtime, or a file that reappears after being missing,
/// counts as a change.
#[derive(Debug, Default)]
pub struct ConfigWatch {
    missing: bool,
    modified: Option<SystemTime>,
}

impl ConfigWatch {
    pub fn new(missing: bool) -> Self {
        Self {
            missing,
            modified: None,
        }
    }

    /// Feed one observation; `None` means the file could not be stat'ed.
    pub fn observe(&mut self, modified: Option<SystemTime>) -> bool {
        let Some(modified) = modified else {
            self.missing = true;
            return false;
        };
        if self.missing || self.modified.is_some_and(|known| known != modified) {
            return true;
        }
        self.modified = Some(modified);
        false
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to stat config file");
            None
        }
    }
}

/// Resolve once the config file at `path` has changed.
pub async fn wait_for_change(path: PathBuf, initially_missing: bool, period: Duration) {
    let mut watch = ConfigWatch::new(initially_missing);
    let mut ticker = interval(period);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if watch.observe(modified_time(&path)) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> Option<SystemTime> {
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn first_observation_only_records() {
        let mut watch = ConfigWatch::new(false);
        assert!(!watch.observe(at(10)));
        assert!(!watch.observe(at(10)));
        assert!(watch.observe(at(11)));
    }

    #[test]
    fn missing_file_reappearing_is_a_change() {
        let mut watch = ConfigWatch::new(false);
        assert!(!watch.observe(at(10)));
        assert!(!watch.observe(None));
        assert!(watch.observe(at(10)));
    }

    #[test]
    fn initially_missing_file_triggers_on_creation() {
        let mut watch = ConfigWatch::new(true);
        assert!(!watch.observe(None));
        assert!(watch.observe(at(1)));
    }

    #[tokio::test]
    async fn created_file_ends_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exporter.toml");
        let waiter = tokio::spawn(wait_for_change(path.clone(), true, Duration::from_millis(20)));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!waiter.is_finished());
        std::fs::write(&path, "listen_address = \"127.0.0.1:0\"\n").unwrap();

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
