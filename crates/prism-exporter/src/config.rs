use prism_client::{ClientSettings, DEFAULT_TIMEOUT};
use prism_collector::{CollectOptions, DEFAULT_MAX_PARALLEL_REQUESTS};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Section used when a scrape names none.
pub const DEFAULT_SECTION: &str = "default";

pub const ENV_URL: &str = "NUTANIX_URL";
pub const ENV_USERNAME: &str = "NUTANIX_USERNAME";
pub const ENV_PASSWORD: &str = "NUTANIX_PASSWORD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default)]
    pub sections: BTreeMap<String, SectionConfig>,
    /// Set when the config file was absent and the `default` section came
    /// from the environment.
    #[serde(skip)]
    pub file_missing: bool,
}

/// One Prism endpoint, selected per scrape with `?section=<name>`.
#[derive(Debug, Clone, Deserialize)]
pub struct SectionConfig {
    pub nutanix_host: String,
    #[serde(default)]
    pub nutanix_user: String,
    #[serde(default)]
    pub nutanix_password: String,
    /// `debug`, `trace`, anything else means `info`.
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default = "default_max_parallel_requests")]
    pub max_parallel_requests: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub collect: HashMap<String, bool>,
}

fn default_listen_address() -> String {
    "0.0.0.0:9405".to_string()
}

fn default_max_parallel_requests() -> usize {
    DEFAULT_MAX_PARALLEL_REQUESTS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl ExporterConfig {
    /// Load the TOML file at `path`, or fall back to an environment-built
    /// `default` section when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using environment");
                return Ok(Self::from_lookup(|key| std::env::var(key).ok()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let section = SectionConfig {
            nutanix_host: lookup(ENV_URL).unwrap_or_default(),
            nutanix_user: lookup(ENV_USERNAME).unwrap_or_default(),
            nutanix_password: lookup(ENV_PASSWORD).unwrap_or_default(),
            log_level: None,
            max_parallel_requests: default_max_parallel_requests(),
            timeout_secs: default_timeout_secs(),
            collect: HashMap::new(),
        };
        Self {
            listen_address: default_listen_address(),
            sections: BTreeMap::from([(DEFAULT_SECTION.to_string(), section)]),
            file_missing: true,
        }
    }

    pub fn section(&self, name: &str) -> Option<&SectionConfig> {
        self.sections.get(name)
    }
}

impl SectionConfig {
    fn enabled(&self, feature: &str, default: bool) -> bool {
        self.collect.get(feature).copied().unwrap_or(default)
    }

    /// Entity groups default to on, NIC groups to off.
    pub fn to_collect_options(&self) -> CollectOptions {
        CollectOptions {
            cluster: self.enabled("cluster", true),
            hosts: self.enabled("hosts", true),
            vms: self.enabled("vms", true),
            storage_containers: self.enabled("storage_containers", true),
            snapshots: self.enabled("snapshots", true),
            virtual_disks: self.enabled("virtual_disks", true),
            host_nics: self.enabled("hostnics", false),
            vm_nics: self.enabled("vmnics", false),
            max_parallel_requests: if self.max_parallel_requests == 0 {
                DEFAULT_MAX_PARALLEL_REQUESTS
            } else {
                self.max_parallel_requests
            },
        }
    }

    pub fn client_settings(&self, section: &str) -> ClientSettings {
        ClientSettings {
            base_url: self.nutanix_host.clone(),
            username: self.nutanix_user.clone(),
            password: self.nutanix_password.clone(),
            section: section.to_string(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }

    /// Tracing directive for this section's `log_level`.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("debug") => "debug",
            Some("trace") => "trace",
            _ => "info",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
listen_address = "127.0.0.1:9000"

[sections.default]
nutanix_host = "https://prism.local:9440"
nutanix_user = "admin"
nutanix_password = "secret"

[sections.lab]
nutanix_host = "https://lab.local:9440"
log_level = "DEBUG"
max_parallel_requests = 3
timeout_secs = 2

[sections.lab.collect]
vms = false
hostnics = true
"#;

    #[test]
    fn parse_sections_with_defaults() {
        let config = ExporterConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert!(!config.file_missing);

        let default = config.section("default").unwrap();
        assert_eq!(default.nutanix_user, "admin");
        assert_eq!(default.timeout_secs, 10);
        assert_eq!(default.max_parallel_requests, DEFAULT_MAX_PARALLEL_REQUESTS);
        assert_eq!(default.log_directive(), "info");

        let lab = config.section("lab").unwrap();
        assert_eq!(lab.log_directive(), "debug");
        assert_eq!(lab.client_settings("lab").timeout, Duration::from_secs(2));
        assert!(config.section("missing").is_none());
    }

    #[test]
    fn collect_flags_default_on_except_nics() {
        let config = ExporterConfig::parse(SAMPLE).unwrap();

        let default = config.section("default").unwrap().to_collect_options();
        assert!(default.cluster && default.hosts && default.vms);
        assert!(default.storage_containers && default.snapshots && default.virtual_disks);
        assert!(!default.host_nics);
        assert!(!default.vm_nics);

        let lab = config.section("lab").unwrap().to_collect_options();
        assert!(!lab.vms);
        assert!(lab.host_nics);
        assert!(!lab.vm_nics);
        assert_eq!(lab.max_parallel_requests, 3);
    }

    #[test]
    fn empty_file_uses_listen_default() {
        let config = ExporterConfig::parse("").unwrap();
        assert_eq!(config.listen_address, "0.0.0.0:9405");
        assert!(config.sections.is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_environment() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExporterConfig::load(dir.path().join("absent.toml")).unwrap();
        assert!(config.file_missing);
        assert!(config.section(DEFAULT_SECTION).is_some());
    }

    #[test]
    fn environment_lookup_fills_default_section() {
        let config = ExporterConfig::from_lookup(|key| match key {
            ENV_URL => Some("https://env.local:9440".to_string()),
            ENV_USERNAME => Some("viewer".to_string()),
            _ => None,
        });
        let section = config.section(DEFAULT_SECTION).unwrap();
        assert_eq!(section.nutanix_host, "https://env.local:9440");
        assert_eq!(section.nutanix_user, "viewer");
        assert_eq!(section.nutanix_password, "");
        assert_eq!(config.sections.len(), 1);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[sections.default\nnutanix_host = 1").unwrap();
        let err = ExporterConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn shipped_sample_parses() {
        let config = ExporterConfig::parse(include_str!("../../../config/exporter.toml")).unwrap();
        let lab = config.section("lab").unwrap().to_collect_options();
        assert!(!lab.virtual_disks);
        assert!(lab.vm_nics);
        assert_eq!(lab.max_parallel_requests, 4);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = ExporterConfig::load(file.path()).unwrap();
        assert_eq!(config.sections.len(), 2);
        assert!(!config.file_missing);
    }
}
