use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::KeyMode;
use crate::defaults::{DefaultValue, Defaults};
use crate::error::{Error, Result};

pub const DEFAULT_CLUSTER: &str = "default";
pub const DEFAULT_NAMESPACE: &str = "application";
pub const DEFAULT_BACKUP_DIR: &str = ".";
pub const DEFAULT_BACKUP_SUFFIX: &str = ".apollo.json";
pub const DEFAULT_CACHE_SIZE: usize = 50 * 1024 * 1024;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Also the floor: long polls never start more than twice a second.
pub const DEFAULT_LONG_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(65);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Everything a client needs to know before it starts.
#[derive(Debug, Clone)]
pub struct Options {
    pub app_id: String,
    pub cluster: String,
    /// Comma separated namespace list.
    pub namespace_name: String,
    pub apollo_addr: String,
    pub backup_dir: PathBuf,
    pub backup_suffix: String,
    /// Cache capacity in bytes.
    pub cache_size: usize,
    pub refresh_interval: Duration,
    pub long_poll_interval: Duration,
    pub notify_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry_interval: Duration,
    pub max_retries: u32,
    /// Detected when the client is built if left empty.
    pub client_ip: String,
    /// Initialize from backup files only, without asking the server.
    pub quick_init: bool,
    pub key_mode: KeyMode,
    pub defaults: Defaults,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            cluster: DEFAULT_CLUSTER.to_string(),
            namespace_name: DEFAULT_NAMESPACE.to_string(),
            apollo_addr: String::new(),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            cache_size: DEFAULT_CACHE_SIZE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            long_poll_interval: DEFAULT_LONG_POLL_INTERVAL,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            client_ip: String::new(),
            quick_init: false,
            key_mode: KeyMode::Qualified,
            defaults: Defaults::new(),
        }
    }
}

/// Keys accepted in a JSON or TOML options file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileOptions {
    app_id: Option<String>,
    cluster: Option<String>,
    namespace_name: Option<String>,
    apollo_addr: Option<String>,
    backup_dir: Option<PathBuf>,
    backup_suffix: Option<String>,
    config_cache_size: Option<usize>,
    client_ip: Option<String>,
    ignore_namespace: Option<bool>,
    quick_init: Option<bool>,
    #[serde(default)]
    defaults: HashMap<String, HashMap<String, serde_json::Value>>,
}

impl FileOptions {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;
        let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
        if is_toml {
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))
        }
    }
}

impl Options {
    /// Defaults overlaid with the values of a `.json` or `.toml` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut options = Self::default();
        options.merge_file(path)?;
        Ok(options)
    }

    /// Overlay the keys present in `path`; absent keys keep their value.
    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = FileOptions::load(path.as_ref())?;

        if let Some(v) = file.app_id {
            self.app_id = v;
        }
        if let Some(v) = file.cluster {
            self.cluster = v;
        }
        if let Some(v) = file.namespace_name {
            self.namespace_name = v;
        }
        if let Some(v) = file.apollo_addr {
            self.apollo_addr = v;
        }
        if let Some(v) = file.backup_dir {
            self.backup_dir = v;
        }
        if let Some(v) = file.backup_suffix {
            self.backup_suffix = v;
        }
        if let Some(v) = file.config_cache_size {
            self.cache_size = v;
        }
        if let Some(v) = file.client_ip {
            self.client_ip = v;
        }
        if let Some(true) = file.ignore_namespace {
            self.key_mode = KeyMode::Bare;
        }
        if let Some(v) = file.quick_init {
            self.quick_init = v;
        }
        for (namespace, values) in file.defaults {
            for (key, value) in values {
                let value = DefaultValue::from_json(value).map_err(|e| {
                    Error::Config(format!("default value for key {}: {}", key, e))
                })?;
                self.defaults.insert(&namespace, &key, value);
            }
        }
        Ok(())
    }

    /// The configured namespace names in order.
    pub fn namespaces(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for name in self.namespace_name.split(',').map(str::trim) {
            if name.is_empty() {
                return Err(Error::Config(format!(
                    "empty namespace name in `{}`",
                    self.namespace_name
                )));
            }
            if !seen.insert(name) {
                return Err(Error::Config(format!("duplicate namespace `{}`", name)));
            }
            names.push(name.to_string());
        }
        Ok(names)
    }

    pub fn validate(&self) -> Result<()> {
        if self.apollo_addr.trim().is_empty() {
            return Err(Error::Config("ApolloAddr not set".to_string()));
        }
        if self.cache_size == 0 {
            return Err(Error::Config("cache size must be positive".to_string()));
        }
        if self.refresh_interval.is_zero() {
            return Err(Error::Config("refresh interval must be positive".to_string()));
        }
        self.namespaces().map(|_| ())
    }
}
