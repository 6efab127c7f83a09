use std::path::Path;
use std::time::Duration;

use crate::cache::KeyMode;
use crate::client::Client;
use crate::defaults::DefaultValue;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::resolver::Resolver;

pub struct ClientBuilder {
    options: Options,
    resolver: Option<Box<dyn Resolver>>,
    errors: Vec<Error>,
}

pub fn create_builder() -> ClientBuilder {
    ClientBuilder {
        options: Options::default(),
        resolver: None,
        errors: Vec::new(),
    }
}

impl ClientBuilder {
    pub fn app_id(mut self, app_id: &str) -> Self {
        self.options.app_id = app_id.to_string();
        self
    }

    pub fn cluster(mut self, cluster: &str) -> Self {
        self.options.cluster = cluster.to_string();
        self
    }

    /// Namespaces to watch, separated by `,`.
    pub fn namespaces(mut self, names: &str) -> Self {
        self.options.namespace_name = names.to_string();
        self
    }

    /// Address of the config service, e.g. `127.0.0.1:8080` or
    /// `https://meta.apollo.com`.
    pub fn addr(mut self, addr: &str) -> Self {
        self.options.apollo_addr = addr.to_string();
        self
    }

    pub fn backup_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.options.backup_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn backup_suffix(mut self, suffix: &str) -> Self {
        self.options.backup_suffix = suffix.to_string();
        self
    }

    /// Cache capacity in bytes.
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.options.cache_size = bytes;
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.options.refresh_interval = interval;
        self
    }

    /// Minimum spacing between long polls. Values below 500ms are raised to
    /// 500ms.
    pub fn long_poll_interval(mut self, interval: Duration) -> Self {
        self.options.long_poll_interval = interval;
        self
    }

    pub fn notify_timeout(mut self, timeout: Duration) -> Self {
        self.options.notify_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.options.retry_interval = interval;
        self
    }

    /// Attempts per host. Zero means the host is never tried.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.options.max_retries = retries;
        self
    }

    pub fn client_ip(mut self, ip: &str) -> Self {
        self.options.client_ip = ip.to_string();
        self
    }

    /// Initialize from backup files without contacting the server.
    pub fn quick_init(mut self) -> Self {
        self.options.quick_init = true;
        self
    }

    /// Cache values under their bare key instead of `namespace.key`.
    pub fn ignore_namespace(mut self) -> Self {
        self.options.key_mode = KeyMode::Bare;
        self
    }

    /// Overlay options from a `.json` or `.toml` file. Setters called later
    /// win over the file.
    pub fn conf_file(mut self, path: impl AsRef<Path>) -> Self {
        if let Err(e) = self.options.merge_file(path) {
            self.errors.push(e);
        }
        self
    }

    /// Default returned by typed reads of the same type when the key is
    /// missing or unparsable.
    pub fn default_value(mut self, namespace: &str, key: &str, value: impl Into<DefaultValue>) -> Self {
        self.options.defaults.insert(namespace, key, value);
        self
    }

    /// Register several loosely typed defaults. Values that are not a string,
    /// integer, float or boolean make [`build`](Self::build) fail.
    pub fn default_values<K: AsRef<str>>(
        mut self,
        namespace: &str,
        values: impl IntoIterator<Item = (K, serde_json::Value)>,
    ) -> Self {
        for (key, value) in values {
            match DefaultValue::from_json(value) {
                Ok(v) => self.options.defaults.insert(namespace, key.as_ref(), v),
                Err(e) => self.errors.push(Error::Config(format!(
                    "default value for key {}: {}",
                    key.as_ref(),
                    e
                ))),
            }
        }
        self
    }

    /// Replace the single-host resolver built from [`addr`](Self::addr).
    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Validate everything and construct the client. No network I/O happens
    /// here; call [`Client::init`] next.
    pub fn build(self) -> Result<Client> {
        if let Some(e) = self.errors.into_iter().next() {
            return Err(e);
        }
        Client::new(self.options, self.resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_addr() {
        let err = create_builder().app_id("app").build().err().unwrap();
        assert!(err.to_string().contains("ApolloAddr not set"));
    }

    #[test]
    fn test_later_setter_wins_over_conf_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apollo.json");
        std::fs::write(&path, r#"{"appId":"hello3","cluster":"default","apolloAddr":"127.0.0.1:8000"}"#)
            .unwrap();

        let builder = create_builder().conf_file(&path).cluster("SG");
        assert_eq!(builder.options().cluster, "SG");
        assert_eq!(builder.options().app_id, "hello3");
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_invalid_default_fails_build() {
        let result = create_builder()
            .addr("127.0.0.1:8000")
            .default_values("application", [("k", serde_json::json!({"nested": 1}))])
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_conf_file_fails_build() {
        let result = create_builder()
            .addr("127.0.0.1:8000")
            .conf_file("/no/such/apollo.json")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_client_ip_detected_only_when_unset() {
        let client = create_builder().addr("127.0.0.1:8000").build().unwrap();
        assert_eq!(client.options().client_ip, crate::net::local_ipv4());

        let client = create_builder()
            .addr("127.0.0.1:8000")
            .client_ip("10.1.2.3")
            .build()
            .unwrap();
        assert_eq!(client.options().client_ip, "10.1.2.3");
    }
}
