use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use url::form_urlencoded;

use crate::error::{Error, Result};
use crate::resolver::Resolver;
use crate::transport::{Outcome, Transport};

/// Notification id of a namespace that has never been notified.
pub const UNKNOWN_NOTIFICATION_ID: i64 = -1;

/// One namespace's full configuration as served by a single fetch. This is
/// also the on-disk backup format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub cluster: String,
    pub namespace_name: String,
    #[serde(default)]
    pub release_key: String,
    #[serde(default, deserialize_with = "nullable_map")]
    pub configurations: BTreeMap<String, String>,
}

fn nullable_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `(namespace, notification id)` pair of the long-poll protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub namespace_name: String,
    pub notification_id: i64,
}

#[derive(Serialize)]
struct Messages {
    details: HashMap<String, i64>,
}

/// Builds and decodes the two remote operations of the config service.
pub struct ConfigCenter {
    resolver: Box<dyn Resolver>,
    transport: Transport,
    app_id: String,
    cluster: String,
    client_ip: String,
    notify_timeout: Duration,
}

impl ConfigCenter {
    pub fn new(
        resolver: Box<dyn Resolver>,
        transport: Transport,
        app_id: &str,
        cluster: &str,
        client_ip: &str,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            transport,
            app_id: app_id.to_string(),
            cluster: cluster.to_string(),
            client_ip: client_ip.to_string(),
            notify_timeout,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Fetch the configuration of one namespace.
    ///
    /// `Ok(None)` means the server reported no change. A snapshot carrying
    /// the release key that was sent is `Error::Unchanged`, one for another
    /// namespace is `Error::NamespaceMismatch`.
    pub async fn fetch_config(
        &self,
        namespace: &str,
        release_key: &str,
        notification_id: i64,
    ) -> Result<Option<ConfigSnapshot>> {
        let messages = self.messages(namespace, notification_id)?;
        let path = self.config_path(namespace, release_key, &messages);

        let snapshot = match self
            .transport
            .execute::<ConfigSnapshot>(self.resolver.as_ref(), &path, None)
            .await?
        {
            Outcome::Body(snapshot) => snapshot,
            Outcome::NotModified | Outcome::GatewayTimeout => return Ok(None),
        };

        if snapshot.namespace_name != namespace {
            return Err(Error::NamespaceMismatch {
                expected: namespace.to_string(),
                actual: snapshot.namespace_name,
            });
        }
        if !release_key.is_empty() && snapshot.release_key == release_key {
            return Err(Error::Unchanged);
        }
        Ok(Some(snapshot))
    }

    /// Long-poll for notifications on the given namespaces. Uses the notify
    /// timeout instead of the connect timeout.
    pub async fn pull_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<Outcome<Vec<Notification>>> {
        let encoded = serde_json::to_string(notifications)?;
        let path = self.notify_path(&encoded);
        self.transport
            .execute(self.resolver.as_ref(), &path, Some(self.notify_timeout))
            .await
    }

    fn messages(&self, namespace: &str, notification_id: i64) -> Result<String> {
        let key = format!("{}+{}+{}", self.app_id, self.cluster, namespace);
        let messages = Messages {
            details: HashMap::from([(key, notification_id)]),
        };
        Ok(serde_json::to_string(&messages)?)
    }

    fn config_path(&self, namespace: &str, release_key: &str, messages: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("releaseKey", release_key)
            .append_pair("ip", &self.client_ip)
            .append_pair("messages", messages)
            .finish();
        format!(
            "configs/{}/{}/{}?{}",
            escape(&self.app_id),
            escape(&self.cluster),
            escape(namespace),
            query
        )
    }

    fn notify_path(&self, notifications: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("appId", &self.app_id)
            .append_pair("cluster", &self.cluster)
            .append_pair("notifications", notifications)
            .finish();
        format!("notifications/v2?{}", query)
    }
}

fn escape(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}
