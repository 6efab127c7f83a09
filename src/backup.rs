use std::path::PathBuf;

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::remote::ConfigSnapshot;

/// One pretty-printed JSON file per namespace: `<dir>/<namespace><suffix>`.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    suffix: String,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, suffix: &str) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.to_string(),
        }
    }

    pub fn path_for(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}{}", namespace, self.suffix))
    }

    /// Persist `snapshot`. Failures are logged and dropped.
    pub async fn write(&self, snapshot: &ConfigSnapshot) {
        if let Err(e) = self.try_write(snapshot).await {
            error!(namespace = %snapshot.namespace_name, error = %e, "write backup file failed");
        }
    }

    /// Persist `snapshot`, returning any failure.
    pub async fn try_write(&self, snapshot: &ConfigSnapshot) -> Result<()> {
        let path = self.path_for(&snapshot.namespace_name);
        let content = serde_json::to_vec_pretty(snapshot).map_err(|e| Error::backup(&path, e))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::backup(&path, e))?;

        // write then rename so a crash never leaves a truncated backup
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| Error::backup(&path, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::backup(&path, e))?;
        Ok(())
    }

    /// Load the backup of `namespace`. A missing or corrupt file is an error.
    pub async fn read(&self, namespace: &str) -> Result<ConfigSnapshot> {
        let path = self.path_for(namespace);
        info!(path = %path.display(), "load config file");

        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::backup(&path, e))?;
        let snapshot: ConfigSnapshot =
            serde_json::from_slice(&content).map_err(|e| Error::backup(&path, e))?;

        if snapshot.namespace_name != namespace {
            return Err(Error::backup(
                &path,
                Error::NamespaceMismatch {
                    expected: namespace.to_string(),
                    actual: snapshot.namespace_name,
                },
            ));
        }
        Ok(snapshot)
    }
}
