use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backup::BackupStore;
use crate::cache::SnapshotCache;
use crate::diff::ChangeEvent;
use crate::error::{Error, HandlerError, MultiError, Result};
use crate::net;
use crate::options::{Options, DEFAULT_LONG_POLL_INTERVAL};
use crate::reader::ConfigReader;
use crate::remote::{ConfigCenter, ConfigSnapshot, Notification, UNKNOWN_NOTIFICATION_ID};
use crate::resolver::{Resolver, SingleHostResolver};
use crate::transport::{Outcome, Transport};

/// Callback receiving every non-empty change event after the initial load.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Initializing,
    /// Loaded and readable, sync loop not running yet.
    Initialized,
    Running,
    Stopped,
}

/// A watched namespace and its protocol state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
    pub release_key: String,
    pub notification_id: i64,
}

impl Namespace {
    fn new(name: String) -> Self {
        Self {
            name,
            release_key: String::new(),
            notification_id: UNKNOWN_NOTIFICATION_ID,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One client context: namespace list, cache, backups and the change
/// handler. Every path that writes the cache runs under `sync_lock`, so the
/// loop and on-demand resyncs never interleave; readers may call in from any
/// thread.
pub struct Client {
    options: Options,
    sync_lock: AsyncMutex<()>,
    center: ConfigCenter,
    cache: SnapshotCache,
    backup: BackupStore,
    namespaces: Mutex<Vec<Namespace>>,
    handler: RwLock<Option<ChangeHandler>>,
    state: Mutex<State>,
}

impl Client {
    pub(crate) fn new(mut options: Options, resolver: Option<Box<dyn Resolver>>) -> Result<Self> {
        options.validate()?;
        if options.client_ip.is_empty() {
            options.client_ip = net::local_ipv4();
        }
        if options.long_poll_interval < DEFAULT_LONG_POLL_INTERVAL {
            options.long_poll_interval = DEFAULT_LONG_POLL_INTERVAL;
        }

        let resolver =
            resolver.unwrap_or_else(|| Box::new(SingleHostResolver::new(&options.apollo_addr)));
        let transport = Transport::new(
            options.connect_timeout,
            options.retry_interval,
            options.max_retries,
        )?;
        let center = ConfigCenter::new(
            resolver,
            transport,
            &options.app_id,
            &options.cluster,
            &options.client_ip,
            options.notify_timeout,
        );
        let namespaces = options
            .namespaces()?
            .into_iter()
            .map(Namespace::new)
            .collect();

        Ok(Self {
            cache: SnapshotCache::new(options.cache_size, options.key_mode),
            backup: BackupStore::new(&options.backup_dir, &options.backup_suffix),
            center,
            namespaces: Mutex::new(namespaces),
            handler: RwLock::new(None),
            sync_lock: AsyncMutex::new(()),
            state: Mutex::new(State::Uninitialized),
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn state(&self) -> State {
        *lock(&self.state)
    }

    /// Initial load of every namespace: remote first with backup fallback,
    /// or backups only in quick-init mode. Runs once; later calls after a
    /// success are no-ops, a failed init may be retried.
    pub async fn init(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if *state != State::Uninitialized {
                debug!(state = ?*state, "init skipped");
                return Ok(());
            }
            *state = State::Initializing;
        }

        let result = if self.options.quick_init {
            self.load_backups(None).await
        } else {
            self.sync_init().await
        };

        let mut state = lock(&self.state);
        match result {
            Ok(()) => {
                *state = State::Initialized;
                info!(namespaces = ?self.namespaces(), "apollo client initialized");
                Ok(())
            }
            Err(e) => {
                *state = State::Uninitialized;
                error!(error = %e, "apollo client init failed");
                Err(e)
            }
        }
    }

    async fn sync_init(&self) -> Result<()> {
        let _guard = self.sync_lock.lock().await;
        let mut failed = MultiError::new();

        for ns in self.namespace_states() {
            let remote = self
                .center
                .fetch_config(&ns.name, &ns.release_key, ns.notification_id)
                .await;

            let snapshot = match remote {
                Ok(Some(snapshot)) => {
                    let (_, snapshot) = self.apply(snapshot);
                    self.backup.write(&snapshot).await;
                    continue;
                }
                Ok(None) => {
                    info!(namespace = %ns.name, "no config from server, using backup");
                    match self.backup.read(&ns.name).await {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            failed.push(e);
                            continue;
                        }
                    }
                }
                Err(e) => {
                    error!(namespace = %ns.name, error = %e, "sync namespace config failed");
                    match self.backup.read(&ns.name).await {
                        Ok(snapshot) => snapshot,
                        Err(backup_err) => {
                            failed.push(e);
                            failed.push(backup_err);
                            continue;
                        }
                    }
                }
            };

            self.apply(snapshot);
        }

        failed.into_result().map_err(Error::Init)
    }

    /// Apply backup files for `only` (or every namespace) without touching
    /// the server. Stops at the first namespace that cannot be loaded.
    pub async fn load_backups(&self, only: Option<&[String]>) -> Result<()> {
        let _guard = self.sync_lock.lock().await;
        for ns in self.namespace_states() {
            if only.is_some_and(|names| !names.contains(&ns.name)) {
                continue;
            }
            let snapshot = self.backup.read(&ns.name).await?;
            self.apply(snapshot);
        }
        Ok(())
    }

    /// Diff `snapshot` against the cache, apply it and record its release
    /// key. Callers hold `sync_lock`.
    fn apply(&self, snapshot: ConfigSnapshot) -> (ChangeEvent, ConfigSnapshot) {
        let event = self
            .cache
            .sync(&snapshot.namespace_name, &snapshot.configurations);

        if let Some(ns) = lock(&self.namespaces)
            .iter_mut()
            .find(|ns| ns.name == snapshot.namespace_name)
        {
            ns.release_key = snapshot.release_key.clone();
        }

        debug!(
            namespace = %event.namespace,
            changes = event.changes.len(),
            release_key = %snapshot.release_key,
            "applied config"
        );
        (event, snapshot)
    }

    /// Full resync of every namespace.
    pub async fn refresh(&self) {
        self.sync_namespaces(None).await;
    }

    /// Resync `only` (or every namespace). One namespace failing never stops
    /// the others. The whole batch runs under `sync_lock`, and each
    /// namespace's release key is read after the lock is taken.
    async fn sync_namespaces(&self, only: Option<&[String]>) {
        let _guard = self.sync_lock.lock().await;
        for ns in self.namespace_states() {
            if only.is_some_and(|names| !names.contains(&ns.name)) {
                continue;
            }

            let snapshot = match self
                .center
                .fetch_config(&ns.name, &ns.release_key, ns.notification_id)
                .await
            {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) | Err(Error::Unchanged) => {
                    debug!(namespace = %ns.name, "config unchanged");
                    continue;
                }
                Err(e) => {
                    error!(namespace = %ns.name, error = %e, "sync namespace config failed");
                    continue;
                }
            };

            let (event, snapshot) = self.apply(snapshot);
            self.backup.write(&snapshot).await;
            self.push_change(&event);
        }
    }

    fn push_change(&self, event: &ChangeEvent) {
        if event.is_empty() {
            return;
        }
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            if let Err(e) = handler(event) {
                error!(namespace = %event.namespace, error = %e, "config change handler failed");
            }
        }
    }

    /// One long-poll round: on notifications, record the new ids and resync
    /// just those namespaces.
    pub async fn pull_notify(&self) {
        let notifications = self.notifications();
        let changed = match self.center.pull_notifications(&notifications).await {
            Ok(Outcome::Body(changed)) => changed,
            Ok(Outcome::NotModified) | Ok(Outcome::GatewayTimeout) => return,
            Err(e) => {
                warn!(error = %e, "pull notifications failed");
                return;
            }
        };
        if changed.is_empty() {
            return;
        }

        let updated = self.update_notification_ids(&changed);
        info!(namespaces = ?updated, "config change notified");
        self.sync_namespaces(Some(updated.as_slice())).await;
    }

    fn notifications(&self) -> Vec<Notification> {
        lock(&self.namespaces)
            .iter()
            .map(|ns| Notification {
                namespace_name: ns.name.clone(),
                notification_id: ns.notification_id,
            })
            .collect()
    }

    fn update_notification_ids(&self, changed: &[Notification]) -> Vec<String> {
        let mut namespaces = lock(&self.namespaces);
        let mut updated = Vec::new();
        for n in changed {
            if let Some(ns) = namespaces.iter_mut().find(|ns| ns.name == n.namespace_name) {
                ns.notification_id = n.notification_id;
                updated.push(ns.name.clone());
            }
        }
        updated
    }

    /// Spawn the sync loop. Returns `None` unless the client is initialized
    /// and not yet started. The loop exits between iterations once `shutdown`
    /// is cancelled.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        {
            let mut state = lock(&self.state);
            if *state != State::Initialized {
                warn!(state = ?*state, "start ignored");
                return None;
            }
            *state = State::Running;
        }
        let client = Arc::clone(self);
        Some(tokio::spawn(client.run(shutdown)))
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let period = self.options.refresh_interval;
        let mut refresh = interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut limiter = interval(self.options.long_poll_interval);
        limiter.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(refresh = ?period, "apollo sync loop started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = refresh.tick() => self.refresh().await,
                _ = limiter.tick() => self.pull_notify().await,
            }
        }

        *lock(&self.state) = State::Stopped;
        info!("apollo sync loop stopped");
    }

    /// Register the change handler, replacing any previous one.
    pub fn on_change<F>(&self, handler: F)
    where
        F: Fn(&ChangeEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        *self
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Typed reads scoped to one namespace.
    pub fn reader(&self, namespace: &str) -> ConfigReader<'_> {
        ConfigReader::new(self, namespace)
    }

    pub(crate) fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Names of the watched namespaces in configured order.
    pub fn namespaces(&self) -> Vec<String> {
        lock(&self.namespaces)
            .iter()
            .map(|ns| ns.name.clone())
            .collect()
    }

    /// Snapshot of the protocol state of every namespace.
    pub fn namespace_states(&self) -> Vec<Namespace> {
        lock(&self.namespaces).clone()
    }

    /// The whole cache keyed by cache key.
    pub fn cache_map(&self) -> HashMap<String, String> {
        self.cache.to_map()
    }

    /// Raw lookup by cache key (`namespace.key`, or the bare key when
    /// namespaces are ignored).
    pub fn get_by_key(&self, cache_key: &str) -> Result<String> {
        self.cache.get_raw(cache_key)
    }

    /// Drop every cached value.
    pub fn cleanup(&self) {
        self.cache.clear();
    }
}
