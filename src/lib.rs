//! Client for an Apollo style configuration center.
//!
//! A [`Client`] loads a set of namespaces at startup (from the server, or from
//! local backup files when the server is unreachable), keeps them in a bounded
//! in-memory cache and, once started, stays in sync through long-poll
//! notifications plus a periodic full refresh. Every change is diffed and
//! delivered to an optional handler.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> apollo_client::Result<()> {
//! let client = Arc::new(
//!     apollo_client::builder()
//!         .app_id("SampleApp")
//!         .addr("127.0.0.1:8080")
//!         .namespaces("application,mysql.json")
//!         .default_value("application", "timeout", 30)
//!         .build()?,
//! );
//! client.init().await?;
//!
//! client.on_change(|event| {
//!     println!("{} changed: {} keys", event.namespace, event.changes.len());
//!     Ok(())
//! });
//!
//! let shutdown = CancellationToken::new();
//! let handle = client.start(shutdown.clone());
//!
//! let timeout = client
//!     .reader("application")
//!     .get_int("timeout")
//!     .unwrap_or_else(apollo_client::Fallback::into_value);
//! println!("timeout = {timeout}");
//!
//! shutdown.cancel();
//! if let Some(handle) = handle {
//!     let _ = handle.await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod builder;
pub mod cache;
pub mod client;
pub mod defaults;
pub mod diff;
pub mod error;
pub mod net;
pub mod options;
pub mod reader;
pub mod remote;
pub mod resolver;
pub mod transport;

pub use builder::ClientBuilder;
pub use cache::{CacheStore, KeyMode, LruStore, SnapshotCache};
pub use client::{ChangeHandler, Client, Namespace, State};
pub use defaults::{ConfigValue, DefaultValue, Defaults};
pub use diff::{Change, ChangeEvent, ChangeType};
pub use error::{Error, HandlerError, MultiError, Result};
pub use options::Options;
pub use reader::{ConfigReader, Fallback};
pub use remote::{ConfigSnapshot, Notification};
pub use resolver::{Resolver, SingleHostResolver};

/// Returns a builder for configuring a client.
pub fn builder() -> ClientBuilder {
    builder::create_builder()
}
