//! Coordination store abstraction for node registration and director election.
//!
//! Provides a trait-based abstraction over a hierarchical key-value store
//! with TTLs, compare-and-swap writes, and directory watches. Two backends
//! ship with the crate: [`EtcdStore`] for production and [`MemoryStore`] for
//! tests and local development.
//!
//! Keys are expressed relative to the backend's configured prefix; the
//! cluster engine never sees absolute store paths.

pub mod etcd;
pub mod memory;

pub use etcd::EtcdStore;
pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Options for a [`CoordinationStore::set`] call.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Create the key as a directory.
    pub dir: bool,
    /// Attach a TTL; the key (and, for directories, everything under it)
    /// disappears unless refreshed.
    pub ttl: Option<Duration>,
    /// Compare-and-swap: the write succeeds only if the current value equals
    /// this payload byte-for-byte.
    pub prev_value: Option<String>,
    /// Compare-and-swap: the write succeeds only if the key does not exist.
    pub must_not_exist: bool,
    /// Create the immediate parent directory if it is missing.
    pub create_parents: bool,
}

impl SetOptions {
    pub fn dir() -> Self {
        Self {
            dir: true,
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_prev_value(mut self, prev: impl Into<String>) -> Self {
        self.prev_value = Some(prev.into());
        self
    }

    pub fn must_not_exist(mut self) -> Self {
        self.must_not_exist = true;
        self
    }

    pub fn create_parents(mut self) -> Self {
        self.create_parents = true;
        self
    }
}

/// Action carried by a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    /// A key was created or updated.
    Set,
    /// A key's TTL lapsed.
    Expire,
    /// A key was explicitly deleted.
    Delete,
}

/// A single change observed under a watched directory.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub action: WatchAction,
    /// Key relative to the store prefix, without a trailing slash.
    pub key: String,
    /// Whether the changed key is a directory.
    pub is_dir: bool,
}

impl WatchEvent {
    /// Final path component of the changed key.
    pub fn basename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Blocking stream of [`WatchEvent`]s for one directory subtree.
///
/// Callers cancel a watch by dropping the watcher; a pending `next_event`
/// is abandoned through `select!` rather than through the stream itself.
#[async_trait]
pub trait Watcher: Send {
    /// Wait for the next event under the watched directory.
    async fn next_event(&mut self) -> Result<WatchEvent>;
}

/// A hierarchical key-value store with TTLs, CAS writes, and directory
/// watches.
///
/// Implementations must be thread-safe; the engine shares one client across
/// all of its loops without pooling.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Fetch a leaf value. Returns [`ArgusError::KeyNotFound`] when the key
    /// is absent or expired.
    ///
    /// [`ArgusError::KeyNotFound`]: crate::error::ArgusError::KeyNotFound
    async fn get(&self, key: &str) -> Result<String>;

    /// Write a key. CAS preconditions and TTLs are carried in `options`;
    /// precondition failures surface as [`ArgusError::CasFailed`].
    ///
    /// [`ArgusError::CasFailed`]: crate::error::ArgusError::CasFailed
    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<()>;

    /// Delete a key, optionally with everything under it.
    async fn delete(&self, key: &str, recursive: bool) -> Result<()>;

    /// Whether a key (leaf or directory) currently exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Extend a directory's TTL without changing its contents. Does not
    /// generate watch events.
    async fn refresh(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Open a watch on a directory subtree.
    async fn watch(&self, prefix: &str) -> Result<Box<dyn Watcher>>;
}
