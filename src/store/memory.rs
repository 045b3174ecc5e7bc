//! In-memory coordination store.
//!
//! Implements the full [`CoordinationStore`] contract, including TTL expiry
//! and watch events, against process-local state. Used by the integration
//! tests to simulate a fleet sharing one store, and handy for local
//! development without a real backend.

use super::{CoordinationStore, SetOptions, WatchAction, WatchEvent, Watcher};
use crate::error::{ArgusError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tracing::debug;

/// How often the sweeper looks for expired keys.
const SWEEP_INTERVAL: Duration = Duration::from_millis(20);

/// Watch fan-out buffer; a slow watcher that falls this far behind loses
/// the oldest events.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
struct Node {
    value: String,
    dir: bool,
    expires_at: Option<Instant>,
}

impl Node {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Inner {
    nodes: RwLock<BTreeMap<String, Node>>,
    events_tx: broadcast::Sender<WatchEvent>,
}

/// Process-local [`CoordinationStore`] backend.
///
/// Clones share the same keyspace, so a test can hand one store to several
/// cluster engines.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let inner = Arc::new(Inner {
            nodes: RwLock::new(BTreeMap::new()),
            events_tx,
        });

        tokio::spawn(Self::sweep_expired(Arc::downgrade(&inner)));

        Self { inner }
    }

    /// Background task that turns lapsed TTLs into expire events. Exits when
    /// the last store handle is dropped.
    async fn sweep_expired(inner: Weak<Inner>) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;

            let Some(inner) = inner.upgrade() else {
                return;
            };

            let now = Instant::now();
            let mut expired = Vec::new();
            {
                let mut nodes = inner.nodes.write().await;
                let lapsed: Vec<String> = nodes
                    .iter()
                    .filter(|(_, node)| node.is_expired(now))
                    .map(|(key, _)| key.clone())
                    .collect();

                for key in lapsed {
                    let Some(node) = nodes.remove(&key) else {
                        continue;
                    };
                    // Children live only as long as the enclosing directory;
                    // they go quietly, the expire event names the directory.
                    let child_prefix = format!("{}/", key);
                    nodes.retain(|k, _| !k.starts_with(&child_prefix));
                    expired.push((key, node.dir));
                }
            }

            for (key, dir) in expired {
                debug!(key = %key, "Memory store key expired");
                let _ = inner.events_tx.send(WatchEvent {
                    action: WatchAction::Expire,
                    key,
                    is_dir: dir,
                });
            }
        }
    }

    fn normalize(key: &str) -> String {
        key.trim_matches('/').to_string()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<String> {
        let key = Self::normalize(key);
        let nodes = self.inner.nodes.read().await;
        match nodes.get(&key) {
            Some(node) if !node.is_expired(Instant::now()) => Ok(node.value.clone()),
            _ => Err(ArgusError::KeyNotFound(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<()> {
        let key = Self::normalize(key);
        let now = Instant::now();
        {
            let mut nodes = self.inner.nodes.write().await;
            let existing = nodes.get(&key).filter(|node| !node.is_expired(now));

            if options.must_not_exist && existing.is_some() {
                return Err(ArgusError::CasFailed(key));
            }

            if let Some(prev) = &options.prev_value {
                match existing {
                    None => return Err(ArgusError::KeyNotFound(key)),
                    Some(node) if node.value != *prev => {
                        return Err(ArgusError::CasFailed(key));
                    }
                    Some(_) => {}
                }
            }

            if options.create_parents {
                if let Some((parent, _)) = key.rsplit_once('/') {
                    nodes.entry(parent.to_string()).or_insert(Node {
                        value: String::new(),
                        dir: true,
                        expires_at: None,
                    });
                }
            }

            nodes.insert(
                key.clone(),
                Node {
                    value: value.to_string(),
                    dir: options.dir,
                    expires_at: options.ttl.map(|ttl| now + ttl),
                },
            );
        }

        let _ = self.inner.events_tx.send(WatchEvent {
            action: WatchAction::Set,
            key,
            is_dir: options.dir,
        });
        Ok(())
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<()> {
        let key = Self::normalize(key);
        let removed = {
            let mut nodes = self.inner.nodes.write().await;
            let removed = nodes.remove(&key);
            if recursive {
                let child_prefix = format!("{}/", key);
                nodes.retain(|k, _| !k.starts_with(&child_prefix));
            }
            removed
        };

        match removed {
            Some(node) => {
                let _ = self.inner.events_tx.send(WatchEvent {
                    action: WatchAction::Delete,
                    key,
                    is_dir: node.dir,
                });
                Ok(())
            }
            None => Err(ArgusError::KeyNotFound(key)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = Self::normalize(key);
        let nodes = self.inner.nodes.read().await;
        Ok(nodes
            .get(&key)
            .is_some_and(|node| !node.is_expired(Instant::now())))
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<()> {
        let key = Self::normalize(key);
        let mut nodes = self.inner.nodes.write().await;
        match nodes.get_mut(&key) {
            Some(node) if !node.is_expired(Instant::now()) => {
                node.expires_at = Some(Instant::now() + ttl);
                Ok(())
            }
            _ => Err(ArgusError::KeyNotFound(key)),
        }
    }

    async fn watch(&self, prefix: &str) -> Result<Box<dyn Watcher>> {
        Ok(Box::new(MemoryWatcher {
            rx: self.inner.events_tx.subscribe(),
            prefix: Self::normalize(prefix),
        }))
    }
}

struct MemoryWatcher {
    rx: broadcast::Receiver<WatchEvent>,
    prefix: String,
}

#[async_trait]
impl Watcher for MemoryWatcher {
    async fn next_event(&mut self) -> Result<WatchEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    let under_prefix = event
                        .key
                        .strip_prefix(self.prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'));
                    if under_prefix {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    return Err(ArgusError::Watch(format!(
                        "watcher lagged, {} events dropped",
                        missed
                    )));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ArgusError::WatchCanceled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_delete() {
        let store = MemoryStore::new();

        store
            .set("cluster/director", "payload", SetOptions::default())
            .await
            .unwrap();
        assert_eq!(store.get("cluster/director").await.unwrap(), "payload");

        store.delete("cluster/director", false).await.unwrap();
        assert!(store
            .get("cluster/director")
            .await
            .unwrap_err()
            .is_key_not_found());
    }

    #[tokio::test]
    async fn test_create_cas() {
        let store = MemoryStore::new();

        let create = SetOptions::default().must_not_exist();
        store.set("k", "first", create.clone()).await.unwrap();

        // The loser of a create race gets a precondition failure.
        let err = store.set("k", "second", create).await.unwrap_err();
        assert!(matches!(err, ArgusError::CasFailed(_)));
        assert_eq!(store.get("k").await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_update_cas() {
        let store = MemoryStore::new();
        store.set("k", "old", SetOptions::default()).await.unwrap();

        store
            .set("k", "new", SetOptions::default().with_prev_value("old"))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), "new");

        let err = store
            .set("k", "newer", SetOptions::default().with_prev_value("old"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArgusError::CasFailed(_)));
    }

    #[tokio::test]
    async fn test_ttl_expiry_emits_event() {
        let store = MemoryStore::new();
        let mut watcher = store.watch("cluster/members").await.unwrap();

        store
            .set(
                "cluster/members/node-1",
                "",
                SetOptions::dir().with_ttl(Duration::from_millis(50)),
            )
            .await
            .unwrap();
        store
            .set(
                "cluster/members/node-1/status",
                "{}",
                SetOptions::default(),
            )
            .await
            .unwrap();

        // Creation events first.
        let event = watcher.next_event().await.unwrap();
        assert_eq!(event.action, WatchAction::Set);
        assert_eq!(event.key, "cluster/members/node-1");
        assert!(event.is_dir);
        let event = watcher.next_event().await.unwrap();
        assert_eq!(event.action, WatchAction::Set);
        assert!(!event.is_dir);

        // Then the expiry, for the directory only.
        let event = tokio::time::timeout(Duration::from_secs(1), watcher.next_event())
            .await
            .expect("expire event")
            .unwrap();
        assert_eq!(event.action, WatchAction::Expire);
        assert_eq!(event.key, "cluster/members/node-1");

        // Children went with the directory.
        assert!(!store.exists("cluster/members/node-1/status").await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_extends_ttl() {
        let store = MemoryStore::new();
        store
            .set("dir", "", SetOptions::dir().with_ttl(Duration::from_millis(80)))
            .await
            .unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            store.refresh("dir", Duration::from_millis(80)).await.unwrap();
        }
        assert!(store.exists("dir").await.unwrap());

        tokio::time::sleep(Duration::from_millis(160)).await;
        assert!(!store.exists("dir").await.unwrap());
        assert!(store
            .refresh("dir", Duration::from_millis(80))
            .await
            .unwrap_err()
            .is_key_not_found());
    }

    #[tokio::test]
    async fn test_recursive_delete() {
        let store = MemoryStore::new();
        store
            .set("cluster/members/node-1", "", SetOptions::dir())
            .await
            .unwrap();
        store
            .set("cluster/members/node-1/status", "{}", SetOptions::default())
            .await
            .unwrap();
        store
            .set("cluster/members/node-1/config", "", SetOptions::dir())
            .await
            .unwrap();

        store.delete("cluster/members/node-1", true).await.unwrap();
        assert!(!store.exists("cluster/members/node-1").await.unwrap());
        assert!(!store.exists("cluster/members/node-1/status").await.unwrap());
        assert!(!store.exists("cluster/members/node-1/config").await.unwrap());
    }

    #[tokio::test]
    async fn test_watch_scoped_to_prefix() {
        let store = MemoryStore::new();
        let mut watcher = store.watch("cluster/members").await.unwrap();

        store
            .set("cluster/director", "d", SetOptions::default())
            .await
            .unwrap();
        store
            .set("cluster/members/node-1", "", SetOptions::dir())
            .await
            .unwrap();

        // The director write never reaches a members watcher.
        let event = watcher.next_event().await.unwrap();
        assert_eq!(event.key, "cluster/members/node-1");
    }
}
