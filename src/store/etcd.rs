//! etcd-backed coordination store.
//!
//! Models the hierarchical store contract on etcd's flat v3 keyspace:
//!
//! - a directory is a marker key with a trailing slash (`<prefix>/a/b/`);
//! - a directory TTL is a lease attached to the marker, and leaf keys
//!   created under a leased directory share that lease, so they live
//!   exactly as long as the directory;
//! - [`CoordinationStore::refresh`] is a single keep-alive on the marker's
//!   lease (the TTL extends by the lease's original grant);
//! - CAS writes use transactions: a value compare for updates, a
//!   create-revision-zero compare for creates;
//! - watches translate PUT to `Set`, lease-bound deletes of directory
//!   markers to `Expire`, and remaining deletes to `Delete`, using prev-kv
//!   metadata.

use super::{CoordinationStore, SetOptions, WatchAction, WatchEvent, Watcher};
use crate::config::StoreConfig;
use crate::error::{ArgusError, Result};
use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, DeleteOptions, EventType, GetOptions, PutOptions,
    Txn, TxnOp, WatchOptions,
};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// etcd [`CoordinationStore`] backend.
///
/// The client is cheap to clone and internally multiplexed; every call
/// clones it rather than locking.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    prefix: String,
}

impl EtcdStore {
    /// Connect to the configured etcd cluster.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut options = ConnectOptions::new();
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            options = options.with_user(user.clone(), password.clone());
        }

        let client = Client::connect(&config.endpoints, Some(options)).await?;
        debug!(endpoints = ?config.endpoints, prefix = %config.prefix, "Connected to etcd");

        Ok(Self {
            client,
            prefix: config.prefix.trim_matches('/').to_string(),
        })
    }

    fn leaf_key(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key.trim_matches('/'))
    }

    fn dir_key(&self, key: &str) -> String {
        format!("{}/", self.leaf_key(key))
    }

    /// Lease id held by a directory marker, if any.
    async fn dir_lease(&self, dir_key: &str) -> Result<Option<i64>> {
        let mut client = self.client.clone();
        let resp = client.get(dir_key, None).await?;
        Ok(resp
            .kvs()
            .first()
            .map(|kv| kv.lease())
            .filter(|lease| *lease != 0))
    }

    /// Lease to attach to a new key: an explicit TTL grants a fresh lease;
    /// a leaf under a leased directory inherits the directory's lease.
    async fn lease_for(&self, full_key: &str, options: &SetOptions) -> Result<Option<i64>> {
        if let Some(ttl) = options.ttl {
            let mut client = self.client.clone();
            let grant = client
                .lease_grant(ttl.as_secs().max(1) as i64, None)
                .await?;
            return Ok(Some(grant.id()));
        }

        if options.dir {
            return Ok(None);
        }

        match full_key.rsplit_once('/') {
            Some((parent, _)) => self.dir_lease(&format!("{}/", parent)).await,
            None => Ok(None),
        }
    }

    /// Create the immediate parent directory marker if absent (no TTL).
    async fn ensure_parent(&self, full_key: &str) -> Result<()> {
        let Some((parent, _)) = full_key.rsplit_once('/') else {
            return Ok(());
        };
        let marker = format!("{}/", parent);

        let mut client = self.client.clone();
        let txn = Txn::new()
            .when(vec![Compare::create_revision(
                marker.clone(),
                CompareOp::Equal,
                0,
            )])
            .and_then(vec![TxnOp::put(marker, "", None)]);
        client.txn(txn).await?;
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<String> {
        let mut client = self.client.clone();
        let resp = client.get(self.leaf_key(key), None).await?;
        match resp.kvs().first() {
            Some(kv) => Ok(kv.value_str()?.to_string()),
            None => Err(ArgusError::KeyNotFound(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<()> {
        let full = if options.dir {
            self.dir_key(key)
        } else {
            self.leaf_key(key)
        };

        if options.create_parents {
            self.ensure_parent(&full).await?;
        }

        let lease = self.lease_for(&full, &options).await?;
        let mut put_options = PutOptions::new();
        if let Some(lease) = lease {
            put_options = put_options.with_lease(lease);
        }

        let mut client = self.client.clone();

        if options.must_not_exist {
            let txn = Txn::new()
                .when(vec![Compare::create_revision(
                    full.clone(),
                    CompareOp::Equal,
                    0,
                )])
                .and_then(vec![TxnOp::put(full, value, Some(put_options))]);
            let resp = client.txn(txn).await?;
            if !resp.succeeded() {
                return Err(ArgusError::CasFailed(key.to_string()));
            }
        } else if let Some(prev) = &options.prev_value {
            let txn = Txn::new()
                .when(vec![Compare::value(
                    full.clone(),
                    CompareOp::Equal,
                    prev.as_str(),
                )])
                .and_then(vec![TxnOp::put(full, value, Some(put_options))]);
            let resp = client.txn(txn).await?;
            if !resp.succeeded() {
                return Err(ArgusError::CasFailed(key.to_string()));
            }
        } else {
            client.put(full, value, Some(put_options)).await?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<()> {
        let mut client = self.client.clone();
        if recursive {
            // The trailing-slash prefix covers the marker and every child.
            client
                .delete(self.dir_key(key), Some(DeleteOptions::new().with_prefix()))
                .await?;
        }
        client.delete(self.leaf_key(key), None).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut client = self.client.clone();
        let count_only = || GetOptions::new().with_count_only();

        let dir = client
            .get(self.dir_key(key), Some(count_only()))
            .await?;
        if dir.count() > 0 {
            return Ok(true);
        }

        let leaf = client
            .get(self.leaf_key(key), Some(count_only()))
            .await?;
        Ok(leaf.count() > 0)
    }

    async fn refresh(&self, key: &str, _ttl: Duration) -> Result<()> {
        let marker = self.dir_key(key);
        let lease = self
            .dir_lease(&marker)
            .await?
            .ok_or_else(|| ArgusError::KeyNotFound(key.to_string()))?;

        let mut client = self.client.clone();
        let (mut keeper, mut responses) = client.lease_keep_alive(lease).await?;
        keeper.keep_alive().await?;

        match responses.message().await? {
            Some(resp) if resp.ttl() > 0 => Ok(()),
            _ => Err(ArgusError::KeyNotFound(key.to_string())),
        }
    }

    async fn watch(&self, prefix: &str) -> Result<Box<dyn Watcher>> {
        let mut client = self.client.clone();
        let (watcher, stream) = client
            .watch(
                self.dir_key(prefix),
                Some(WatchOptions::new().with_prefix().with_prev_key()),
            )
            .await?;

        Ok(Box::new(EtcdWatcher {
            _watcher: watcher,
            stream,
            strip: format!("{}/", self.prefix),
            pending: VecDeque::new(),
        }))
    }
}

struct EtcdWatcher {
    // Held so the server-side watch stays open for the stream's lifetime.
    _watcher: etcd_client::Watcher,
    stream: etcd_client::WatchStream,
    strip: String,
    pending: VecDeque<WatchEvent>,
}

#[async_trait]
impl Watcher for EtcdWatcher {
    async fn next_event(&mut self) -> Result<WatchEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let resp = self
                .stream
                .message()
                .await
                .map_err(|e| ArgusError::Watch(e.to_string()))?
                .ok_or(ArgusError::WatchCanceled)?;
            if resp.canceled() {
                return Err(ArgusError::WatchCanceled);
            }

            for event in resp.events() {
                let Some(kv) = event.kv() else {
                    continue;
                };
                let raw = kv.key_str()?;
                let relative = raw.strip_prefix(self.strip.as_str()).unwrap_or(raw);
                let is_dir = relative.ends_with('/');
                let key = relative.trim_end_matches('/').to_string();

                let action = match event.event_type() {
                    EventType::Put => WatchAction::Set,
                    EventType::Delete => {
                        let leased = event
                            .prev_kv()
                            .map(|prev| prev.lease() != 0)
                            .unwrap_or(false);
                        // Only directory markers carry their own TTL meaning;
                        // leaf keys vanishing with a parent lease are
                        // incidental removals, not expirations.
                        if leased && is_dir {
                            WatchAction::Expire
                        } else {
                            WatchAction::Delete
                        }
                    }
                };

                self.pending.push_back(WatchEvent { action, key, is_dir });
            }
        }
    }
}
