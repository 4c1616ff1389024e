use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::{MonitorError, Result};
use crate::types::Host;

/// Persistence collaborator behind the registry. The registry is a cache in
/// front of this; implementations own the schema.
#[async_trait]
pub trait HostStore: Send + Sync {
    async fn load_hosts(&self) -> Result<Vec<Host>>;

    /// Persist the host and return it with its assigned id (a host with
    /// `id == 0` gets a fresh one).
    async fn save_host(&self, host: &Host) -> Result<Host>;

    async fn delete_host(&self, id: i64) -> Result<()>;
}

/// In-memory table of configured hosts, unique by id. Other components get
/// read-only copies; derived per-host state (health, last-seen sets) is torn
/// down by the owning facade when a host is removed.
pub struct HostRegistry {
    hosts: RwLock<HashMap<i64, Host>>,
    store: Option<Arc<dyn HostStore>>,
}

impl HostRegistry {
    pub fn new(store: Option<Arc<dyn HostStore>>) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Refresh the cache from the store. No-op without a store.
    pub async fn load(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let loaded = store.load_hosts().await?;
        let count = loaded.len();
        let mut hosts = self.hosts.write().expect("host registry lock poisoned");
        hosts.clear();
        hosts.extend(loaded.into_iter().map(|h| (h.id, h)));
        info!("loaded {} host(s) from store", count);
        Ok(count)
    }

    /// Idempotent upsert keyed by id; persists through the store when one is
    /// configured. Returns the host as stored (with its assigned id).
    pub async fn add_host(&self, host: Host) -> Result<Host> {
        let host = match &self.store {
            Some(store) => store.save_host(&host).await?,
            None => host,
        };
        self.hosts
            .write()
            .expect("host registry lock poisoned")
            .insert(host.id, host.clone());
        info!(host_id = host.id, name = %host.name, "host registered");
        Ok(host)
    }

    /// Remove a host, returning the removed record so callers can tear down
    /// derived state.
    pub async fn remove_host(&self, id: i64) -> Result<Host> {
        let removed = self
            .hosts
            .write()
            .expect("host registry lock poisoned")
            .remove(&id)
            .ok_or(MonitorError::HostNotFound(id))?;
        if let Some(store) = &self.store {
            store.delete_host(id).await?;
        }
        info!(host_id = id, "host removed");
        Ok(removed)
    }

    pub fn get_host(&self, id: i64) -> Result<Host> {
        self.hosts
            .read()
            .expect("host registry lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(MonitorError::HostNotFound(id))
    }

    pub fn contains(&self, id: i64) -> bool {
        self.hosts
            .read()
            .expect("host registry lock poisoned")
            .contains_key(&id)
    }

    /// All hosts, in id order so fan-outs and API listings are stable.
    pub fn list_hosts(&self) -> Vec<Host> {
        let mut hosts: Vec<Host> = self
            .hosts
            .read()
            .expect("host registry lock poisoned")
            .values()
            .cloned()
            .collect();
        hosts.sort_by_key(|h| h.id);
        hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.read().expect("host registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
