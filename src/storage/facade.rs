//! Convenience API over a [`StorageHost`].
//!
//! [`StorageFacade`] turns the host's per-area operations into `async` calls
//! returning [`crate::Result`], picks a default area when a call does not name
//! one, and multicasts the host's change feed to filtered listeners.

use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::area::{StorageArea, StorageHost};
use super::event::ChangeBatch;
use super::listeners::{ChangeFilter, ListenerHandle, ListenerRegistry};
use super::service::Subscription;
use super::types::{Items, KeyList, KeySpec};
use crate::config::StorageConfig;
use crate::errors::{Result, StorageError};

/// Default area together with the host area it resolves to.
struct DefaultArea {
    name: String,
    area: Arc<dyn StorageArea>,
}

pub struct StorageFacade {
    host: Arc<dyn StorageHost>,
    default: RwLock<DefaultArea>,
    sync_from: String,
    sync_to: String,
    listeners: Arc<ListenerRegistry>,
    /// Task forwarding host change events to the listeners
    pump: JoinHandle<()>,
}

impl std::fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFacade")
            .field("default_area", &self.default_area())
            .field("sync_from", &self.sync_from)
            .field("sync_to", &self.sync_to)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl StorageFacade {
    /// Creates a facade over `host` using the default configuration (default
    /// area `local`, syncing `local` into `sync`).
    ///
    /// The change feed is pumped by a task on the current Tokio runtime, so
    /// this fails with [`StorageError::NoRuntime`] outside of one.
    pub fn new(host: Arc<dyn StorageHost>) -> Result<Self> {
        Self::with_config(host, &StorageConfig::default())
    }

    /// Creates a facade over `host` with the defaults taken from `config`.
    /// Fails with [`StorageError::UnknownArea`] when the host does not know
    /// the configured default area.
    pub fn with_config(host: Arc<dyn StorageHost>, config: &StorageConfig) -> Result<Self> {
        let area = host
            .area(&config.default_area)
            .ok_or_else(|| StorageError::UnknownArea(config.default_area.clone()))?;

        let runtime = Handle::try_current().map_err(|_| StorageError::NoRuntime)?;
        let listeners = Arc::new(ListenerRegistry::new());
        let pump = spawn_change_pump(&runtime, host.subscribe(), listeners.clone());

        Ok(Self {
            host,
            default: RwLock::new(DefaultArea {
                name: config.default_area.clone(),
                area,
            }),
            sync_from: config.sync_from.clone(),
            sync_to: config.sync_to.clone(),
            listeners,
            pump,
        })
    }

    /// The host this facade talks to.
    pub fn host(&self) -> &Arc<dyn StorageHost> {
        &self.host
    }

    /// Name of the area used by calls that do not name one.
    pub fn default_area(&self) -> String {
        self.default.read().unwrap_or_else(|e| e.into_inner()).name.clone()
    }

    /// Changes the default area. Fails immediately, leaving the current default
    /// untouched, when the host has no area with that name.
    pub fn set_default_area(&self, name: &str) -> Result<()> {
        let area = self
            .host
            .area(name)
            .ok_or_else(|| StorageError::UnknownArea(name.to_string()))?;

        let mut guard = self.default.write().unwrap_or_else(|e| e.into_inner());
        log::debug!("default storage area: {} -> {}", guard.name, name);
        *guard = DefaultArea {
            name: name.to_string(),
            area,
        };
        Ok(())
    }

    fn resolve(&self, area: Option<&str>) -> Result<(String, Arc<dyn StorageArea>)> {
        match area {
            Some(name) => {
                let handle = self.host.area(name).ok_or_else(|| {
                    log::debug!("storage area {} is unknown to the host", name);
                    StorageError::UnknownArea(name.to_string())
                })?;
                log::debug!("resolved storage area {}", name);
                Ok((name.to_string(), handle))
            }
            None => {
                let guard = self.default.read().unwrap_or_else(|e| e.into_inner());
                log::debug!("resolved default storage area {}", guard.name);
                Ok((guard.name.clone(), guard.area.clone()))
            }
        }
    }

    /// Retrieves the entries selected by `keys`: a single key, a list of keys,
    /// or a map of keys to default values.
    pub async fn get(&self, keys: impl Into<KeySpec>, area: Option<&str>) -> Result<Items> {
        let (name, handle) = self.resolve(area)?;
        handle
            .get(keys.into())
            .await
            .map_err(|e| StorageError::host(&name, e))
    }

    /// Retrieves every entry of the area.
    pub async fn get_all(&self, area: Option<&str>) -> Result<Items> {
        self.get(KeySpec::All, area).await
    }

    /// Reads `key` and deserializes its value. Returns `None` when the key has
    /// no entry.
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str, area: Option<&str>) -> Result<Option<T>> {
        let mut items = self.get(key, area).await?;
        match items.remove(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Writes a single entry.
    pub async fn set_one(
        &self,
        key: impl Into<String>,
        value: impl Serialize,
        area: Option<&str>,
    ) -> Result<()> {
        let mut items = Items::new();
        items.insert(key.into(), serde_json::to_value(value)?);
        self.set_many(items, area).await
    }

    /// Writes every entry of `items`.
    pub async fn set_many(&self, items: Items, area: Option<&str>) -> Result<()> {
        let (name, handle) = self.resolve(area)?;
        handle
            .set(items)
            .await
            .map_err(|e| StorageError::host(&name, e))
    }

    /// Removes one key or a list of keys.
    pub async fn remove(&self, keys: impl Into<KeyList>, area: Option<&str>) -> Result<()> {
        let (name, handle) = self.resolve(area)?;
        handle
            .remove(keys.into().into_vec())
            .await
            .map_err(|e| StorageError::host(&name, e))
    }

    /// Removes every entry of the area.
    pub async fn clear(&self, area: Option<&str>) -> Result<()> {
        let (name, handle) = self.resolve(area)?;
        handle.clear().await.map_err(|e| StorageError::host(&name, e))
    }

    /// Bytes used by the entries selected by `keys`.
    pub async fn bytes_in_use(&self, keys: impl Into<KeySpec>, area: Option<&str>) -> Result<usize> {
        let (name, handle) = self.resolve(area)?;
        handle
            .bytes_in_use(keys.into())
            .await
            .map_err(|e| StorageError::host(&name, e))
    }

    /// Replaces the content of area `to` with a copy of area `from`.
    ///
    /// Defaults to the configured sync source and destination (`local` into
    /// `sync`). The read of `from` and the clear of `to` run concurrently and
    /// must both succeed before `to` is written. The first failure is returned.
    pub async fn sync(&self, from: Option<&str>, to: Option<&str>) -> Result<()> {
        let from = from.unwrap_or(&self.sync_from);
        let to = to.unwrap_or(&self.sync_to);
        log::debug!("syncing storage area {} into {}", from, to);

        let (data, ()) = futures::try_join!(self.get_all(Some(from)), self.clear(Some(to)))?;
        self.set_many(data, Some(to)).await
    }

    /// Registers `listener` for change batches accepted by `filter`.
    ///
    /// Listeners receive only the new value of each changed key. The returned
    /// handle identifies this registration alone.
    pub fn add_change_listener<F>(&self, listener: F, filter: ChangeFilter) -> ListenerHandle
    where
        F: Fn(&ChangeBatch) + Send + Sync + 'static,
    {
        self.listeners.add(listener, filter)
    }

    /// Unregisters a listener. Unknown handles are ignored and yield `false`.
    pub fn remove_change_listener(&self, handle: &ListenerHandle) -> bool {
        self.listeners.remove(handle)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Drop for StorageFacade {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn spawn_change_pump(
    runtime: &Handle,
    mut rx: Subscription,
    listeners: Arc<ListenerRegistry>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        while let Some(event) = rx.recv().await {
            let batch = ChangeBatch::from_host(&event);
            let invoked = listeners.dispatch(&batch);
            log::trace!(
                "storage[{}]: change of {} key(s) sent to {} listener(s)",
                batch.area(),
                batch.len(),
                invoked
            );
        }
        log::debug!("storage change feed closed");
    })
}
