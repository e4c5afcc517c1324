use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;

use super::area::{StorageArea, StorageHost};
use super::event::{HostChangeEvent, StorageChange};
use super::local::in_memory::InMemoryArea;
use super::types::{Items, KeySpec};
use crate::config::{AreaBackend, AreaConfig, StorageConfig};

/// A handle for receiving host change notifications. Every event published
/// after subscribing is delivered, in publish order.
pub type Subscription = mpsc::UnboundedReceiver<HostChangeEvent>;

#[derive(Debug, Default)]
struct StorageBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<HostChangeEvent>>>,
}

impl StorageBus {
    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    fn publish(&self, area: &str, changes: BTreeMap<String, StorageChange>) {
        if changes.is_empty() {
            return;
        }
        log::debug!("storage[{}]: {} key(s) changed", area, changes.len());
        let event = HostChangeEvent {
            area: area.to_string(),
            changes,
        };
        // send() only fails once the receiver is gone; drop those subscribers.
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Storage host made of named areas. Every mutation of an area is published
/// on a single change feed with both the old and the new value of each key.
#[derive(Clone)]
pub struct ExtensionStorage {
    areas: BTreeMap<String, Arc<dyn StorageArea>>,
    bus: Arc<StorageBus>,
}

impl Debug for ExtensionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionStorage")
            .field("areas", &self.areas.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ExtensionStorage {
    pub fn builder() -> ExtensionStorageBuilder {
        ExtensionStorageBuilder::default()
    }

    /// Builds a host with the areas described in `config`.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut builder = Self::builder();
        for area in &config.areas {
            builder = builder.area(&area.name, backend_for(area)?);
        }
        Ok(builder.build())
    }
}

fn backend_for(cfg: &AreaConfig) -> Result<Arc<dyn StorageArea>> {
    match &cfg.backend {
        AreaBackend::InMemory => Ok(Arc::new(InMemoryArea::with_limits(
            cfg.quota_bytes,
            cfg.max_items,
        ))),
        #[cfg(feature = "sqlite_store")]
        AreaBackend::Sqlite { path } => Ok(Arc::new(
            super::local::sqlite_store::SqliteArea::open(path, &cfg.name)?
                .with_limits(cfg.quota_bytes, cfg.max_items),
        )),
        #[cfg(not(feature = "sqlite_store"))]
        AreaBackend::Sqlite { .. } => anyhow::bail!(
            "area '{}' needs the sqlite_store feature",
            cfg.name
        ),
    }
}

impl StorageHost for ExtensionStorage {
    fn area(&self, name: &str) -> Option<Arc<dyn StorageArea>> {
        self.areas.get(name).cloned()
    }

    fn area_names(&self) -> Vec<String> {
        self.areas.keys().cloned().collect()
    }

    fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }
}

/// Builder for [`ExtensionStorage`].
#[derive(Default)]
pub struct ExtensionStorageBuilder {
    areas: Vec<(String, Arc<dyn StorageArea>)>,
}

impl ExtensionStorageBuilder {
    /// Adds (or replaces) the area `name`, backed by `backend`.
    pub fn area(mut self, name: &str, backend: Arc<dyn StorageArea>) -> Self {
        self.areas.retain(|(n, _)| n != name);
        self.areas.push((name.to_string(), backend));
        self
    }

    pub fn build(self) -> ExtensionStorage {
        let bus = Arc::new(StorageBus::default());
        let areas = self
            .areas
            .into_iter()
            .map(|(name, inner)| {
                let wrapped: Arc<dyn StorageArea> = Arc::new(NotifyingArea {
                    inner,
                    name: name.clone(),
                    bus: bus.clone(),
                    write_lock: Arc::new(tokio::sync::Mutex::new(())),
                });
                (name, wrapped)
            })
            .collect();
        ExtensionStorage { areas, bus }
    }
}

/// Publishes every effective mutation of `inner`. Mutations are serialized by
/// `write_lock`, so the old values read before a write are the ones the write
/// replaces and events leave in write order.
struct NotifyingArea {
    inner: Arc<dyn StorageArea>,
    name: String,
    bus: Arc<StorageBus>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl NotifyingArea {
    fn ctx(&self) -> Notify {
        Notify {
            inner: self.inner.clone(),
            bus: self.bus.clone(),
            name: self.name.clone(),
            write_lock: self.write_lock.clone(),
        }
    }
}

struct Notify {
    inner: Arc<dyn StorageArea>,
    bus: Arc<StorageBus>,
    name: String,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl StorageArea for NotifyingArea {
    fn get(&self, keys: KeySpec) -> BoxFuture<'static, Result<Items>> {
        self.inner.get(keys)
    }

    fn set(&self, items: Items) -> BoxFuture<'static, Result<()>> {
        notify_set(self.ctx(), items).boxed()
    }

    fn remove(&self, keys: Vec<String>) -> BoxFuture<'static, Result<()>> {
        notify_remove(self.ctx(), keys).boxed()
    }

    fn clear(&self) -> BoxFuture<'static, Result<()>> {
        notify_clear(self.ctx()).boxed()
    }

    fn bytes_in_use(&self, keys: KeySpec) -> BoxFuture<'static, Result<usize>> {
        self.inner.bytes_in_use(keys)
    }
}

async fn notify_set(n: Notify, items: Items) -> Result<()> {
    let _guard = n.write_lock.lock().await;
    let old = n.inner.get(KeySpec::Many(items.keys().cloned().collect())).await?;
    n.inner.set(items.clone()).await?;

    let changes = items
        .into_iter()
        .filter_map(|(key, new)| {
            let old_value = old.get(&key).cloned();
            if old_value.as_ref() == Some(&new) {
                return None;
            }
            Some((
                key,
                StorageChange {
                    old_value,
                    new_value: Some(new),
                },
            ))
        })
        .collect();
    n.bus.publish(&n.name, changes);
    Ok(())
}

async fn notify_remove(n: Notify, keys: Vec<String>) -> Result<()> {
    let _guard = n.write_lock.lock().await;
    let old = n.inner.get(KeySpec::Many(keys.clone())).await?;
    n.inner.remove(keys).await?;
    n.bus.publish(&n.name, removed(old));
    Ok(())
}

async fn notify_clear(n: Notify) -> Result<()> {
    let _guard = n.write_lock.lock().await;
    let old = n.inner.get(KeySpec::All).await?;
    n.inner.clear().await?;
    n.bus.publish(&n.name, removed(old));
    Ok(())
}

fn removed(old: Items) -> BTreeMap<String, StorageChange> {
    old.into_iter()
        .map(|(key, value)| {
            (
                key,
                StorageChange {
                    old_value: Some(value),
                    new_value: None,
                },
            )
        })
        .collect()
}
