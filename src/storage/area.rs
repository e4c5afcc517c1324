use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;

use super::service::Subscription;
use super::types::{Items, KeySpec};

/// Object-safe, asynchronous key/value storage area as provided by the host.
///
/// Every operation completes at most once. A failure is the host's raw error;
/// callers do not inspect or classify it.
pub trait StorageArea: Send + Sync {
    /// Retrieves the entries selected by `keys`.
    fn get(&self, keys: KeySpec) -> BoxFuture<'static, Result<Items>>;

    /// Writes every entry in `items`, overwriting existing values.
    fn set(&self, items: Items) -> BoxFuture<'static, Result<()>>;

    /// Removes the given keys. Keys without an entry are ignored.
    fn remove(&self, keys: Vec<String>) -> BoxFuture<'static, Result<()>>;

    /// Removes every entry in the area.
    fn clear(&self) -> BoxFuture<'static, Result<()>>;

    /// Returns the number of bytes used by the entries selected by `keys`.
    fn bytes_in_use(&self, keys: KeySpec) -> BoxFuture<'static, Result<usize>>;
}

/// The environment providing the named storage areas and the single change
/// feed shared by all of them.
pub trait StorageHost: Send + Sync {
    /// Returns the area with the given name, or `None` when the host has no
    /// such area.
    fn area(&self, name: &str) -> Option<Arc<dyn StorageArea>>;

    /// Names of all areas this host provides.
    fn area_names(&self) -> Vec<String>;

    /// Subscribes to change events of every area.
    fn subscribe(&self) -> Subscription;
}
