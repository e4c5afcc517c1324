//! Storage system for extension key/value data.
//!
//! This module defines the traits, types, and implementations behind the
//! extension storage API: several named **areas** (`local`, `sync`,
//! `session`, ...) each holding JSON values under string keys, plus one
//! host-wide feed of change notifications.
//!
//! # Concepts
//!
//! - A **host** ([`StorageHost`]) owns the areas and the change feed. The
//!   crate ships [`ExtensionStorage`], a host built from in-memory or SQLite
//!   backed areas, but any implementation of the trait can be plugged in.
//! - An **area** ([`StorageArea`]) offers asynchronous `get`, `set`, `remove`
//!   and `clear`. Host failures are reported as raw [`anyhow::Error`]s.
//! - The **facade** ([`StorageFacade`]) is what application code talks to. It
//!   resolves the target area (falling back to a configurable default area),
//!   wraps host failures in [`StorageError`](crate::StorageError), and
//!   multicasts changes to filtered listeners.
//!
//! Listeners only ever see the *new* value of a changed key: the old value the
//! host reports is dropped when a [`ChangeBatch`] is built.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use extension_storage::{ChangeFilter, ExtensionStorage, StorageConfig, StorageFacade};
//!
//! # async fn run() -> extension_storage::Result<()> {
//! let host = Arc::new(ExtensionStorage::from_config(&StorageConfig::default()).unwrap());
//! let storage = StorageFacade::new(host)?;
//!
//! let handle = storage.add_change_listener(
//!     |batch| println!("{} changed in {}", batch.len(), batch.area()),
//!     ChangeFilter::keys(["token"]),
//! );
//!
//! storage.set_one("token", "abc", None).await?;
//! storage.sync(None, None).await?;
//! storage.remove_change_listener(&handle);
//! # Ok(())
//! # }
//! ```

/// Storage area module, defining the per-area and host interfaces.
pub mod area;
/// Event module, providing host change events and listener change batches.
pub mod event;
/// Facade module, the convenience API used by application code.
pub mod facade;
/// Listener registry module.
pub mod listeners;
/// Service module, providing a host built from configured area backends.
pub mod service;
/// Storage types
pub mod types;

/// Area backends.
pub mod local {
    /// In-memory area implementation.
    pub mod in_memory;
    /// SQLite-backed area implementation.
    #[cfg(feature = "sqlite_store")]
    pub mod sqlite_store;
}

pub use area::{StorageArea, StorageHost};
pub use event::{ChangeBatch, ChangeRecord, HostChangeEvent, StorageChange};
pub use facade::StorageFacade;
pub use listeners::{ChangeFilter, ListenerHandle, ListenerRegistry};
pub use local::in_memory::InMemoryArea;
#[cfg(feature = "sqlite_store")]
pub use local::sqlite_store::SqliteArea;
pub use service::{ExtensionStorage, ExtensionStorageBuilder, Subscription};
pub use types::{Items, KeyList, KeySpec};
