use std::fmt::Display;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use super::event::ChangeBatch;
use super::types::KeyList;

/// Token returned when a change listener is registered. Pass it back to
/// unregister exactly that registration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle(Uuid);

impl ListenerHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Restricts which change batches reach a listener.
///
/// With `areas` set, only batches from one of those areas are delivered. With
/// `keys` set, only batches touching at least one of those keys are delivered,
/// and the delivered batch contains just the matching keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    pub keys: Option<KeyList>,
    pub areas: Option<KeyList>,
}

impl ChangeFilter {
    /// A filter letting every batch through.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn keys(keys: impl Into<KeyList>) -> Self {
        Self::default().with_keys(keys)
    }

    pub fn areas(areas: impl Into<KeyList>) -> Self {
        Self::default().with_areas(areas)
    }

    pub fn with_keys(mut self, keys: impl Into<KeyList>) -> Self {
        self.keys = Some(keys.into());
        self
    }

    pub fn with_areas(mut self, areas: impl Into<KeyList>) -> Self {
        self.areas = Some(areas.into());
        self
    }

    /// Returns the part of `batch` this filter lets through, or `None` when the
    /// listener must not be invoked.
    pub fn apply(&self, batch: &ChangeBatch) -> Option<ChangeBatch> {
        if let Some(areas) = &self.areas {
            if !areas.contains(batch.area()) {
                return None;
            }
        }

        let mine = match &self.keys {
            Some(keys) => batch.retain_keys(|k| keys.contains(k)),
            None => batch.clone(),
        };
        (!mine.is_empty()).then_some(mine)
    }
}

type Callback = Arc<dyn Fn(&ChangeBatch) + Send + Sync>;

struct Registration {
    handle: ListenerHandle,
    filter: ChangeFilter,
    callback: Callback,
}

/// Ordered collection of change listeners. Listeners are invoked in
/// registration order; registering the same callback twice yields two
/// independent registrations.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<Registration>>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` behind `filter` and returns its handle.
    pub fn add<F>(&self, callback: F, filter: ChangeFilter) -> ListenerHandle
    where
        F: Fn(&ChangeBatch) + Send + Sync + 'static,
    {
        let handle = ListenerHandle::new();
        let registration = Arc::new(Registration {
            handle,
            filter,
            callback: Arc::new(callback),
        });
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(registration);
        handle
    }

    /// Unregisters the listener behind `handle`. Returns `false` if it was not
    /// registered (anymore).
    pub fn remove(&self, handle: &ListenerHandle) -> bool {
        let mut guard = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        match guard.iter().position(|r| r.handle == *handle) {
            Some(idx) => {
                guard.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: &ListenerHandle) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|r| r.handle == *handle)
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `batch` to every listener whose filter accepts it and returns
    /// how many were invoked.
    ///
    /// Runs over a snapshot taken before the first listener is called, so
    /// listeners added or removed from inside a callback do not affect this
    /// pass.
    pub fn dispatch(&self, batch: &ChangeBatch) -> usize {
        let snapshot: Vec<Arc<Registration>> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut invoked = 0;
        for registration in snapshot {
            if let Some(mine) = registration.filter.apply(batch) {
                (registration.callback)(&mine);
                invoked += 1;
            }
        }
        invoked
    }
}
