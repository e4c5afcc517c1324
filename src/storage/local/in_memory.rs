use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use futures::future::{self, BoxFuture, FutureExt};

use crate::storage::area::StorageArea;
use crate::storage::types::{entry_size, Items, KeySpec};

/// In‑memory storage area (no persistence). Used for `session`-like areas,
/// for tests, and as the default when no backend is configured.
#[derive(Default)]
pub struct InMemoryArea {
    entries: RwLock<Items>,
    quota_bytes: Option<usize>,
    max_items: Option<usize>,
}

impl InMemoryArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an area that rejects writes growing it beyond the given limits.
    pub fn with_limits(quota_bytes: Option<usize>, max_items: Option<usize>) -> Self {
        Self {
            entries: RwLock::new(Items::new()),
            quota_bytes,
            max_items,
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Items>> {
        self.entries.read().map_err(|_| anyhow!("storage area lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Items>> {
        self.entries.write().map_err(|_| anyhow!("storage area lock poisoned"))
    }

    fn get_now(&self, keys: &KeySpec) -> Result<Items> {
        Ok(keys.select(&*self.read()?))
    }

    fn set_now(&self, items: Items) -> Result<()> {
        let mut guard = self.write()?;

        // Check limits on the would-be state so a rejected write changes nothing.
        let mut next = guard.clone();
        next.extend(items);
        if let Some(max) = self.max_items {
            if next.len() > max {
                bail!("MAX_ITEMS quota exceeded ({} > {})", next.len(), max);
            }
        }
        if let Some(quota) = self.quota_bytes {
            let used: usize = next.iter().map(|(k, v)| entry_size(k, v)).sum();
            if used > quota {
                bail!("QUOTA_BYTES quota exceeded ({} > {})", used, quota);
            }
        }

        *guard = next;
        Ok(())
    }

    fn remove_now(&self, keys: &[String]) -> Result<()> {
        let mut guard = self.write()?;
        for key in keys {
            guard.remove(key);
        }
        Ok(())
    }

    fn clear_now(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    fn bytes_now(&self, keys: &KeySpec) -> Result<usize> {
        let guard = self.read()?;
        let selected = match keys {
            // Defaults are not stored, so they never count.
            KeySpec::WithDefaults(defaults) => {
                KeySpec::Many(defaults.keys().cloned().collect()).select(&guard)
            }
            other => other.select(&guard),
        };
        Ok(selected.iter().map(|(k, v)| entry_size(k, v)).sum())
    }
}

impl StorageArea for InMemoryArea {
    fn get(&self, keys: KeySpec) -> BoxFuture<'static, Result<Items>> {
        future::ready(self.get_now(&keys)).boxed()
    }

    fn set(&self, items: Items) -> BoxFuture<'static, Result<()>> {
        future::ready(self.set_now(items)).boxed()
    }

    fn remove(&self, keys: Vec<String>) -> BoxFuture<'static, Result<()>> {
        future::ready(self.remove_now(&keys)).boxed()
    }

    fn clear(&self) -> BoxFuture<'static, Result<()>> {
        future::ready(self.clear_now()).boxed()
    }

    fn bytes_in_use(&self, keys: KeySpec) -> BoxFuture<'static, Result<usize>> {
        future::ready(self.bytes_now(&keys)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(pairs: &[(&str, serde_json::Value)]) -> Items {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn area_contract() {
        let area = InMemoryArea::new();

        area.set(items(&[("a", json!(1)), ("b", json!([1, 2]))])).await.unwrap();
        assert_eq!(area.get(KeySpec::All).await.unwrap().len(), 2);
        assert_eq!(area.get("b".into()).await.unwrap()["b"], json!([1, 2]));

        area.remove(vec!["a".into(), "nope".into()]).await.unwrap();
        assert_eq!(area.get(KeySpec::All).await.unwrap().keys().collect::<Vec<_>>(), vec!["b"]);

        area.clear().await.unwrap();
        assert!(area.get(KeySpec::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quota_rejects_write_and_keeps_state() {
        let area = InMemoryArea::with_limits(Some(10), None);
        area.set(items(&[("k", json!("v"))])).await.unwrap();

        let err = area
            .set(items(&[("big", json!("this value is too large"))]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("QUOTA_BYTES"));

        let all = area.get(KeySpec::All).await.unwrap();
        assert_eq!(all, items(&[("k", json!("v"))]));
    }

    #[tokio::test]
    async fn max_items_counts_overwrites_once() {
        let area = InMemoryArea::with_limits(None, Some(2));
        area.set(items(&[("a", json!(1)), ("b", json!(2))])).await.unwrap();

        // overwriting an existing key does not grow the area
        area.set(items(&[("a", json!(10))])).await.unwrap();

        let err = area.set(items(&[("c", json!(3))])).await.unwrap_err();
        assert!(err.to_string().contains("MAX_ITEMS"));
        assert_eq!(area.get(KeySpec::All).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bytes_in_use_ignores_defaults() {
        let area = InMemoryArea::new();
        area.set(items(&[("ab", json!(12))])).await.unwrap();

        assert_eq!(area.bytes_in_use(KeySpec::All).await.unwrap(), 4);

        let defaults = items(&[("ab", json!(0)), ("missing", json!("default"))]);
        assert_eq!(area.bytes_in_use(KeySpec::WithDefaults(defaults)).await.unwrap(), 4);
    }
}
