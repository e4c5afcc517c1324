use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host-native change of one key, carrying both the previous and the new value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageChange {
    /// Value before the mutation, `None` if the key did not exist
    pub old_value: Option<Value>,
    /// Value after the mutation, `None` if the key was removed
    pub new_value: Option<Value>,
}

/// One notification from the host's change feed: every key changed by a single
/// mutation, scoped to one area.
#[derive(Clone, Debug, PartialEq)]
pub struct HostChangeEvent {
    pub area: String,
    pub changes: BTreeMap<String, StorageChange>,
}

/// The value of a key after a change. Only the new value is kept; a `None`
/// value means the key was removed.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRecord {
    pub new_value: Option<Value>,
}

/// Immutable set of key changes delivered to listeners. Cloning is cheap and
/// every listener of an event shares the same underlying data.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeBatch {
    area: Arc<str>,
    changes: Arc<BTreeMap<String, ChangeRecord>>,
}

impl ChangeBatch {
    pub fn new(area: &str, changes: BTreeMap<String, ChangeRecord>) -> Self {
        Self {
            area: Arc::from(area),
            changes: Arc::new(changes),
        }
    }

    /// Builds a batch from a host event, dropping the old values.
    pub fn from_host(event: &HostChangeEvent) -> Self {
        let changes = event
            .changes
            .iter()
            .map(|(key, change)| {
                (
                    key.clone(),
                    ChangeRecord {
                        new_value: change.new_value.clone(),
                    },
                )
            })
            .collect();
        Self::new(&event.area, changes)
    }

    /// Area the changes happened in.
    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn get(&self, key: &str) -> Option<&ChangeRecord> {
        self.changes.get(key)
    }

    /// New value of `key`, or `None` when the key is not part of this batch or
    /// was removed.
    pub fn new_value(&self, key: &str) -> Option<&Value> {
        self.changes.get(key).and_then(|c| c.new_value.as_ref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChangeRecord)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns a batch restricted to the keys accepted by `keep`. The batch is
    /// shared as-is when nothing gets filtered out.
    pub fn retain_keys<F>(&self, keep: F) -> ChangeBatch
    where
        F: Fn(&str) -> bool,
    {
        if self.changes.keys().all(|k| keep(k)) {
            return self.clone();
        }
        let changes = self
            .changes
            .iter()
            .filter(|(k, _)| keep(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ChangeBatch {
            area: self.area.clone(),
            changes: Arc::new(changes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host_event() -> HostChangeEvent {
        let mut changes = BTreeMap::new();
        changes.insert(
            "count".to_string(),
            StorageChange {
                old_value: Some(json!(1)),
                new_value: Some(json!(2)),
            },
        );
        changes.insert(
            "gone".to_string(),
            StorageChange {
                old_value: Some(json!("x")),
                new_value: None,
            },
        );
        HostChangeEvent {
            area: "sync".into(),
            changes,
        }
    }

    #[test]
    fn from_host_keeps_only_new_values() {
        let batch = ChangeBatch::from_host(&host_event());

        assert_eq!(batch.area(), "sync");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.new_value("count"), Some(&json!(2)));
        assert!(batch.contains_key("gone"));
        assert_eq!(batch.new_value("gone"), None);
        assert_eq!(batch.get("gone"), Some(&ChangeRecord { new_value: None }));
    }

    #[test]
    fn iter_walks_records_in_key_order() {
        let batch = ChangeBatch::from_host(&host_event());
        let seen: Vec<_> = batch
            .iter()
            .map(|(key, record)| (key, record.new_value.clone()))
            .collect();
        assert_eq!(seen, vec![("count", Some(json!(2))), ("gone", None)]);
    }

    #[test]
    fn retain_keys_filters_without_touching_original() {
        let batch = ChangeBatch::from_host(&host_event());
        let only_count = batch.retain_keys(|k| k == "count");

        assert_eq!(only_count.keys().collect::<Vec<_>>(), vec!["count"]);
        assert_eq!(only_count.area(), "sync");
        // Original unaffected
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn retain_all_shares_the_same_data() {
        let batch = ChangeBatch::from_host(&host_event());
        let same = batch.retain_keys(|_| true);
        assert!(Arc::ptr_eq(&batch.changes, &same.changes));
    }

    #[test]
    fn storage_change_serializes_with_both_values() {
        let change = StorageChange {
            old_value: None,
            new_value: Some(json!("hello")),
        };
        let s = serde_json::to_string(&change).unwrap();
        assert_eq!(s, r#"{"old_value":null,"new_value":"hello"}"#);
    }
}
