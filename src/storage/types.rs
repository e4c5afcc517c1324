use std::collections::BTreeMap;

use serde_json::Value;

/// Area for data kept on the current device.
pub const LOCAL: &str = "local";
/// Area for data synced across the user's devices.
pub const SYNC: &str = "sync";
/// Area for data kept only for the lifetime of the browser session.
pub const SESSION: &str = "session";

/// Key/value entries of a storage area. Keys are unique within an area.
pub type Items = BTreeMap<String, Value>;

/// Selects which entries a `get` returns.
#[derive(Clone, Debug, PartialEq)]
pub enum KeySpec {
    /// Every entry in the area
    All,
    /// A single key
    One(String),
    /// Several keys; keys without an entry are left out of the result
    Many(Vec<String>),
    /// Keys with a fallback value returned when the key has no entry
    WithDefaults(Items),
}

impl KeySpec {
    /// Picks the selected entries out of a full area snapshot.
    pub fn select(&self, entries: &Items) -> Items {
        match self {
            KeySpec::All => entries.clone(),
            KeySpec::One(key) => entries
                .get_key_value(key)
                .map(|(k, v)| (k.clone(), v.clone()))
                .into_iter()
                .collect(),
            KeySpec::Many(keys) => keys
                .iter()
                .filter_map(|k| entries.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
            KeySpec::WithDefaults(defaults) => defaults
                .iter()
                .map(|(k, default)| (k.clone(), entries.get(k).unwrap_or(default).clone()))
                .collect(),
        }
    }

    /// Keys named explicitly, or `None` when everything is selected.
    pub fn keys(&self) -> Option<Vec<String>> {
        match self {
            KeySpec::All => None,
            KeySpec::One(key) => Some(vec![key.clone()]),
            KeySpec::Many(keys) => Some(keys.clone()),
            KeySpec::WithDefaults(defaults) => Some(defaults.keys().cloned().collect()),
        }
    }
}

impl From<&str> for KeySpec {
    fn from(key: &str) -> Self {
        KeySpec::One(key.to_string())
    }
}

impl From<String> for KeySpec {
    fn from(key: String) -> Self {
        KeySpec::One(key)
    }
}

impl From<Vec<String>> for KeySpec {
    fn from(keys: Vec<String>) -> Self {
        KeySpec::Many(keys)
    }
}

impl From<Vec<&str>> for KeySpec {
    fn from(keys: Vec<&str>) -> Self {
        KeySpec::Many(keys.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeySpec {
    fn from(keys: [&str; N]) -> Self {
        KeySpec::Many(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl From<Items> for KeySpec {
    fn from(defaults: Items) -> Self {
        KeySpec::WithDefaults(defaults)
    }
}

impl From<KeyList> for KeySpec {
    fn from(list: KeyList) -> Self {
        KeySpec::Many(list.0)
    }
}

/// One key or a list of keys, as accepted by `remove` and listener filters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyList(Vec<String>);

impl KeyList {
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for KeyList {
    fn from(key: &str) -> Self {
        KeyList(vec![key.to_string()])
    }
}

impl From<String> for KeyList {
    fn from(key: String) -> Self {
        KeyList(vec![key])
    }
}

impl From<&String> for KeyList {
    fn from(key: &String) -> Self {
        KeyList(vec![key.clone()])
    }
}

impl From<Vec<String>> for KeyList {
    fn from(keys: Vec<String>) -> Self {
        KeyList(keys)
    }
}

impl From<Vec<&str>> for KeyList {
    fn from(keys: Vec<&str>) -> Self {
        KeyList(keys.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeyList {
    fn from(keys: [&str; N]) -> Self {
        KeyList(keys.iter().map(|k| k.to_string()).collect())
    }
}

/// Approximate stored size of an entry, the way the host accounts for quota:
/// the key plus the JSON encoding of the value.
pub fn entry_size(key: &str, value: &Value) -> usize {
    key.len() + value.to_string().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries() -> Items {
        let mut m = Items::new();
        m.insert("a".into(), json!(1));
        m.insert("b".into(), json!("two"));
        m.insert("c".into(), json!({"nested": true}));
        m
    }

    #[test]
    fn select_all_returns_everything() {
        assert_eq!(KeySpec::All.select(&entries()), entries());
    }

    #[test]
    fn select_one_and_missing_one() {
        let got = KeySpec::from("b").select(&entries());
        assert_eq!(got.len(), 1);
        assert_eq!(got["b"], json!("two"));

        assert!(KeySpec::from("zzz").select(&entries()).is_empty());
    }

    #[test]
    fn select_many_skips_missing_keys() {
        let got = KeySpec::from(["a", "c", "missing"]).select(&entries());
        assert_eq!(got.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn select_with_defaults_fills_missing_keys() {
        let mut defaults = Items::new();
        defaults.insert("a".into(), json!(0));
        defaults.insert("missing".into(), json!("fallback"));

        let got = KeySpec::from(defaults).select(&entries());
        assert_eq!(got.len(), 2);
        assert_eq!(got["a"], json!(1));
        assert_eq!(got["missing"], json!("fallback"));
    }

    #[test]
    fn keys_of_all_is_none() {
        assert_eq!(KeySpec::All.keys(), None);
        assert_eq!(KeySpec::from("x").keys(), Some(vec!["x".to_string()]));
    }

    #[test]
    fn key_list_from_single_and_many() {
        assert!(KeyList::from("a").contains("a"));
        let list = KeyList::from(vec!["a", "b"]);
        assert!(list.contains("b"));
        assert!(!list.contains("c"));
        assert_eq!(list.into_vec(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn entry_size_counts_key_and_json_value() {
        assert_eq!(entry_size("k", &json!("v")), 1 + 3);
        assert_eq!(entry_size("num", &json!(42)), 3 + 2);
    }
}
