use serde::Deserialize;

use crate::storage::types::{LOCAL, SESSION, SYNC};

/// Backend used to hold the entries of one storage area.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AreaBackend {
    /// Entries live in memory and are lost when the host goes away
    InMemory,
    /// Entries are persisted in a SQLite database file
    Sqlite { path: String },
}

/// Configuration of a single named storage area.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaConfig {
    /// Name under which the host exposes the area (ie: local, sync)
    pub name: String,
    #[serde(default = "default_backend")]
    pub backend: AreaBackend,
    /// Maximum number of bytes (JSON encoded key + value) the area may hold
    #[serde(default)]
    pub quota_bytes: Option<usize>,
    /// Maximum number of entries the area may hold
    #[serde(default)]
    pub max_items: Option<usize>,
}

fn default_backend() -> AreaBackend {
    AreaBackend::InMemory
}

impl AreaConfig {
    pub fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            backend: AreaBackend::InMemory,
            quota_bytes: None,
            max_items: None,
        }
    }
}

/// Main storage configuration. Describes the areas a host provides and the
/// defaults used by the facade.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Area used by facade calls that do not name one
    pub default_area: String,
    /// Source area for `sync()` when none is given
    pub sync_from: String,
    /// Destination area for `sync()` when none is given
    pub sync_to: String,
    /// Areas the host exposes
    pub areas: Vec<AreaConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_area: LOCAL.to_string(),
            sync_from: LOCAL.to_string(),
            sync_to: SYNC.to_string(),
            areas: vec![
                AreaConfig::in_memory(LOCAL),
                AreaConfig::in_memory(SYNC),
                AreaConfig::in_memory(SESSION),
            ],
        }
    }
}

impl StorageConfig {
    /// Parses a configuration from JSON. Missing fields fall back to the defaults.
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_local_and_syncs_to_sync() {
        let cfg = StorageConfig::default();
        assert_eq!(cfg.default_area, "local");
        assert_eq!(cfg.sync_from, "local");
        assert_eq!(cfg.sync_to, "sync");
        let names: Vec<_> = cfg.areas.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["local", "sync", "session"]);
    }

    #[test]
    fn json_config_fills_missing_fields() {
        let cfg = StorageConfig::from_json(
            r#"{
                "default_area": "sync",
                "areas": [
                    { "name": "local", "backend": { "kind": "sqlite", "path": "local.db" } },
                    { "name": "sync", "quota_bytes": 102400, "max_items": 512 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.default_area, "sync");
        assert_eq!(cfg.sync_to, "sync");
        assert_eq!(cfg.areas.len(), 2);
        assert_eq!(
            cfg.areas[0].backend,
            AreaBackend::Sqlite { path: "local.db".into() }
        );
        assert_eq!(cfg.areas[1].backend, AreaBackend::InMemory);
        assert_eq!(cfg.areas[1].quota_bytes, Some(102400));
        assert_eq!(cfg.areas[1].max_items, Some(512));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(StorageConfig::from_json("{ not json").is_err());
    }
}
