use anyhow::{bail, Result};
use futures::future::{BoxFuture, FutureExt};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::rusqlite::{params, OpenFlags, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::Value;

use crate::storage::area::StorageArea;
use crate::storage::types::{Items, KeySpec};

type SqlitePool = Pool<SqliteConnectionManager>;

/// SQLite-based storage area. Several areas may share one database file; rows
/// are keyed by `(area, key)` and values are stored as JSON text.
pub struct SqliteArea {
    pool: SqlitePool,
    area: String,
    quota_bytes: Option<usize>,
    max_items: Option<usize>,
}

impl SqliteArea {
    /// Opens (or creates) the database at `path` and returns the area `area` in it.
    pub fn open(path: &str, area: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )
            .with_init(|c| {
                c.busy_timeout(std::time::Duration::from_millis(500))?;
                c.pragma_update(None, "journal_mode", "WAL")?;
                c.execute_batch(
                    "CREATE TABLE IF NOT EXISTS extension_storage (
                        area TEXT NOT NULL,
                        key TEXT NOT NULL,
                        value TEXT NOT NULL,
                        updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now')),
                        PRIMARY KEY(area, key)
                    );",
                )?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(std::time::Duration::from_secs(5))
            .build(manager)?;

        Ok(Self {
            pool,
            area: area.to_string(),
            quota_bytes: None,
            max_items: None,
        })
    }

    /// Sets the limits enforced on writes.
    pub fn with_limits(mut self, quota_bytes: Option<usize>, max_items: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self.max_items = max_items;
        self
    }

    /// Runs `f` on a pooled connection on the blocking thread pool.
    fn blocking<T, F>(&self, f: F) -> BoxFuture<'static, Result<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut PooledConnection<SqliteConnectionManager>, &AreaCtx) -> Result<T>
            + Send
            + 'static,
    {
        let pool = self.pool.clone();
        let ctx = AreaCtx {
            area: self.area.clone(),
            quota_bytes: self.quota_bytes,
            max_items: self.max_items,
        };
        async move {
            tokio::task::spawn_blocking(move || -> Result<T> {
                let mut conn = pool.get()?;
                f(&mut conn, &ctx)
            })
            .await
            .unwrap_or_else(|e| Err(e.into()))
        }
        .boxed()
    }
}

struct AreaCtx {
    area: String,
    quota_bytes: Option<usize>,
    max_items: Option<usize>,
}

fn decode(raw: String) -> Result<Value> {
    Ok(serde_json::from_str(&raw)?)
}

fn load(conn: &PooledConnection<SqliteConnectionManager>, ctx: &AreaCtx, keys: &KeySpec) -> Result<Items> {
    let mut found = Items::new();
    match keys.keys() {
        None => {
            let mut stmt = conn.prepare("SELECT key, value FROM extension_storage WHERE area=?1")?;
            let rows = stmt.query_map(params![ctx.area], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (k, v) = row?;
                found.insert(k, decode(v)?);
            }
        }
        Some(list) => {
            let mut stmt = conn.prepare("SELECT value FROM extension_storage WHERE area=?1 AND key=?2")?;
            for key in list {
                let raw = stmt
                    .query_row(params![ctx.area, key], |row| row.get::<_, String>(0))
                    .optional()?;
                if let Some(raw) = raw {
                    found.insert(key, decode(raw)?);
                }
            }
        }
    }
    Ok(keys.select(&found))
}

impl StorageArea for SqliteArea {
    fn get(&self, keys: KeySpec) -> BoxFuture<'static, Result<Items>> {
        self.blocking(move |conn, ctx| load(conn, ctx, &keys))
    }

    fn set(&self, items: Items) -> BoxFuture<'static, Result<()>> {
        self.blocking(move |conn, ctx| {
            let tx = conn.transaction()?;
            for (key, value) in &items {
                tx.execute(
                    "INSERT INTO extension_storage(area,key,value) VALUES (?1,?2,?3)
                     ON CONFLICT(area,key) DO UPDATE
                     SET value=excluded.value, updated_at=strftime('%s','now')",
                    params![ctx.area, key, value.to_string()],
                )?;
            }

            if ctx.quota_bytes.is_some() || ctx.max_items.is_some() {
                let (count, used): (i64, i64) = tx.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                     FROM extension_storage WHERE area=?1",
                    params![ctx.area],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                // Returning before commit rolls the transaction back.
                if let Some(max) = ctx.max_items {
                    if count as usize > max {
                        bail!("MAX_ITEMS quota exceeded ({} > {})", count, max);
                    }
                }
                if let Some(quota) = ctx.quota_bytes {
                    if used as usize > quota {
                        bail!("QUOTA_BYTES quota exceeded ({} > {})", used, quota);
                    }
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    fn remove(&self, keys: Vec<String>) -> BoxFuture<'static, Result<()>> {
        self.blocking(move |conn, ctx| {
            let tx = conn.transaction()?;
            for key in &keys {
                tx.execute(
                    "DELETE FROM extension_storage WHERE area=?1 AND key=?2",
                    params![ctx.area, key],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'static, Result<()>> {
        self.blocking(move |conn, ctx| {
            conn.execute("DELETE FROM extension_storage WHERE area=?1", params![ctx.area])?;
            Ok(())
        })
    }

    fn bytes_in_use(&self, keys: KeySpec) -> BoxFuture<'static, Result<usize>> {
        self.blocking(move |conn, ctx| {
            let stored = match keys {
                KeySpec::WithDefaults(defaults) => {
                    load(conn, ctx, &KeySpec::Many(defaults.into_keys().collect()))?
                }
                other => load(conn, ctx, &other)?,
            };
            Ok(stored
                .iter()
                .map(|(k, v)| crate::storage::types::entry_size(k, v))
                .sum())
        })
    }
}
