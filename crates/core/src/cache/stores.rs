//! Named store operations.
//!
//! A store is one versioned namespace of entries. Stores are created when
//! opened and removed whole when their version is retired.

use super::connection::CacheDb;
use super::entries::{CachedResponse, upsert_entry};
use super::key::compute_cache_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// Summary of one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoreInfo {
    pub name: String,
    pub created_at: String,
    pub entries: u64,
}

/// Handle to a single named store.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: CacheDb,
    name: String,
}

impl CacheStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The database holding every store, for lookups that span versions.
    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Look up the entry for a request.
    pub async fn get(&self, method: &str, url: &str) -> Result<Option<CachedResponse>, Error> {
        self.db.get_entry(&self.name, &compute_cache_key(method, url)).await
    }

    /// Store a response under the request it records, replacing any prior entry.
    ///
    /// Writes to a store that has been deleted are dropped.
    pub async fn put(&self, response: &CachedResponse) -> Result<(), Error> {
        if !self.db.put_entry(&self.name, response).await? {
            tracing::debug!(store = %self.name, url = %response.url, "store is gone; entry dropped");
        }
        Ok(())
    }

    pub async fn keys(&self) -> Result<Vec<(String, String)>, Error> {
        self.db.entry_keys(&self.name).await
    }
}

impl CacheDb {
    /// Open a store by name, creating it if it doesn't exist.
    pub async fn open_store(&self, name: &str) -> Result<CacheStore, Error> {
        let owned = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let created = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
                    params![owned, now],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)?;

        if created {
            tracing::debug!(store = name, "created cache store");
        }

        Ok(CacheStore { db: self.clone(), name: name.to_string() })
    }

    /// Open a store and write `responses` into it in a single transaction.
    ///
    /// On error nothing is written: a store created by this call is rolled
    /// back along with its entries.
    pub async fn seed_store(&self, name: &str, responses: Vec<CachedResponse>) -> Result<CacheStore, Error> {
        let owned = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let written = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
                    params![owned, now],
                )?;
                for response in &responses {
                    upsert_entry(&tx, &owned, response)?;
                }
                tx.commit()?;
                Ok(responses.len())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(store = name, entries = written, "seeded cache store");
        Ok(self.store(name))
    }

    /// Handle to a store without creating it.
    ///
    /// Reads against a missing store find nothing and writes are dropped.
    pub fn store(&self, name: &str) -> CacheStore {
        CacheStore { db: self.clone(), name: name.to_string() }
    }

    /// Names of every store, oldest first.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY id ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and all of its entries.
    ///
    /// Returns false if no store had that name.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Every store with its entry count, oldest first.
    pub async fn list_stores(&self) -> Result<Vec<StoreInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<StoreInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT s.name, s.created_at, COUNT(e.key_hash)
                     FROM stores s LEFT JOIN entries e ON e.store_id = s.id
                     GROUP BY s.id ORDER BY s.id ASC",
                )?;
                let stores = stmt
                    .query_map([], |row| {
                        Ok(StoreInfo {
                            name: row.get(0)?,
                            created_at: row.get(1)?,
                            entries: row.get::<_, i64>(2)? as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(stores)
            })
            .await
            .map_err(Error::from)
    }
}
