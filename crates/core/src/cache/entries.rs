//! Captured response entries.
//!
//! Provides the stored response snapshot and the row-level operations
//! used by [`CacheStore`](super::CacheStore).

use super::connection::CacheDb;
use super::key::compute_cache_key;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A captured HTTP response, keyed by the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// RFC 3339 capture timestamp.
    pub stored_at: String,
}

type EntryRow = (String, String, u16, String, Vec<u8>, String);

const ENTRY_COLUMNS: &str = "e.method, e.url, e.status, e.headers_json, e.body, e.stored_at";

impl CachedResponse {
    pub fn key_hash(&self) -> String {
        compute_cache_key(&self.method, &self.url)
    }

    /// First header value matching `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.stored_at)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }

    /// When the response was produced.
    ///
    /// Reads the `Date` header; falls back to the capture timestamp when the
    /// header is absent or unparseable.
    pub fn response_date(&self) -> Option<DateTime<Utc>> {
        self.header("date")
            .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
            .map(|d| d.with_timezone(&Utc))
            .or_else(|| self.stored_at())
    }

    fn from_row(row: EntryRow) -> Result<Self, Error> {
        let (method, url, status, headers_json, body, stored_at) = row;
        let headers = serde_json::from_str(&headers_json)?;
        Ok(Self { method, url, status, headers, body, stored_at })
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

/// Upsert one entry into the named store; writes nothing if the store is missing.
pub(super) fn upsert_entry(
    conn: &rusqlite::Connection, store: &str, response: &CachedResponse,
) -> Result<usize, Error> {
    let headers_json = serde_json::to_string(&response.headers)?;
    let count = conn.execute(
        "INSERT INTO entries (store_id, key_hash, method, url, status, headers_json, body, stored_at)
         SELECT id, ?2, ?3, ?4, ?5, ?6, ?7, ?8 FROM stores WHERE name = ?1
         ON CONFLICT(store_id, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            store,
            response.key_hash(),
            &response.method,
            &response.url,
            response.status,
            headers_json,
            &response.body,
            &response.stored_at,
        ],
    )?;
    Ok(count)
}

impl CacheDb {
    /// Insert or replace an entry in an existing store.
    ///
    /// Returns false without writing when the store doesn't exist, so a
    /// retired version is never recreated by a late write.
    pub async fn put_entry(&self, store: &str, response: &CachedResponse) -> Result<bool, Error> {
        let store = store.to_string();
        let response = response.clone();
        self.conn
            .call(move |conn| -> Result<bool, Error> { Ok(upsert_entry(conn, &store, &response)? > 0) })
            .await
            .map_err(Error::from)
    }

    /// Get an entry from one store.
    ///
    /// Returns None if the store or the entry doesn't exist.
    pub async fn get_entry(&self, store: &str, key_hash: &str) -> Result<Option<CachedResponse>, Error> {
        let store = store.to_string();
        let key_hash = key_hash.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries e JOIN stores s ON s.id = e.store_id
                     WHERE s.name = ?1 AND e.key_hash = ?2"
                );
                match conn.query_row(&sql, params![store, key_hash], read_row) {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(CachedResponse::from_row).transpose()
    }

    /// Get an entry from whichever store holds it, oldest store first.
    pub async fn match_any(&self, key_hash: &str) -> Result<Option<CachedResponse>, Error> {
        let key_hash = key_hash.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries e JOIN stores s ON s.id = e.store_id
                     WHERE e.key_hash = ?1 ORDER BY s.id ASC LIMIT 1"
                );
                match conn.query_row(&sql, params![key_hash], read_row) {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(CachedResponse::from_row).transpose()
    }

    /// Request (method, url) pairs held by a store, in insertion order.
    pub async fn entry_keys(&self, store: &str) -> Result<Vec<(String, String)>, Error> {
        let store = store.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<(String, String)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.method, e.url FROM entries e JOIN stores s ON s.id = e.store_id
                     WHERE s.name = ?1 ORDER BY e.rowid ASC",
                )?;
                let keys = stmt
                    .query_map(params![store], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }
}
