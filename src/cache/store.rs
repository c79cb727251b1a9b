//! Partitioned response cache over the shared database.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use http::StatusCode;
use rusqlite::params;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

use crate::db::{self, Database};

use super::response::FetchResponse;

/// Named cache partition classes.
///
/// Each partition holds one class of cached responses and expires on its own
/// schedule. Stored partition names carry the cache version, so a version
/// bump retires every old partition at the next activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
  /// Precached assets and cache-first fills; versioned, not age-swept
  Static,
  /// Navigations and other same-origin responses; swept by age
  Dynamic,
  /// Allowlisted API reads; swept by age
  Api,
}

impl Partition {
  pub const ALL: [Partition; 3] = [Partition::Static, Partition::Dynamic, Partition::Api];

  pub fn prefix(self) -> &'static str {
    match self {
      Partition::Static => "static",
      Partition::Dynamic => "dynamic",
      Partition::Api => "api",
    }
  }

  /// Versioned partition name as stored on disk, e.g. `static-v1`.
  pub fn qualified(self, version: u32) -> String {
    format!("{}-v{}", self.prefix(), version)
  }
}

/// A cache hit along with its storage timestamp.
#[derive(Debug, Clone)]
pub struct CachedHit {
  pub response: FetchResponse,
  pub stored_at: DateTime<Utc>,
}

/// Response cache backed by the shared sqlite store.
pub struct CacheStore {
  db: Arc<Database>,
  version: u32,
}

impl CacheStore {
  pub fn new(db: Arc<Database>, version: u32) -> Self {
    Self { db, version }
  }

  fn name(&self, partition: Partition) -> String {
    partition.qualified(self.version)
  }

  /// Store a response, overwriting any previous entry for the same URL.
  pub fn put(&self, partition: Partition, url: &Url, response: &FetchResponse) -> Result<()> {
    self.put_at(partition, url, response, Utc::now())
  }

  fn put_at(
    &self,
    partition: Partition,
    url: &Url,
    response: &FetchResponse,
    stored_at: DateTime<Utc>,
  ) -> Result<()> {
    let headers = serde_json::to_vec(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    self
      .db
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO response_cache (partition, url_hash, url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          self.name(partition),
          url_key(url),
          response.url.as_str(),
          response.status.as_u16(),
          headers,
          response.body,
          db::timestamp(stored_at),
        ],
      )
      .map_err(|e| eyre!("Failed to store cached response: {}", e))?;

    Ok(())
  }

  /// Look up the cached response for this exact URL, if any.
  pub fn get(&self, partition: Partition, url: &Url) -> Result<Option<CachedHit>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT url, status, headers, body, stored_at FROM response_cache
         WHERE partition = ? AND url_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare cache lookup: {}", e))?;

    let row: Option<(String, u16, Vec<u8>, Vec<u8>, String)> = stmt
      .query_row(params![self.name(partition), url_key(url)], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
      })
      .ok();

    let (stored_url, status, headers, body, stored_at) = match row {
      Some(row) => row,
      None => return Ok(None),
    };

    let response = FetchResponse {
      url: Url::parse(&stored_url).map_err(|e| eyre!("Corrupt cached url '{}': {}", stored_url, e))?,
      status: StatusCode::from_u16(status).map_err(|e| eyre!("Corrupt cached status: {}", e))?,
      headers: serde_json::from_slice(&headers)
        .map_err(|e| eyre!("Corrupt cached headers: {}", e))?,
      body,
    };

    Ok(Some(CachedHit {
      response,
      stored_at: db::parse_timestamp(&stored_at)?,
    }))
  }

  /// Delete entries older than the partition's expiration window.
  /// Returns the number of purged entries.
  pub fn sweep(&self, partition: Partition, max_age: Duration) -> Result<usize> {
    let cutoff = db::timestamp(Utc::now() - max_age);

    let purged = self
      .db
      .lock()?
      .execute(
        "DELETE FROM response_cache WHERE partition = ? AND stored_at < ?",
        params![self.name(partition), cutoff],
      )
      .map_err(|e| eyre!("Failed to sweep partition: {}", e))?;

    Ok(purged)
  }

  /// Delete every entry belonging to a partition outside the current named
  /// set (version rollover). Returns the number of retired entries.
  pub fn retire_unknown(&self) -> Result<usize> {
    let retired = self
      .db
      .lock()?
      .execute(
        "DELETE FROM response_cache WHERE partition NOT IN (?, ?, ?)",
        params![
          self.name(Partition::Static),
          self.name(Partition::Dynamic),
          self.name(Partition::Api),
        ],
      )
      .map_err(|e| eyre!("Failed to retire stale partitions: {}", e))?;

    Ok(retired)
  }

  /// Number of entries currently held in a partition.
  pub fn entry_count(&self, partition: Partition) -> Result<usize> {
    let conn = self.db.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM response_cache WHERE partition = ?",
        params![self.name(partition)],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count cache entries: {}", e))?;

    Ok(count as usize)
  }
}

/// Fixed-length cache key for a request URL.
fn url_key(url: &Url) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_str().as_bytes());
  hex::encode(hasher.finalize())
}
