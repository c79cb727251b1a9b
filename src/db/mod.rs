pub mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Shared durable store for cached responses and queued records.
///
/// The connection is opened once, handed to the components that need it, and
/// released with [`Database::close`] (or on drop). There is no ambient global
/// handle.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;

    Ok(db)
  }

  /// Open an in-memory database. Used by tests and throwaway runs.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;

    Ok(db)
  }

  /// Run database migrations.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;

    Ok(())
  }

  /// Acquire the connection.
  pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Close the connection explicitly, surfacing any flush error.
  pub fn close(self) -> Result<()> {
    let conn = self
      .conn
      .into_inner()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .close()
      .map_err(|(_, e)| eyre!("Failed to close database: {}", e))
  }
}

/// Render a timestamp in the fixed-width RFC 3339 form stored in sqlite.
///
/// The fixed `.ffffffZ` shape keeps lexicographic and chronological order
/// identical, which the expiration sweeps rely on.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp previously written by [`timestamp`].
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse timestamp '{}': {}", s, e))
}
