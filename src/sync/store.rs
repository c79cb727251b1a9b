//! Durable store for queued records, partitioned by record type.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Row};
use std::sync::Arc;

use crate::db::{self, Database};

use super::identity::RecordIdentity;
use super::record::{QueuedRecord, Syncable};

/// Per-type tallies for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
  pub pending: usize,
  pub synced: usize,
  pub dead: usize,
}

/// Record store backed by the shared sqlite database.
///
/// Every operation is an individually atomic step; a flush iterating many
/// records interleaves safely with concurrent enqueues.
#[derive(Clone)]
pub struct RecordStore {
  db: Arc<Database>,
}

impl RecordStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Insert or overwrite a record under its current identity.
  pub fn put<T: Syncable>(&self, record: &QueuedRecord<T>) -> Result<()> {
    let payload = serde_json::to_vec(&record.payload)
      .map_err(|e| eyre!("Failed to serialize record payload: {}", e))?;

    self
      .db
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO sync_records
           (record_type, record_id, payload, synced, dead, attempts, sort_key, created_at, updated_at)
         VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?)",
        params![
          T::record_type(),
          record.identity.as_str(),
          payload,
          record.synced,
          record.attempts,
          record.payload.sort_key(),
          db::timestamp(record.created_at),
          db::timestamp(record.updated_at),
        ],
      )
      .map_err(|e| eyre!("Failed to store record: {}", e))?;

    Ok(())
  }

  /// Fetch a record by its current identity.
  pub fn get<T: Syncable>(&self, identity: &RecordIdentity) -> Result<Option<QueuedRecord<T>>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT record_id, payload, synced, attempts, created_at, updated_at
         FROM sync_records WHERE record_type = ? AND record_id = ?",
      )
      .map_err(|e| eyre!("Failed to prepare record lookup: {}", e))?;

    let row = stmt
      .query_row(params![T::record_type(), identity.as_str()], decode_columns)
      .ok();

    row.map(decode_record::<T>).transpose()
  }

  /// Every record of this type with `synced = false`, excluding dead letters,
  /// in insertion order.
  pub fn unsynced<T: Syncable>(&self) -> Result<Vec<QueuedRecord<T>>> {
    self.select::<T>("synced = 0 AND dead = 0")
  }

  /// Records that exhausted their rejection budget and await intervention.
  pub fn dead_letters<T: Syncable>(&self) -> Result<Vec<QueuedRecord<T>>> {
    self.select::<T>("dead = 1")
  }

  fn select<T: Syncable>(&self, predicate: &str) -> Result<Vec<QueuedRecord<T>>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare(&format!(
        "SELECT record_id, payload, synced, attempts, created_at, updated_at
         FROM sync_records WHERE record_type = ? AND {predicate} ORDER BY rowid"
      ))
      .map_err(|e| eyre!("Failed to prepare record scan: {}", e))?;

    let rows: Vec<RawRecord> = stmt
      .query_map(params![T::record_type()], decode_columns)
      .map_err(|e| eyre!("Failed to scan records: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    rows.into_iter().map(decode_record::<T>).collect()
  }

  /// Re-key a record to its server-assigned identifier after a successful
  /// create: the placeholder-keyed row is deleted and the record reinserted
  /// under the new identity with `synced = true`, in one transaction.
  pub fn reassign<T: Syncable>(&self, from: &RecordIdentity, server_id: &str) -> Result<()> {
    let record = self
      .get::<T>(from)?
      .ok_or_else(|| eyre!("No {} record {} to reassign", T::record_type(), from))?;

    let payload = serde_json::to_vec(&record.payload)
      .map_err(|e| eyre!("Failed to serialize record payload: {}", e))?;

    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM sync_records WHERE record_type = ? AND record_id = ?",
      params![T::record_type(), from.as_str()],
    )
    .map_err(|e| eyre!("Failed to delete placeholder record: {}", e))?;

    tx.execute(
      "INSERT OR REPLACE INTO sync_records
         (record_type, record_id, payload, synced, dead, attempts, sort_key, created_at, updated_at)
       VALUES (?, ?, ?, 1, 0, ?, ?, ?, ?)",
      params![
        T::record_type(),
        server_id,
        payload,
        record.attempts,
        record.payload.sort_key(),
        db::timestamp(record.created_at),
        db::timestamp(Utc::now()),
      ],
    )
    .map_err(|e| eyre!("Failed to reinsert record under server id: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit reassignment: {}", e))?;

    Ok(())
  }

  /// Mark a record as acknowledged by the server and refresh `updated_at`.
  pub fn mark_synced<T: Syncable>(&self, identity: &RecordIdentity) -> Result<()> {
    self
      .db
      .lock()?
      .execute(
        "UPDATE sync_records SET synced = 1, updated_at = ?
         WHERE record_type = ? AND record_id = ?",
        params![db::timestamp(Utc::now()), T::record_type(), identity.as_str()],
      )
      .map_err(|e| eyre!("Failed to mark record synced: {}", e))?;

    Ok(())
  }

  /// Count a server rejection against the record. Returns the new tally.
  pub fn record_rejection<T: Syncable>(&self, identity: &RecordIdentity) -> Result<u32> {
    let conn = self.db.lock()?;

    conn
      .execute(
        "UPDATE sync_records SET attempts = attempts + 1
         WHERE record_type = ? AND record_id = ?",
        params![T::record_type(), identity.as_str()],
      )
      .map_err(|e| eyre!("Failed to record rejection: {}", e))?;

    let attempts: u32 = conn
      .query_row(
        "SELECT attempts FROM sync_records WHERE record_type = ? AND record_id = ?",
        params![T::record_type(), identity.as_str()],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to read rejection tally: {}", e))?;

    Ok(attempts)
  }

  /// Exclude a record from future flushes. It stays visible for inspection.
  pub fn mark_dead<T: Syncable>(&self, identity: &RecordIdentity) -> Result<()> {
    self
      .db
      .lock()?
      .execute(
        "UPDATE sync_records SET dead = 1 WHERE record_type = ? AND record_id = ?",
        params![T::record_type(), identity.as_str()],
      )
      .map_err(|e| eyre!("Failed to dead-letter record: {}", e))?;

    Ok(())
  }

  /// Pending/synced/dead tallies for one record type.
  pub fn counts(&self, record_type: &str) -> Result<StoreCounts> {
    let conn = self.db.lock()?;

    let (pending, synced, dead): (i64, i64, i64) = conn
      .query_row(
        "SELECT
           COALESCE(SUM(CASE WHEN synced = 0 AND dead = 0 THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN synced = 1 THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN dead = 1 THEN 1 ELSE 0 END), 0)
         FROM sync_records WHERE record_type = ?",
        params![record_type],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .map_err(|e| eyre!("Failed to count records: {}", e))?;

    Ok(StoreCounts {
      pending: pending as usize,
      synced: synced as usize,
      dead: dead as usize,
    })
  }
}

type RawRecord = (String, Vec<u8>, bool, u32, String, String);

fn decode_columns(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
  ))
}

fn decode_record<T: Syncable>(raw: RawRecord) -> Result<QueuedRecord<T>> {
  let (record_id, payload, synced, attempts, created_at, updated_at) = raw;

  Ok(QueuedRecord {
    identity: RecordIdentity::parse(&record_id),
    payload: serde_json::from_slice(&payload)
      .map_err(|e| eyre!("Corrupt payload for record {}: {}", record_id, e))?,
    synced,
    attempts,
    created_at: db::parse_timestamp(&created_at)?,
    updated_at: db::parse_timestamp(&updated_at)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;
  use serde::Serialize;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    text: String,
    day: String,
  }

  impl Syncable for Note {
    fn record_type() -> &'static str {
      "note"
    }

    fn resource() -> &'static str {
      "notes"
    }

    fn sync_tag() -> &'static str {
      "sync-notes"
    }

    fn sort_key(&self) -> Option<String> {
      Some(self.day.clone())
    }
  }

  fn store() -> RecordStore {
    RecordStore::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  fn note(text: &str) -> Note {
    Note {
      text: text.to_string(),
      day: "2026-08-06".to_string(),
    }
  }

  #[test]
  fn test_record_is_visible_immediately_after_put() {
    let store = store();
    let record = QueuedRecord::new(note("draft pleading"));
    store.put(&record).unwrap();

    let loaded = store.get::<Note>(&record.identity).unwrap().unwrap();
    assert!(!loaded.synced);
    assert!(loaded.identity.is_placeholder());
    assert_eq!(loaded.payload, record.payload);
    assert_eq!(store.counts("note").unwrap().pending, 1);
  }

  #[test]
  fn test_unsynced_scan_returns_insertion_order() {
    let store = store();
    let first = QueuedRecord::new(note("first"));
    let second = QueuedRecord::new(note("second"));
    store.put(&first).unwrap();
    store.put(&second).unwrap();

    let pending = store.unsynced::<Note>().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].payload.text, "first");
    assert_eq!(pending[1].payload.text, "second");
  }

  #[test]
  fn test_reassign_re_keys_without_duplicating() {
    let store = store();
    let record = QueuedRecord::new(note("research"));
    store.put(&record).unwrap();

    store.reassign::<Note>(&record.identity, "srv-17").unwrap();

    assert!(store.get::<Note>(&record.identity).unwrap().is_none());
    let synced = store
      .get::<Note>(&RecordIdentity::Assigned("srv-17".to_string()))
      .unwrap()
      .unwrap();
    assert!(synced.synced);
    assert_eq!(synced.payload.text, "research");

    let counts = store.counts("note").unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.synced, 1);
  }

  #[test]
  fn test_mark_synced_refreshes_updated_at() {
    let store = store();
    let record = QueuedRecord::new(note("hearing prep"));
    store.put(&record).unwrap();

    store.mark_synced::<Note>(&record.identity).unwrap();

    let loaded = store.get::<Note>(&record.identity).unwrap().unwrap();
    assert!(loaded.synced);
    assert!(loaded.updated_at >= record.updated_at);
  }

  #[test]
  fn test_rejections_accumulate_and_dead_letters_leave_the_scan() {
    let store = store();
    let record = QueuedRecord::new(note("rejected"));
    store.put(&record).unwrap();

    assert_eq!(store.record_rejection::<Note>(&record.identity).unwrap(), 1);
    assert_eq!(store.record_rejection::<Note>(&record.identity).unwrap(), 2);

    store.mark_dead::<Note>(&record.identity).unwrap();

    assert!(store.unsynced::<Note>().unwrap().is_empty());
    let dead = store.dead_letters::<Note>().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 2);
    assert_eq!(store.counts("note").unwrap().dead, 1);
  }

  #[test]
  fn test_record_types_are_partitioned() {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Memo {
      text: String,
    }

    impl Syncable for Memo {
      fn record_type() -> &'static str {
        "memo"
      }

      fn resource() -> &'static str {
        "memos"
      }

      fn sync_tag() -> &'static str {
        "sync-memos"
      }

      fn sort_key(&self) -> Option<String> {
        None
      }
    }

    let store = store();
    store.put(&QueuedRecord::new(note("a note"))).unwrap();
    store
      .put(&QueuedRecord::new(Memo {
        text: "a memo".to_string(),
      }))
      .unwrap();

    assert_eq!(store.unsynced::<Note>().unwrap().len(), 1);
    assert_eq!(store.unsynced::<Memo>().unwrap().len(), 1);
    assert_eq!(store.counts("note").unwrap().pending, 1);
    assert_eq!(store.counts("memo").unwrap().pending, 1);
  }
}
