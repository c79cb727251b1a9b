//! Replay of locally queued mutations against the backend.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{SyncTransport, TransportError};

use super::identity::RecordIdentity;
use super::record::{QueuedRecord, Syncable};
use super::store::RecordStore;

/// Retry policy for records the server keeps rejecting.
///
/// Network failures never consume budget: connectivity is expected to heal,
/// so those records retry on every trigger. Rejections are counted, and a
/// record that exhausts the budget is dead-lettered for manual intervention.
#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
  /// Server rejections tolerated before a record is dead-lettered
  pub max_rejections: u32,
}

impl Default for SyncPolicy {
  fn default() -> Self {
    Self { max_rejections: 5 }
  }
}

/// Outcome of one flush pass over a record type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
  /// Pending records found at the start of the pass
  pub attempted: usize,
  /// Records created on the server and re-keyed to their assigned id
  pub created: usize,
  /// Records updated in place on the server
  pub updated: usize,
  /// Records left pending after a failed submission
  pub failed: usize,
  /// Records dead-lettered during this pass
  pub dead_lettered: usize,
  /// True when another flush for this type was already in flight
  pub skipped: bool,
}

impl FlushReport {
  fn skipped() -> Self {
    Self {
      skipped: true,
      ..Self::default()
    }
  }
}

/// Offline mutation queue over the durable record store.
///
/// Records are visible in the store the moment `enqueue` returns; `flush`
/// replays every pending record of a type once, isolating per-record
/// failures.
pub struct OfflineQueue<C> {
  store: RecordStore,
  transport: C,
  policy: SyncPolicy,
  in_flight: Mutex<HashSet<&'static str>>,
}

impl<C: SyncTransport> OfflineQueue<C> {
  pub fn new(store: RecordStore, transport: C, policy: SyncPolicy) -> Self {
    Self {
      store,
      transport,
      policy,
      in_flight: Mutex::new(HashSet::new()),
    }
  }

  /// The underlying store, for status queries and optimistic reads.
  pub fn store(&self) -> &RecordStore {
    &self.store
  }

  /// Queue a new record under a fresh placeholder identity.
  ///
  /// The record is durably persisted before this returns, so callers can
  /// display it immediately.
  pub fn enqueue<T: Syncable>(&self, payload: T) -> Result<RecordIdentity> {
    let record = QueuedRecord::new(payload);
    self.store.put(&record)?;

    debug!(record_type = T::record_type(), id = %record.identity, "record queued");
    Ok(record.identity)
  }

  /// Queue an edit to an existing record, resetting it to pending.
  pub fn enqueue_edit<T: Syncable>(
    &self,
    identity: &RecordIdentity,
    payload: T,
  ) -> Result<RecordIdentity> {
    let mut record = self
      .store
      .get::<T>(identity)?
      .ok_or_else(|| eyre!("No {} record {}", T::record_type(), identity))?;

    record.payload = payload;
    record.synced = false;
    record.updated_at = Utc::now();
    self.store.put(&record)?;

    debug!(record_type = T::record_type(), id = %record.identity, "edit queued");
    Ok(record.identity)
  }

  /// Replay every pending record of this type once.
  ///
  /// Overlapping flushes for the same type are excluded: the later caller
  /// gets a report with `skipped` set and submits nothing.
  pub async fn flush<T: Syncable>(&self) -> Result<FlushReport> {
    let _guard = match FlushGuard::acquire(&self.in_flight, T::record_type())? {
      Some(guard) => guard,
      None => {
        debug!(record_type = T::record_type(), "flush already in flight");
        return Ok(FlushReport::skipped());
      }
    };

    let pending = self.store.unsynced::<T>()?;
    let mut report = FlushReport {
      attempted: pending.len(),
      ..FlushReport::default()
    };

    for record in pending {
      let payload = serde_json::to_value(&record.payload)
        .map_err(|e| eyre!("Failed to serialize record payload: {}", e))?;

      match &record.identity {
        RecordIdentity::Placeholder(_) => {
          match self.transport.create(T::resource(), &payload).await {
            Ok(server_id) => {
              self.store.reassign::<T>(&record.identity, &server_id)?;
              report.created += 1;
              info!(
                record_type = T::record_type(),
                from = %record.identity,
                to = %server_id,
                "record created on server"
              );
            }
            Err(err) => self.note_failure::<T>(&record, &err, &mut report)?,
          }
        }
        RecordIdentity::Assigned(server_id) => {
          match self.transport.update(T::resource(), server_id, &payload).await {
            Ok(()) => {
              self.store.mark_synced::<T>(&record.identity)?;
              report.updated += 1;
              info!(record_type = T::record_type(), id = %record.identity, "record updated on server");
            }
            Err(err) => self.note_failure::<T>(&record, &err, &mut report)?,
          }
        }
      }
    }

    Ok(report)
  }

  /// Book-keeping for a failed submission. The record stays pending unless a
  /// rejection exhausts its budget.
  fn note_failure<T: Syncable>(
    &self,
    record: &QueuedRecord<T>,
    err: &TransportError,
    report: &mut FlushReport,
  ) -> Result<()> {
    report.failed += 1;
    warn!(
      record_type = T::record_type(),
      id = %record.identity,
      error = %err,
      "sync failed, record stays pending"
    );

    if err.is_rejection() {
      let attempts = self.store.record_rejection::<T>(&record.identity)?;
      if attempts >= self.policy.max_rejections {
        self.store.mark_dead::<T>(&record.identity)?;
        report.dead_lettered += 1;
        warn!(
          record_type = T::record_type(),
          id = %record.identity,
          attempts,
          "rejection budget exhausted, record dead-lettered"
        );
      }
    }

    Ok(())
  }
}

/// Per-type in-flight marker, released on drop.
struct FlushGuard<'a> {
  set: &'a Mutex<HashSet<&'static str>>,
  key: &'static str,
}

impl<'a> FlushGuard<'a> {
  fn acquire(set: &'a Mutex<HashSet<&'static str>>, key: &'static str) -> Result<Option<Self>> {
    let mut held = set.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !held.insert(key) {
      return Ok(None);
    }

    Ok(Some(Self { set, key }))
  }
}

impl Drop for FlushGuard<'_> {
  fn drop(&mut self) {
    if let Ok(mut held) = self.set.lock() {
      held.remove(self.key);
    }
  }
}
