//! Queued record envelope and the per-type sync contract.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use super::identity::RecordIdentity;

/// Contract for domain records that can be queued for synchronization.
///
/// Implementors name their store partition, their REST resource segment, and
/// the deferred-sync tag registered when they are queued offline.
pub trait Syncable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Store partition name (e.g., "time_entry")
  fn record_type() -> &'static str;

  /// API resource segment (e.g., "time-entries")
  fn resource() -> &'static str;

  /// Tag registered for deferred sync when the record is queued offline
  fn sync_tag() -> &'static str;

  /// Type-specific secondary key for store queries (date, status, ...).
  /// Returns None if the type has no natural secondary ordering.
  fn sort_key(&self) -> Option<String>;
}

/// A domain record pending (or past) synchronization.
///
/// The identity lives in the envelope; payloads carry domain fields only, so
/// the body sent to the server never contains identifier or sync bookkeeping.
#[derive(Debug, Clone)]
pub struct QueuedRecord<T> {
  pub identity: RecordIdentity,
  pub payload: T,
  pub synced: bool,
  /// Server rejections so far; bounded by the sync policy
  pub attempts: u32,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl<T: Syncable> QueuedRecord<T> {
  /// A new unsynced record under a fresh placeholder identity.
  pub fn new(payload: T) -> Self {
    let now = Utc::now();
    Self {
      identity: RecordIdentity::placeholder(),
      payload,
      synced: false,
      attempts: 0,
      created_at: now,
      updated_at: now,
    }
  }
}
