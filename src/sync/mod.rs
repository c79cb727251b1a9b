//! Offline mutation queue: records created or edited locally are persisted
//! immediately, marked unsynced, and replayed against the backend when
//! connectivity returns.
//!
//! A record under a placeholder identity is created on the server and re-keyed
//! to the assigned identifier on first success; a record with an assigned
//! identifier is updated in place. Per-record failures never abort a flush.

mod identity;
mod queue;
mod record;
mod store;

pub use identity::RecordIdentity;
pub use queue::{FlushReport, OfflineQueue, SyncPolicy};
pub use record::{QueuedRecord, Syncable};
pub use store::{RecordStore, StoreCounts};
