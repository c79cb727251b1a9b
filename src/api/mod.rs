//! HTTP transport and domain payloads for the LegisFlow backend API.

mod client;
mod models;

pub use client::{ApiClient, SyncTransport, TransportError};
pub use models::{
  ClientRecord, Deadline, DeadlinePriority, DeadlineType, DocumentRecord, DocumentType, Matter,
  MatterStatus, MatterType, RecordKind, TimeEntry,
};
