//! Domain record payloads synchronized with the backend.
//!
//! Payloads carry domain fields only; record identity and sync bookkeeping
//! live in the queue envelope, so these shapes are exactly what goes over
//! the wire on create and update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::Syncable;

/// Billable time recorded against a matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
  pub description: String,
  pub start_time: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_time: Option<DateTime<Utc>>,
  /// Duration in seconds
  #[serde(default)]
  pub duration: u64,
  pub matter_id: String,
  pub user_id: String,
  pub firm_id: String,
  #[serde(default)]
  pub billable: bool,
  #[serde(default)]
  pub billed: bool,
}

impl Syncable for TimeEntry {
  fn record_type() -> &'static str {
    "time_entry"
  }

  fn resource() -> &'static str {
    "time-entries"
  }

  fn sync_tag() -> &'static str {
    "sync-time-entries"
  }

  fn sort_key(&self) -> Option<String> {
    Some(self.start_time.date_naive().to_string())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
  Contract,
  CourtFiling,
  Correspondence,
  Memo,
  Template,
  Other,
}

impl DocumentType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Contract => "contract",
      Self::CourtFiling => "court_filing",
      Self::Correspondence => "correspondence",
      Self::Memo => "memo",
      Self::Template => "template",
      Self::Other => "other",
    }
  }
}

/// Document metadata attached to a matter or client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(rename = "type")]
  pub document_type: DocumentType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub matter_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client_id: Option<String>,
  pub firm_id: String,
  pub file_path: String,
  pub file_size: u64,
  pub file_type: String,
  pub uploaded_by_id: String,
  #[serde(default)]
  pub is_template: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub template_id: Option<String>,
}

impl Syncable for DocumentRecord {
  fn record_type() -> &'static str {
    "document"
  }

  fn resource() -> &'static str {
    "documents"
  }

  fn sync_tag() -> &'static str {
    "sync-documents"
  }

  fn sort_key(&self) -> Option<String> {
    Some(self.document_type.as_str().to_string())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatterStatus {
  #[default]
  Open,
  Pending,
  Closed,
  Archived,
}

impl MatterStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "open",
      Self::Pending => "pending",
      Self::Closed => "closed",
      Self::Archived => "archived",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatterType {
  Litigation,
  Corporate,
  RealEstate,
  IntellectualProperty,
  Labor,
  Tax,
  Other,
}

/// A legal matter handled by the firm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matter {
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub status: MatterStatus,
  #[serde(rename = "type")]
  pub matter_type: MatterType,
  pub client_id: String,
  pub responsible_attorney_id: String,
  pub firm_id: String,
  /// OHADA court registry number, where applicable
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ohada_case_number: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub court_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub opposing_counsel: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub open_date: Option<DateTime<Utc>>,
}

impl Syncable for Matter {
  fn record_type() -> &'static str {
    "matter"
  }

  fn resource() -> &'static str {
    "matters"
  }

  fn sync_tag() -> &'static str {
    "sync-matters"
  }

  fn sort_key(&self) -> Option<String> {
    Some(self.status.as_str().to_string())
  }
}

/// A client of the firm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub city: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub country: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub contact_person: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  pub firm_id: String,
}

impl Syncable for ClientRecord {
  fn record_type() -> &'static str {
    "client"
  }

  fn resource() -> &'static str {
    "clients"
  }

  fn sync_tag() -> &'static str {
    "sync-clients"
  }

  fn sort_key(&self) -> Option<String> {
    None
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineType {
  CourtAppearance,
  Filing,
  Response,
  Appeal,
  ClientMeeting,
  InternalDeadline,
  Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlinePriority {
  Low,
  #[default]
  Medium,
  High,
  Critical,
}

/// A procedural or court deadline attached to a matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deadline {
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub due_date: DateTime<Utc>,
  #[serde(rename = "type")]
  pub deadline_type: DeadlineType,
  #[serde(default)]
  pub priority: DeadlinePriority,
  pub matter_id: String,
  pub assigned_to_id: String,
  pub firm_id: String,
  #[serde(default)]
  pub completed: bool,
  /// Computation rule that produced this deadline, if any
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rule_used: Option<String>,
}

impl Syncable for Deadline {
  fn record_type() -> &'static str {
    "deadline"
  }

  fn resource() -> &'static str {
    "deadlines"
  }

  fn sync_tag() -> &'static str {
    "sync-deadlines"
  }

  fn sort_key(&self) -> Option<String> {
    Some(self.due_date.date_naive().to_string())
  }
}

/// The queueable record types, for sync-tag and CLI dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
  TimeEntry,
  Document,
  Matter,
  Client,
  Deadline,
}

impl RecordKind {
  pub const ALL: [RecordKind; 5] = [
    RecordKind::TimeEntry,
    RecordKind::Document,
    RecordKind::Matter,
    RecordKind::Client,
    RecordKind::Deadline,
  ];

  /// Parse the CLI spelling of a record kind.
  pub fn parse(name: &str) -> Option<Self> {
    match name {
      "time-entry" => Some(Self::TimeEntry),
      "document" => Some(Self::Document),
      "matter" => Some(Self::Matter),
      "client" => Some(Self::Client),
      "deadline" => Some(Self::Deadline),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::TimeEntry => "time-entry",
      Self::Document => "document",
      Self::Matter => "matter",
      Self::Client => "client",
      Self::Deadline => "deadline",
    }
  }

  pub fn record_type(self) -> &'static str {
    match self {
      Self::TimeEntry => TimeEntry::record_type(),
      Self::Document => DocumentRecord::record_type(),
      Self::Matter => Matter::record_type(),
      Self::Client => ClientRecord::record_type(),
      Self::Deadline => Deadline::record_type(),
    }
  }

  pub fn sync_tag(self) -> &'static str {
    match self {
      Self::TimeEntry => TimeEntry::sync_tag(),
      Self::Document => DocumentRecord::sync_tag(),
      Self::Matter => Matter::sync_tag(),
      Self::Client => ClientRecord::sync_tag(),
      Self::Deadline => Deadline::sync_tag(),
    }
  }

  pub fn from_tag(tag: &str) -> Option<Self> {
    Self::ALL.iter().copied().find(|kind| kind.sync_tag() == tag)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_time_entry_wire_shape_is_camel_case() {
    let entry = TimeEntry {
      description: "Research".to_string(),
      start_time: Utc.with_ymd_and_hms(2026, 8, 6, 9, 0, 0).unwrap(),
      end_time: None,
      duration: 5400,
      matter_id: "1".to_string(),
      user_id: "u-3".to_string(),
      firm_id: "f-1".to_string(),
      billable: true,
      billed: false,
    };

    let wire = serde_json::to_value(&entry).unwrap();
    assert_eq!(wire["matterId"], "1");
    assert_eq!(wire["duration"], 5400);
    assert!(wire.get("endTime").is_none());
    assert!(wire.get("id").is_none());
  }

  #[test]
  fn test_enum_wire_values_match_the_backend() {
    assert_eq!(
      serde_json::to_value(DocumentType::CourtFiling).unwrap(),
      "court_filing"
    );
    assert_eq!(
      serde_json::to_value(DeadlineType::ClientMeeting).unwrap(),
      "client_meeting"
    );
    assert_eq!(serde_json::to_value(MatterStatus::Open).unwrap(), "open");
    assert_eq!(
      serde_json::to_value(MatterType::IntellectualProperty).unwrap(),
      "intellectual_property"
    );
    assert_eq!(serde_json::to_value(DeadlinePriority::Critical).unwrap(), "critical");
  }

  #[test]
  fn test_matter_defaults_apply_on_deserialize() {
    let matter: Matter = serde_json::from_str(
      r#"{"title":"Land dispute","type":"litigation","clientId":"c-1",
          "responsibleAttorneyId":"u-1","firmId":"f-1"}"#,
    )
    .unwrap();

    assert_eq!(matter.status, MatterStatus::Open);
    assert!(matter.ohada_case_number.is_none());
    assert_eq!(matter.sort_key().as_deref(), Some("open"));
  }

  #[test]
  fn test_sort_keys_use_the_type_specific_secondary_field() {
    let deadline = Deadline {
      title: "Appeal filing".to_string(),
      description: None,
      due_date: Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap(),
      deadline_type: DeadlineType::Appeal,
      priority: DeadlinePriority::High,
      matter_id: "m-1".to_string(),
      assigned_to_id: "u-2".to_string(),
      firm_id: "f-1".to_string(),
      completed: false,
      rule_used: None,
    };
    assert_eq!(deadline.sort_key().as_deref(), Some("2026-09-01"));
  }

  #[test]
  fn test_record_kind_round_trips_names_and_tags() {
    for kind in RecordKind::ALL {
      assert_eq!(RecordKind::parse(kind.name()), Some(kind));
      assert_eq!(RecordKind::from_tag(kind.sync_tag()), Some(kind));
    }
    assert_eq!(RecordKind::parse("invoice"), None);
    assert_eq!(RecordKind::from_tag("sync-invoices"), None);
  }
}
