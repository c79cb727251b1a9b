//! Record identity: client-generated placeholder vs server-assigned id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Reserved prefix marking identifiers minted locally before first sync.
const PLACEHOLDER_PREFIX: &str = "temp-";

static PLACEHOLDER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of a queued record.
///
/// A record starts under a [`RecordIdentity::Placeholder`] minted at enqueue
/// time and is re-keyed to [`RecordIdentity::Assigned`] once the server
/// acknowledges the create. The reserved prefix is inspected in [`parse`]
/// and nowhere else.
///
/// [`parse`]: RecordIdentity::parse
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordIdentity {
  /// Client-generated identifier; the record is unknown to the server
  Placeholder(String),
  /// Server-assigned identifier
  Assigned(String),
}

impl RecordIdentity {
  /// Mint a fresh placeholder, unique within and across runs.
  pub fn placeholder() -> Self {
    let token = format!(
      "{}{}-{}",
      PLACEHOLDER_PREFIX,
      Utc::now().timestamp_millis(),
      PLACEHOLDER_COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    Self::Placeholder(token)
  }

  /// Classify a stored identifier string.
  pub fn parse(raw: &str) -> Self {
    if raw.starts_with(PLACEHOLDER_PREFIX) {
      Self::Placeholder(raw.to_string())
    } else {
      Self::Assigned(raw.to_string())
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      Self::Placeholder(token) => token,
      Self::Assigned(id) => id,
    }
  }

  pub fn is_placeholder(&self) -> bool {
    matches!(self, Self::Placeholder(_))
  }
}

impl fmt::Display for RecordIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_placeholder_carries_the_reserved_prefix() {
    let identity = RecordIdentity::placeholder();
    assert!(identity.is_placeholder());
    assert!(identity.as_str().starts_with("temp-"));
  }

  #[test]
  fn test_placeholders_are_unique() {
    let a = RecordIdentity::placeholder();
    let b = RecordIdentity::placeholder();
    assert_ne!(a, b);
  }

  #[test]
  fn test_parse_round_trips_both_variants() {
    let placeholder = RecordIdentity::placeholder();
    assert_eq!(RecordIdentity::parse(placeholder.as_str()), placeholder);

    let assigned = RecordIdentity::parse("41fb2d");
    assert_eq!(assigned, RecordIdentity::Assigned("41fb2d".to_string()));
    assert!(!assigned.is_placeholder());
  }
}
