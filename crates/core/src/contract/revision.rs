//! Revision identity and metadata
//!
//! A revision is the audit record of one committed transaction that changed
//! audited data. It carries a number, the commit timestamp and any custom
//! columns contributed by a [`RevisionListener`](crate::RevisionListener).
//!
//! ## Invariants
//!
//! - Revision numbers start at 1 and increase by exactly one per revision
//! - Timestamps strictly increase with revision number
//! - A revision is never modified after its transaction commits

use super::Timestamp;
use crate::value::{Fields, Value};
use serde::{Deserialize, Serialize};

/// Totally ordered revision number
///
/// `RevisionNumber(0)` is never assigned to a revision; it is the "nothing
/// committed yet" position of the revision counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionNumber(u64);

impl RevisionNumber {
    /// The number assigned to the first revision
    pub const FIRST: RevisionNumber = RevisionNumber(1);

    /// Position of the counter before any revision exists
    pub const ZERO: RevisionNumber = RevisionNumber(0);

    /// Wrap a raw number
    #[inline]
    pub const fn new(value: u64) -> Self {
        RevisionNumber(value)
    }

    /// Raw value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// True for the counter's initial position
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The number following this one
    #[inline]
    pub const fn next(&self) -> Self {
        RevisionNumber(self.0 + 1)
    }
}

impl std::fmt::Display for RevisionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rev:{}", self.0)
    }
}

impl From<u64> for RevisionNumber {
    fn from(value: u64) -> Self {
        RevisionNumber(value)
    }
}

impl From<RevisionNumber> for u64 {
    fn from(rev: RevisionNumber) -> Self {
        rev.0
    }
}

/// How a revision affected one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevisionType {
    /// Entity created
    Add,
    /// Entity modified
    Mod,
    /// Entity removed
    Del,
}

impl RevisionType {
    /// Short code used in logs and debug output
    pub const fn code(&self) -> u8 {
        match self {
            RevisionType::Add => 0,
            RevisionType::Mod => 1,
            RevisionType::Del => 2,
        }
    }
}

/// One committed revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    /// Revision number
    pub number: RevisionNumber,
    /// Commit timestamp
    pub timestamp: Timestamp,
    /// Custom revision columns
    pub fields: Fields,
}

impl Revision {
    /// Create a revision without custom columns
    pub fn new(number: RevisionNumber, timestamp: Timestamp) -> Self {
        Revision {
            number,
            timestamp,
            fields: Fields::new(),
        }
    }

    /// Custom column by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A revision being built inside the commit critical section
///
/// Handed to [`RevisionListener`](crate::RevisionListener)s. Number and
/// timestamp are fixed; only custom columns can be set.
#[derive(Debug)]
pub struct PendingRevision {
    revision: Revision,
}

impl PendingRevision {
    /// Start building a revision
    pub fn new(number: RevisionNumber, timestamp: Timestamp, fields: Fields) -> Self {
        PendingRevision {
            revision: Revision {
                number,
                timestamp,
                fields,
            },
        }
    }

    /// Number that will be assigned
    pub fn number(&self) -> RevisionNumber {
        self.revision.number
    }

    /// Commit timestamp that will be recorded
    pub fn timestamp(&self) -> Timestamp {
        self.revision.timestamp
    }

    /// Custom columns set so far
    pub fn fields(&self) -> &Fields {
        &self.revision.fields
    }

    /// Set a custom column, replacing any earlier value
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.revision.fields.insert(name, value);
    }

    /// Finish building
    pub fn into_revision(self) -> Revision {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_number_ordering() {
        assert!(RevisionNumber::new(1) < RevisionNumber::new(2));
        assert_eq!(RevisionNumber::ZERO.next(), RevisionNumber::FIRST);
        assert!(RevisionNumber::ZERO.is_zero());
        assert!(!RevisionNumber::FIRST.is_zero());
    }

    #[test]
    fn test_revision_number_conversions() {
        let rev: RevisionNumber = 7u64.into();
        assert_eq!(rev.as_u64(), 7);
        assert_eq!(u64::from(rev), 7);
        assert_eq!(rev.to_string(), "rev:7");
    }

    #[test]
    fn test_pending_revision_keeps_identity() {
        let mut pending =
            PendingRevision::new(RevisionNumber::new(3), Timestamp::from_micros(10), Fields::new());
        pending.set_field("user", "alice");
        pending.set_field("user", "bob");

        let revision = pending.into_revision();
        assert_eq!(revision.number, RevisionNumber::new(3));
        assert_eq!(revision.timestamp, Timestamp::from_micros(10));
        assert_eq!(revision.field("user"), Some(&Value::String("bob".into())));
    }

    #[test]
    fn test_revision_type_codes_distinct() {
        let codes = [RevisionType::Add, RevisionType::Mod, RevisionType::Del].map(|t| t.code());
        assert_eq!(codes, [0, 1, 2]);
    }
}
