//! Teardown leak summary.

use std::fmt;

use accelguard_common::{Handle, HandleKind};
use serde::Serialize;

use crate::record::RefCountRecord;

/// One handle still referenced at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeakEntry {
    pub handle: Handle,
    pub kind: HandleKind,
    pub count: u32,
    pub indirect: bool,
}

impl From<RefCountRecord> for LeakEntry {
    fn from(rec: RefCountRecord) -> Self {
        Self { handle: rec.handle, kind: rec.kind, count: rec.count, indirect: rec.indirect }
    }
}

impl fmt::Display for LeakEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Retained {} reference(s) to {} handle {}", self.count, self.kind, self.handle)
    }
}

/// Every leak found when the ledger was torn down, ordered by handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeakReport {
    leaks: Vec<LeakEntry>,
}

impl LeakReport {
    /// Build a report from already-sorted entries.
    pub fn new(leaks: Vec<LeakEntry>) -> Self {
        Self { leaks }
    }

    /// Whether nothing leaked.
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }

    /// Number of leaked handles.
    pub fn len(&self) -> usize {
        self.leaks.len()
    }

    /// Whether the report has no entries.
    pub fn is_empty(&self) -> bool {
        self.leaks.is_empty()
    }

    /// The leaked handles.
    pub fn leaks(&self) -> &[LeakEntry] {
        &self.leaks
    }

    /// Entry for a particular handle, if it leaked.
    pub fn find(&self, handle: Handle) -> Option<&LeakEntry> {
        self.leaks.iter().find(|l| l.handle == handle)
    }

    /// Sum of leaked reference counts.
    pub fn total_references(&self) -> u64 {
        self.leaks.iter().map(|l| u64::from(l.count)).sum()
    }

    /// Serialize the report as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "no leaked handles");
        }
        write!(f, "{} leaked handle(s):", self.leaks.len())?;
        for leak in &self.leaks {
            write!(f, "\n  - {leak}")?;
        }
        Ok(())
    }
}
