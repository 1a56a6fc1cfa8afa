//! Reference-count ledger for driver handles.
//!
//! Every object the driver creates or hands out through enumeration gets a
//! [`RefCountRecord`]. Retains and releases adjust the count; the record is
//! dropped when the count reaches zero. Anything still alive when the layer
//! shuts down is a leak and shows up in the [`LeakReport`].
//!
//! The ledger only detects and reports. Whether a double release or a stale
//! handle fails the call is decided by the layer in front of it.

pub mod leak;
pub mod ledger;
pub mod record;

pub use leak::{LeakEntry, LeakReport};
pub use ledger::{LedgerStats, RefCountLedger};
pub use record::RefCountRecord;
