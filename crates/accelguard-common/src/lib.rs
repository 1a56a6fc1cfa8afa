//! Common types for the accelguard validation layer.
//!
//! This crate holds the pieces shared by the reference-count ledger, the
//! allocation/bounds registry, and the layer that wires them in front of a
//! driver:
//!
//! - [`handle`]: opaque driver handles and their kind tags
//! - [`error`]: the validation error taxonomy
//! - [`config`]: feature toggles loaded from defaults, TOML, or environment

pub mod config;
pub mod error;
pub mod handle;

pub use config::{ConfigError, LogLevel, SubBufferBounds, ValidationConfig};
pub use error::{Result, ValidationError};
pub use handle::{Handle, HandleKind};
