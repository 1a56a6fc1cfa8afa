//! Validation layer for compute driver APIs.
//!
//! [`ValidationLayer`] wraps any [`Driver`] and, depending on its
//! [`ValidationConfig`](accelguard_common::ValidationConfig):
//!
//! - rejects null handles, null pointers and zero sizes,
//! - reference counts every handle and reports leaks at [`teardown`],
//! - flags use of released handles, double releases and duplicate creates,
//! - refuses data movement that would read or write outside an allocation.
//!
//! [`teardown`]: ValidationLayer::teardown

mod diagnostics;
mod driver;
mod entry_points;
mod error;
mod layer;
mod logging;

pub use diagnostics::Diagnostics;
pub use driver::{Driver, DriverError, DriverResult, RectCopy};
pub use error::{LayerError, Result};
pub use layer::ValidationLayer;
pub use logging::init_logging;

pub use accelguard_bounds::{ImageDesc, ImageType, Origin, Region, Scope, UsmKind};
pub use accelguard_common::{Handle, HandleKind, SubBufferBounds, ValidationConfig, ValidationError};
pub use accelguard_refcount::{LeakEntry, LeakReport};
