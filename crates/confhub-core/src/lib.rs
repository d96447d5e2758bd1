//! Confhub Core - Bean values and property diffing
//!
//! This crate provides the leaf types shared by the confhub workspace:
//! - Dynamic value types (`Value`, `ValueMap`) used as bean payloads and metadata
//! - Property-level diffing (`PropertyChange`, `ReflectionHelper`, `HelperFactory`)
//! - The default field-by-field differ (`FieldDiffer`)
//!
//! The crate knows nothing about hubs, snapshots or transactions.

mod diff;
mod error;
mod value;

pub use diff::{FieldDiffer, FieldDifferFactory, HelperFactory, PropertyChange, ReflectionHelper};
pub use error::{Error, Result};
pub use value::{Value, ValueMap};

/// Re-export IndexMap for consumers that build ordered maps of values
pub use indexmap::IndexMap;
