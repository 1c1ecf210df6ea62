//! Catalog domain model.
//!
//! # Responsibility
//! - Define the records and value objects used by repositories and services.
//! - Keep construction-time validation next to the types it protects.
//!
//! # Invariants
//! - Entries, entry groups and keywords carry a stable version-4 `GlobalId`.
//! - Value objects (scale triplets) are validated on construction and are
//!   replaced, never patched.

pub mod entry;
pub mod entry_group;
pub mod identity;
pub mod keyword;
pub mod reference;
pub mod scale;
