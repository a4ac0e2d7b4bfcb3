//! Site Store
//!
//! Layered architecture:
//! - domain: ordered records, scopes and their rules
//! - repository: data access abstractions and implementations

pub mod domain;
pub mod repository;

pub use domain::{DomainError, DomainResult, OrderedRecord, Payload, RecordId, Scope};
pub use repository::{AssetStore, RecordStore};
