//! Domain Layer
//!
//! Contains the ordered-record entities and core abstractions.
//! This layer has no I/O of its own.

mod entity;
mod record;
mod scope;
mod asset;

pub use entity::{Entity, DomainError, DomainResult};
pub use record::{
    find_duplicate_positions, next_position, sort_records, NewRecord, OrderedRecord, Payload,
    PositionUpdate, RecordChanges, RecordId,
};
pub use scope::{Partition, Scope};
pub use asset::asset_path_from_url;
