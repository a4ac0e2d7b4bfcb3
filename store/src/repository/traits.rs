//! Repository Layer - Core Traits
//!
//! Defines the abstract interfaces for data access.
//! Implementations can use SQLite, in-memory, a remote REST service, etc.
//! None of them is assumed to offer multi-row transactions except where an
//! adapter overrides [`RecordStore::reorder`].

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    DomainError, DomainResult, NewRecord, OrderedRecord, PositionUpdate, RecordChanges, RecordId,
    Scope,
};

/// A multi-record position write that did not complete.
///
/// `applied` updates went through before `failed` was rejected; with a
/// non-transactional store those earlier writes stay in place.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("reorder stopped after {applied} of {total} updates: {source}")]
pub struct ReorderFailure {
    pub applied: usize,
    pub total: usize,
    pub failed: Option<RecordId>,
    pub source: DomainError,
}

/// Per-record CRUD over ordered collections
///
/// All operations are async to support various backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records of a scope, in no particular order
    async fn fetch_all(&self, scope: &Scope) -> DomainResult<Vec<OrderedRecord>>;

    /// Insert one record; the store assigns its id
    async fn create(&self, scope: &Scope, record: &NewRecord) -> DomainResult<OrderedRecord>;

    /// Partial update of a single record
    async fn update(&self, scope: &Scope, id: &RecordId, changes: &RecordChanges) -> DomainResult<()>;

    /// Delete a single record by id
    async fn delete(&self, scope: &Scope, id: &RecordId) -> DomainResult<()>;

    /// Write several position values.
    ///
    /// The default issues one `update` per entry, in order, and stops at the
    /// first failure. Stores with transactions override this to apply all or
    /// nothing.
    async fn reorder(&self, scope: &Scope, updates: &[PositionUpdate]) -> Result<(), ReorderFailure> {
        for (applied, update) in updates.iter().enumerate() {
            let changes = RecordChanges::position(update.position);
            if let Err(source) = self.update(scope, &update.id, &changes).await {
                return Err(ReorderFailure {
                    applied,
                    total: updates.len(),
                    failed: Some(update.id.clone()),
                    source,
                });
            }
        }
        Ok(())
    }
}

/// Object storage for files referenced by records
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Remove the object at `path` inside `bucket`
    async fn delete_asset(&self, bucket: &str, path: &str) -> DomainResult<()>;
}
