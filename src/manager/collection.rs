//! Positioned Collection Manager
//!
//! Keeps one scope's records in display order and reorders them through a
//! store that only guarantees single-record writes.
//!
//! Every write that touches ordering ends with an authoritative reload, so
//! the snapshot never keeps a client-computed order the store did not
//! accept. Cosmetic field edits are applied optimistically and reverted if
//! the store rejects them.

use std::collections::BTreeMap;
use std::sync::Arc;

use site_store::domain::{
    asset_path_from_url, find_duplicate_positions, next_position, sort_records, NewRecord,
    OrderedRecord, Payload, PositionUpdate, RecordChanges, RecordId, Scope,
};
use site_store::repository::{AssetStore, RecordStore, ReorderFailure};
use site_store::DomainError;
use thiserror::Error;
use tokio::sync::watch;

use super::state::{BusyGuard, CollectionState};
use crate::notify::{Action, Notification, Notifier};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManagerError {
    #[error("another {0} is in progress")]
    Busy(CollectionState),
    #[error("record {0} is not at index {1}; reload and retry")]
    StaleIndex(RecordId, usize),
    #[error("new order must list every record exactly once")]
    NotAPermutation,
    #[error(transparent)]
    Store(#[from] DomainError),
    #[error(transparent)]
    Reorder(#[from] ReorderFailure),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Result of a move-up / move-down request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Positions were swapped with the neighbor
    Moved,
    /// Already first (up) or last (down); nothing was sent
    AtBoundary,
}

/// What happened to the file behind a deleted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetCleanup {
    /// The scope has no assets, or the record references none
    NotApplicable,
    Removed { bucket: String, path: String },
    /// The record is gone but its file may remain
    Orphaned { reason: String },
}

pub struct PositionedCollectionManager {
    scope: Scope,
    store: Arc<dyn RecordStore>,
    assets: Option<Arc<dyn AssetStore>>,
    notifier: Arc<dyn Notifier>,
    records: watch::Sender<Vec<OrderedRecord>>,
    state: watch::Sender<CollectionState>,
}

impl PositionedCollectionManager {
    pub fn new(scope: Scope, store: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>) -> Result<Self, DomainError> {
        scope.validate()?;
        Ok(Self {
            scope,
            store,
            assets: None,
            notifier,
            records: watch::channel(Vec::new()).0,
            state: watch::channel(CollectionState::Idle).0,
        })
    }

    /// Attach object storage used to clean up files of deleted records
    pub fn with_assets(mut self, assets: Arc<dyn AssetStore>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Current in-memory snapshot, in display order
    pub fn snapshot(&self) -> Vec<OrderedRecord> {
        self.records.borrow().clone()
    }

    /// Follow snapshot changes, including optimistic ones
    pub fn subscribe(&self) -> watch::Receiver<Vec<OrderedRecord>> {
        self.records.subscribe()
    }

    pub fn state(&self) -> CollectionState {
        *self.state.borrow()
    }

    /// Follow state changes, e.g. to disable reorder controls
    pub fn subscribe_state(&self) -> watch::Receiver<CollectionState> {
        self.state.subscribe()
    }

    /// Positions currently shared by more than one record.
    ///
    /// Non-empty after a half-applied swap or concurrent edits from another
    /// session. Reported only; nothing here picks a winner.
    pub fn position_conflicts(&self) -> BTreeMap<i32, Vec<RecordId>> {
        find_duplicate_positions(&self.records.borrow())
    }

    fn begin(&self, next: CollectionState) -> ManagerResult<BusyGuard<'_>> {
        BusyGuard::acquire(&self.state, next).map_err(|blocking| {
            log::debug!("{}: rejected {} while {}", self.scope.key(), next, blocking);
            ManagerError::Busy(blocking)
        })
    }

    fn report(&self, action: Action, err: &impl std::fmt::Display) {
        self.notifier.notify(Notification::failure(action, &self.scope.key(), err));
    }

    /// Fetch and sort the scope, replacing the snapshot.
    ///
    /// On failure the snapshot is emptied and the error notified.
    pub async fn load(&self) -> ManagerResult<Vec<OrderedRecord>> {
        let _busy = self.begin(CollectionState::Loading)?;
        self.refresh().await
    }

    async fn refresh(&self) -> ManagerResult<Vec<OrderedRecord>> {
        match self.store.fetch_all(&self.scope).await {
            Ok(mut records) => {
                sort_records(&mut records);
                let conflicts = find_duplicate_positions(&records);
                if !conflicts.is_empty() {
                    log::warn!(
                        "{}: {} position value(s) shared by several records: {:?}",
                        self.scope.key(),
                        conflicts.len(),
                        conflicts
                    );
                    let shared: Vec<String> = conflicts.keys().map(ToString::to_string).collect();
                    self.notifier.notify(Notification::warning(
                        Action::Load,
                        &self.scope.key(),
                        format!("Several items share position {}", shared.join(", ")),
                    ));
                }
                self.records.send_replace(records.clone());
                Ok(records)
            }
            Err(e) => {
                log::error!("{}: load failed: {}", self.scope.key(), e);
                self.records.send_replace(Vec::new());
                self.report(Action::Load, &e);
                Err(e.into())
            }
        }
    }

    /// Reload after a write; a failure here is already notified by `refresh`
    async fn reconcile(&self) {
        if self.refresh().await.is_err() {
            log::warn!("{}: reload after write failed, snapshot cleared", self.scope.key());
        }
    }

    /// Create a record after the current last one.
    ///
    /// The position comes from the snapshot (`max + 1`, or the scope's start
    /// position when empty); the record only appears once the reload sees it.
    pub async fn append(&self, payload: Payload) -> ManagerResult<OrderedRecord> {
        let _busy = self.begin(CollectionState::Mutating)?;

        let draft = {
            let records = self.records.borrow();
            next_position(&records, self.scope.start_position)
                .and_then(|position| NewRecord::new(position, payload))
        };
        let draft = match draft {
            Ok(d) => d,
            Err(e) => {
                self.report(Action::Add, &e);
                return Err(e.into());
            }
        };

        let result = self.store.create(&self.scope, &draft).await;
        self.reconcile().await;

        match result {
            Ok(created) => {
                log::info!("{}: added {} at position {}", self.scope.key(), created.id, created.position);
                self.notifier.notify(Notification::success(
                    Action::Add,
                    &self.scope.key(),
                    format!("Added item at position {}", created.position),
                ));
                Ok(created)
            }
            Err(e) => {
                log::error!("{}: create failed: {}", self.scope.key(), e);
                self.report(Action::Add, &e);
                Err(e.into())
            }
        }
    }

    /// Swap `record` (at `index` in the snapshot) with the one before it
    pub async fn move_up(&self, record: &OrderedRecord, index: usize) -> ManagerResult<MoveOutcome> {
        self.move_adjacent(record, index, Direction::Up).await
    }

    /// Swap `record` (at `index` in the snapshot) with the one after it
    pub async fn move_down(&self, record: &OrderedRecord, index: usize) -> ManagerResult<MoveOutcome> {
        self.move_adjacent(record, index, Direction::Down).await
    }

    async fn move_adjacent(&self, record: &OrderedRecord, index: usize, direction: Direction) -> ManagerResult<MoveOutcome> {
        let neighbor = {
            let records = self.records.borrow();
            if records.get(index).map(|at| &at.id) != Some(&record.id) {
                None
            } else {
                let neighbor_index = match direction {
                    Direction::Up => index.checked_sub(1),
                    Direction::Down => Some(index + 1).filter(|&i| i < records.len()),
                };
                match neighbor_index {
                    Some(i) => Some(records[i].clone()),
                    None => return Ok(MoveOutcome::AtBoundary),
                }
            }
        };
        let Some(neighbor) = neighbor else {
            let err = ManagerError::StaleIndex(record.id.clone(), index);
            self.report(Action::Move, &err);
            return Err(err);
        };

        let _busy = self.begin(CollectionState::Mutating)?;

        // Moved record first, then the neighbor; the pair is not atomic unless the store makes it so
        let updates = [
            PositionUpdate::new(record.id.clone(), neighbor.position),
            PositionUpdate::new(neighbor.id.clone(), record.position),
        ];
        let result = self.store.reorder(&self.scope, &updates).await;
        self.reconcile().await;

        match result {
            Ok(()) => Ok(MoveOutcome::Moved),
            Err(failure) => {
                if failure.applied > 0 {
                    log::warn!(
                        "{}: swap of {} and {} half applied; position {} is now shared",
                        self.scope.key(),
                        record.id,
                        neighbor.id,
                        neighbor.position
                    );
                } else {
                    log::error!("{}: swap failed: {}", self.scope.key(), failure);
                }
                self.report(Action::Move, &failure);
                Err(failure.into())
            }
        }
    }

    /// Give every record `position = index` in `new_order`.
    ///
    /// The snapshot shows the new order immediately; the store is then
    /// written one record at a time and the collection reloaded. If a write
    /// fails the reload replaces the optimistic order with whatever the
    /// store holds.
    pub async fn bulk_reorder(&self, new_order: &[OrderedRecord]) -> ManagerResult<()> {
        let _busy = self.begin(CollectionState::Mutating)?;

        if !self.is_permutation(new_order) {
            self.report(Action::Reorder, &ManagerError::NotAPermutation);
            return Err(ManagerError::NotAPermutation);
        }

        let mut optimistic = Vec::with_capacity(new_order.len());
        let mut updates = Vec::with_capacity(new_order.len());
        for (index, record) in new_order.iter().enumerate() {
            let position = i32::try_from(index).map_err(|_| {
                ManagerError::Store(DomainError::InvalidInput("collection too large to reorder".into()))
            })?;
            let mut moved = record.clone();
            moved.position = position;
            optimistic.push(moved);
            updates.push(PositionUpdate::new(record.id.clone(), position));
        }
        self.records.send_replace(optimistic);

        let result = self.store.reorder(&self.scope, &updates).await;
        self.reconcile().await;

        match result {
            Ok(()) => Ok(()),
            Err(failure) => {
                log::error!("{}: bulk reorder failed: {}", self.scope.key(), failure);
                self.report(Action::Reorder, &failure);
                Err(failure.into())
            }
        }
    }

    fn is_permutation(&self, new_order: &[OrderedRecord]) -> bool {
        let records = self.records.borrow();
        if records.len() != new_order.len() {
            return false;
        }
        let mut current: Vec<&RecordId> = records.iter().map(|r| &r.id).collect();
        let mut proposed: Vec<&RecordId> = new_order.iter().map(|r| &r.id).collect();
        current.sort();
        proposed.sort();
        current == proposed
    }

    /// Delete a record, then its asset on a best-effort basis.
    ///
    /// Siblings keep their positions. An asset that cannot be removed is
    /// logged and reported as orphaned; the record deletion stands.
    pub async fn delete(&self, record: &OrderedRecord) -> ManagerResult<AssetCleanup> {
        let _busy = self.begin(CollectionState::Mutating)?;

        if let Err(e) = self.store.delete(&self.scope, &record.id).await {
            log::error!("{}: delete of {} failed: {}", self.scope.key(), record.id, e);
            self.report(Action::Delete, &e);
            return Err(e.into());
        }

        self.records.send_modify(|records| records.retain(|r| r.id != record.id));
        self.notifier.notify(Notification::success(Action::Delete, &self.scope.key(), "Item deleted"));

        Ok(self.remove_asset(record).await)
    }

    async fn remove_asset(&self, record: &OrderedRecord) -> AssetCleanup {
        let (Some(field), Some(bucket), Some(assets)) =
            (&self.scope.asset_field, &self.scope.asset_bucket, &self.assets)
        else {
            return AssetCleanup::NotApplicable;
        };
        let Some(url) = record.field_str(field).filter(|u| !u.is_empty()) else {
            return AssetCleanup::NotApplicable;
        };

        let Some(path) = asset_path_from_url(url, bucket) else {
            log::warn!("{}: cannot derive storage path from {}; asset left in place", self.scope.key(), url);
            return AssetCleanup::Orphaned {
                reason: format!("{} is not in bucket {}", url, bucket),
            };
        };

        match assets.delete_asset(bucket, &path).await {
            Ok(()) => {
                log::info!("{}: removed asset {}/{}", self.scope.key(), bucket, path);
                AssetCleanup::Removed {
                    bucket: bucket.clone(),
                    path,
                }
            }
            Err(e) => {
                log::warn!("{}: asset {}/{} orphaned: {}", self.scope.key(), bucket, path, e);
                AssetCleanup::Orphaned { reason: e.to_string() }
            }
        }
    }

    /// Change payload fields of one record.
    ///
    /// Applied to the snapshot right away and reverted if the store
    /// rejects it. Position is not editable here.
    pub async fn edit(&self, id: &RecordId, fields: Payload) -> ManagerResult<()> {
        let _busy = self.begin(CollectionState::Mutating)?;

        let mut fields = fields;
        fields.remove(&self.scope.position_field);
        let changes = RecordChanges::fields(fields);

        let previous = self.records.borrow().iter().find(|r| &r.id == id).cloned();
        let Some(previous) = previous else {
            let err = DomainError::NotFound(format!("Record {} not found", id));
            self.report(Action::Edit, &err);
            return Err(err.into());
        };

        self.records.send_modify(|records| {
            if let Some(r) = records.iter_mut().find(|r| &r.id == id) {
                changes.apply_to(r);
            }
        });

        if let Err(e) = self.store.update(&self.scope, id, &changes).await {
            log::error!("{}: edit of {} failed: {}", self.scope.key(), id, e);
            self.records.send_modify(|records| {
                if let Some(r) = records.iter_mut().find(|r| &r.id == id) {
                    *r = previous;
                }
            });
            self.report(Action::Edit, &e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Record with the given id and its index in the snapshot
    pub fn find(&self, id: &RecordId) -> Option<(usize, OrderedRecord)> {
        self.records
            .borrow()
            .iter()
            .enumerate()
            .find(|(_, r)| &r.id == id)
            .map(|(i, r)| (i, r.clone()))
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}
