//! In-Memory Record Store
//!
//! Process-local store with a journal of every call it receives and
//! injectable failures. Used for tests and for dry runs of the admin CLI.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::traits::RecordStore;
use crate::domain::{
    DomainError, DomainResult, NewRecord, OrderedRecord, RecordChanges, RecordId, Scope,
};

/// Kind of store call, for journaling and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FetchAll,
    Create,
    Update,
    Delete,
}

/// One call received by the store, successful or not
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    FetchAll { scope: String },
    Create { scope: String, position: i32 },
    Update { id: RecordId, changes: RecordChanges },
    Delete { id: RecordId },
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            StoreCall::FetchAll { .. } => StoreOp::FetchAll,
            StoreCall::Create { .. } => StoreOp::Create,
            StoreCall::Update { .. } => StoreOp::Update,
            StoreCall::Delete { .. } => StoreOp::Delete,
        }
    }
}

#[derive(Debug)]
struct Fault {
    op: StoreOp,
    /// Matching calls that still pass before this fault fires
    skip: usize,
    persistent: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    scopes: HashMap<String, Vec<OrderedRecord>>,
    next_id: u64,
    last_created: Option<DateTime<Utc>>,
    journal: Vec<StoreCall>,
    faults: Vec<Fault>,
}

impl MemoryState {
    /// Record the call and decide whether an injected fault fires
    fn enter(&mut self, call: StoreCall) -> DomainResult<()> {
        let op = call.op();
        self.journal.push(call);

        let Some(idx) = self.faults.iter().position(|f| f.op == op) else {
            return Ok(());
        };
        let fault = &mut self.faults[idx];
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        if !fault.persistent {
            self.faults.remove(idx);
        }
        Err(DomainError::Unavailable(format!("injected {:?} failure", op)))
    }

    /// Creation times strictly increase so ties sort in insertion order
    fn created_now(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_created = Some(ts);
        ts
    }

    fn find_mut(&mut self, scope: &Scope, id: &RecordId) -> DomainResult<&mut OrderedRecord> {
        self.scopes
            .get_mut(&scope.key())
            .and_then(|records| records.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| DomainError::NotFound(format!("Record {} not found", id)))
    }
}

/// In-memory implementation of the record store
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of a scope
    pub async fn seed(&self, scope: &Scope, records: Vec<OrderedRecord>) {
        let mut state = self.state.lock().await;
        state.scopes.insert(scope.key(), records);
    }

    /// Current contents of a scope, in storage order
    pub async fn records(&self, scope: &Scope) -> Vec<OrderedRecord> {
        let state = self.state.lock().await;
        state.scopes.get(&scope.key()).cloned().unwrap_or_default()
    }

    /// Make the `nth` next call of `op` (0-based) fail once
    pub async fn fail_nth(&self, op: StoreOp, nth: usize) {
        self.state.lock().await.faults.push(Fault {
            op,
            skip: nth,
            persistent: false,
        });
    }

    /// Make every call of `op` fail until faults are cleared
    pub async fn fail_always(&self, op: StoreOp) {
        self.state.lock().await.faults.push(Fault {
            op,
            skip: 0,
            persistent: true,
        });
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    /// Every call received so far
    pub async fn journal(&self) -> Vec<StoreCall> {
        self.state.lock().await.journal.clone()
    }

    pub async fn clear_journal(&self) {
        self.state.lock().await.journal.clear();
    }

    /// Calls of one kind received so far
    pub async fn calls(&self, op: StoreOp) -> Vec<StoreCall> {
        self.state
            .lock()
            .await
            .journal
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_all(&self, scope: &Scope) -> DomainResult<Vec<OrderedRecord>> {
        let mut state = self.state.lock().await;
        state.enter(StoreCall::FetchAll { scope: scope.key() })?;
        Ok(state.scopes.get(&scope.key()).cloned().unwrap_or_default())
    }

    async fn create(&self, scope: &Scope, record: &NewRecord) -> DomainResult<OrderedRecord> {
        let mut state = self.state.lock().await;
        state.enter(StoreCall::Create {
            scope: scope.key(),
            position: record.position,
        })?;

        state.next_id += 1;
        let created = OrderedRecord {
            id: RecordId::new(format!("m{}", state.next_id)),
            position: record.position,
            created_at: Some(state.created_now()),
            payload: record.payload.clone(),
        };
        state.scopes.entry(scope.key()).or_default().push(created.clone());
        Ok(created)
    }

    async fn update(&self, scope: &Scope, id: &RecordId, changes: &RecordChanges) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        state.enter(StoreCall::Update {
            id: id.clone(),
            changes: changes.clone(),
        })?;
        changes.validate()?;

        let record = state.find_mut(scope, id)?;
        changes.apply_to(record);
        Ok(())
    }

    async fn delete(&self, scope: &Scope, id: &RecordId) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        state.enter(StoreCall::Delete { id: id.clone() })?;

        let records = state.scopes.entry(scope.key()).or_default();
        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Err(DomainError::NotFound(format!("Record {} not found", id)));
        }
        Ok(())
    }
}
