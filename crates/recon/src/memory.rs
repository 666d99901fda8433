//! In-memory [`Store`] for tests and dry runs.
//!
//! Behaves like a single-table database: ids are assigned in insert order and
//! `insert_all` is all-or-nothing. Failures can be injected to exercise the
//! committer's partial-failure paths.

use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::model::{Identity, ReconciliationRecord, StoredRecord};
use crate::store::{BatchInsertError, CallContext, RecordPatch, Store};

#[derive(Debug, Default)]
struct State {
    records: Vec<StoredRecord>,
    next_id: i64,
    insert_attempts: usize,
    fail_insert_at: Option<usize>,
    unavailable: bool,
    lookups: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with records, assigning ids from 1.
    pub fn with_records(records: impl IntoIterator<Item = ReconciliationRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock_infallible();
            for record in records {
                state.next_id += 1;
                let id = state.next_id;
                state.records.push(StoredRecord { id, record });
            }
        }
        store
    }

    /// Make the n-th insert attempt (1-based, counted across calls) fail with a write error.
    pub fn fail_insert_at(&self, attempt: usize) {
        self.lock_infallible().fail_insert_at = Some(attempt);
    }

    /// Simulate a lost connection for every subsequent call.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock_infallible().unavailable = unavailable;
    }

    /// Number of point lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lock_infallible().lookups
    }

    /// Snapshot of the stored records in id order.
    pub fn records(&self) -> Vec<StoredRecord> {
        self.lock_infallible().records.clone()
    }

    pub fn len(&self) -> usize {
        self.lock_infallible().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_infallible(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, ctx: &CallContext) -> Result<MutexGuard<'_, State>, StoreError> {
        ctx.check()?;
        let state = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(state)
    }
}

impl State {
    /// Count an insert attempt; error if it is the injected failure.
    fn attempt_insert(&mut self) -> Result<(), StoreError> {
        self.insert_attempts += 1;
        if self.fail_insert_at == Some(self.insert_attempts) {
            return Err(StoreError::Write(format!(
                "injected failure on insert {}",
                self.insert_attempts
            )));
        }
        Ok(())
    }

    fn push(&mut self, record: ReconciliationRecord) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.records.push(StoredRecord { id, record });
        id
    }
}

impl Store for MemoryStore {
    fn point_lookup(
        &self,
        ctx: &CallContext,
        identity: &Identity,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let mut state = self.enter(ctx)?;
        state.lookups += 1;
        Ok(state
            .records
            .iter()
            .filter(|r| {
                r.record.order_number == identity.order_number
                    && r.record.material_number.as_deref() == Some(identity.material_number.as_str())
            })
            .cloned()
            .collect())
    }

    fn insert(&self, ctx: &CallContext, record: &ReconciliationRecord) -> Result<i64, StoreError> {
        let mut state = self.enter(ctx)?;
        state.attempt_insert()?;
        Ok(state.push(record.clone()))
    }

    fn insert_all(
        &self,
        ctx: &CallContext,
        records: &[ReconciliationRecord],
    ) -> Result<usize, BatchInsertError> {
        let mut state = self
            .enter(ctx)
            .map_err(|source| BatchInsertError { index: 0, source })?;

        let checkpoint = (state.records.len(), state.next_id);
        for (index, record) in records.iter().enumerate() {
            if let Err(source) = state.attempt_insert() {
                state.records.truncate(checkpoint.0);
                state.next_id = checkpoint.1;
                return Err(BatchInsertError { index, source });
            }
            state.push(record.clone());
        }
        Ok(records.len())
    }

    fn scan_all(&self, ctx: &CallContext) -> Result<Vec<StoredRecord>, StoreError> {
        let state = self.enter(ctx)?;
        Ok(state.records.clone())
    }

    fn update(
        &self,
        ctx: &CallContext,
        order_number: &str,
        patch: &RecordPatch,
    ) -> Result<usize, StoreError> {
        let mut state = self.enter(ctx)?;
        let mut affected = 0;
        for stored in state
            .records
            .iter_mut()
            .filter(|r| r.record.order_number == order_number)
        {
            patch.apply(&mut stored.record);
            affected += 1;
        }
        Ok(affected)
    }

    fn delete(&self, ctx: &CallContext, order_number: &str) -> Result<usize, StoreError> {
        let mut state = self.enter(ctx)?;
        let before = state.records.len();
        state.records.retain(|r| r.record.order_number != order_number);
        Ok(before - state.records.len())
    }
}
