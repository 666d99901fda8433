//! The record store as seen by the engine.
//!
//! The engine never owns a connection or a schema. It receives something
//! implementing [`Store`] and a [`CallContext`] that carries the caller's
//! deadline and cancellation flag into every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::model::{Identity, ReconciliationRecord, StoredRecord};

// ---------------------------------------------------------------------------
// Call context
// ---------------------------------------------------------------------------

/// Deadline and cancellation supplied by the caller, checked before each store call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Option<Arc<AtomicBool>>,
}

impl CallContext {
    /// No deadline, no cancellation.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancelled: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Share a flag the caller can set to abort outstanding work.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> Result<(), StoreError> {
        if let Some(ref flag) = self.cancelled {
            if flag.load(Ordering::Relaxed) {
                return Err(StoreError::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(StoreError::TimedOut);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Patches
// ---------------------------------------------------------------------------

/// A single attribute assignment. `None` clears the attribute to NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    MaterialNumber(Option<String>),
    SalesDocument(Option<i64>),
    OrderDate(Option<NaiveDate>),
    BatchNumber(Option<String>),
    Year(Option<i32>),
    ClubName(Option<String>),
    OrderType(Option<String>),
    Status(Option<String>),
    Cdd(Option<String>),
    ShipOutDate(Option<NaiveDate>),
    TrackingNumber(Option<String>),
}

impl FieldUpdate {
    pub fn apply(&self, record: &mut ReconciliationRecord) {
        match self {
            Self::MaterialNumber(v) => record.material_number = v.clone(),
            Self::SalesDocument(v) => record.sales_document = *v,
            Self::OrderDate(v) => record.order_date = *v,
            Self::BatchNumber(v) => record.batch_number = v.clone(),
            Self::Year(v) => record.year = *v,
            Self::ClubName(v) => record.club_name = v.clone(),
            Self::OrderType(v) => record.order_type = v.clone(),
            Self::Status(v) => record.status = v.clone(),
            Self::Cdd(v) => record.cdd = v.clone(),
            Self::ShipOutDate(v) => record.ship_out_date = *v,
            Self::TrackingNumber(v) => record.tracking_number = v.clone(),
        }
    }
}

/// Attribute changes applied to every record of one order number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub updates: Vec<FieldUpdate>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn apply(&self, record: &mut ReconciliationRecord) {
        for update in &self.updates {
            update.apply(record);
        }
    }
}

// ---------------------------------------------------------------------------
// Store capability
// ---------------------------------------------------------------------------

/// Failure of an atomic multi-record insert. Nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInsertError {
    /// Position in the input slice of the record that failed.
    pub index: usize,
    pub source: StoreError,
}

pub trait Store {
    /// Every stored record with exactly this identity.
    fn point_lookup(
        &self,
        ctx: &CallContext,
        identity: &Identity,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// Look up several identities. Implementations may batch the round trips;
    /// identities with no records may be left out of the map.
    fn lookup_many(
        &self,
        ctx: &CallContext,
        identities: &[Identity],
    ) -> Result<HashMap<Identity, Vec<StoredRecord>>, StoreError> {
        let mut found = HashMap::with_capacity(identities.len());
        for identity in identities {
            let records = self.point_lookup(ctx, identity)?;
            if !records.is_empty() {
                found.insert(identity.clone(), records);
            }
        }
        Ok(found)
    }

    /// Insert and commit one record; returns its id.
    fn insert(&self, ctx: &CallContext, record: &ReconciliationRecord) -> Result<i64, StoreError>;

    /// Insert all records in one transaction; all or nothing.
    fn insert_all(
        &self,
        ctx: &CallContext,
        records: &[ReconciliationRecord],
    ) -> Result<usize, BatchInsertError>;

    fn scan_all(&self, ctx: &CallContext) -> Result<Vec<StoredRecord>, StoreError>;

    /// Apply `patch` to every record with this order number; returns the count.
    fn update(
        &self,
        ctx: &CallContext,
        order_number: &str,
        patch: &RecordPatch,
    ) -> Result<usize, StoreError>;

    /// Remove every record with this order number; returns the count.
    fn delete(&self, ctx: &CallContext, order_number: &str) -> Result<usize, StoreError>;
}
