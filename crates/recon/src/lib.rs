//! `ordrecon-recon`: order reconciliation validation and duplicate detection.
//!
//! Pure engine crate: receives parsed upload rows and a [`Store`], returns
//! typed reports. No CLI, file or database dependencies.

pub mod asof;
pub mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod precommit;
pub mod sanitize;
pub mod store;
pub mod true_dup;

pub use config::{CommitPolicy, ReconConfig};
pub use engine::{check_as_of, delete_records, ingest, scan_true_duplicates, update_records, validate, IngestSummary};
pub use error::{MalformedInput, ReconError, StoreError};
pub use memory::MemoryStore;
pub use model::{Batch, RawRow, ReconciliationRecord, StoredRecord};
pub use store::{CallContext, Store};
