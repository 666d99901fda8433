// Upload parsing, report export and the SQLite record store

pub mod csv;
pub mod error;
pub mod export;
pub mod grid;
pub mod store;
pub mod upload;
pub mod xlsx;

pub use error::IoError;
pub use export::{write_report, ExportFormat};
pub use store::{SqliteStore, StoreOptions};
pub use upload::{StagedUpload, UploadFormat};
