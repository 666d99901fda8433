//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                                   |
//! |---------|------------|-----------------------------------------------|
//! | 0       | Universal  | Success                                       |
//! | 1       | Universal  | General error (unspecified)                   |
//! | 2       | Universal  | CLI usage error (bad args, bad --set)         |
//! | 3-9     | input      | Upload files and row validation               |
//! | 10-19   | findings   | Duplicate and as-of findings                  |
//! | 20-29   | store      | Record store availability and persistence     |
//! | 30-39   | config     | Engine rules file                             |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the mapping functions below

use ordrecon_io::IoError;
use ordrecon_recon::{ReconError, StoreError};

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Input (3-9)
// =============================================================================

/// Upload or report file could not be opened, read or written.
pub const EXIT_IO: u8 = 3;

/// Upload could not be parsed, or its extension is not supported.
pub const EXIT_PARSE: u8 = 4;

/// Batch is empty or its first row lacks required columns.
pub const EXIT_MALFORMED: u8 = 5;

/// One or more rows failed validation; nothing was written.
pub const EXIT_ROW_INVALID: u8 = 6;

/// `records update/delete` matched no stored record.
pub const EXIT_NOT_FOUND: u8 = 7;

// =============================================================================
// Findings (10-19)
// =============================================================================

/// Upload collides with stored or same-batch identities; nothing was written.
pub const EXIT_DUPLICATE_CONFLICT: u8 = 10;

/// As-of upload has rows whose batch number disagrees with the store.
pub const EXIT_AS_OF_FLAGGED: u8 = 11;

/// Store holds identities recorded under more than one batch number.
pub const EXIT_TRUE_DUPLICATES: u8 = 12;

// =============================================================================
// Store (20-29)
// =============================================================================

/// Database cannot be opened or is locked.
pub const EXIT_STORE_UNAVAILABLE: u8 = 20;

/// Store call exceeded --timeout-ms.
pub const EXIT_STORE_TIMEOUT: u8 = 21;

/// Store call was cancelled.
pub const EXIT_STORE_CANCELLED: u8 = 22;

/// A query or write was refused by the database.
pub const EXIT_STORE_FAILED: u8 = 23;

/// Commit stopped part-way; some rows of the batch were written.
pub const EXIT_PERSISTENCE: u8 = 24;

// =============================================================================
// Config (30-39)
// =============================================================================

/// Engine rules file cannot be read, parsed or validated.
pub const EXIT_CONFIG_INVALID: u8 = 30;

// =============================================================================
// Mapping
// =============================================================================

pub fn store_exit_code(err: &StoreError) -> u8 {
    match err {
        StoreError::Unavailable(_) => EXIT_STORE_UNAVAILABLE,
        StoreError::TimedOut => EXIT_STORE_TIMEOUT,
        StoreError::Cancelled => EXIT_STORE_CANCELLED,
        StoreError::Query(_) | StoreError::Write(_) => EXIT_STORE_FAILED,
    }
}

pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::MalformedInput(_) => EXIT_MALFORMED,
        ReconError::RowValidation(_) => EXIT_ROW_INVALID,
        ReconError::DuplicateConflict(_) => EXIT_DUPLICATE_CONFLICT,
        ReconError::PersistenceFailure { .. } => EXIT_PERSISTENCE,
        ReconError::StoreUnavailable(e) => store_exit_code(e),
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_CONFIG_INVALID,
    }
}

pub fn io_exit_code(err: &IoError) -> u8 {
    match err {
        IoError::Open { .. } | IoError::Read(_) | IoError::Write(_) => EXIT_IO,
        IoError::Parse { .. } | IoError::UnsupportedFormat(_) => EXIT_PARSE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_keep_their_cause() {
        let timed_out = ReconError::StoreUnavailable(StoreError::TimedOut);
        assert_eq!(recon_exit_code(&timed_out), EXIT_STORE_TIMEOUT);
        let locked = ReconError::StoreUnavailable(StoreError::Unavailable("locked".into()));
        assert_eq!(recon_exit_code(&locked), EXIT_STORE_UNAVAILABLE);
    }

    #[test]
    fn codes_are_unique() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_IO,
            EXIT_PARSE,
            EXIT_MALFORMED,
            EXIT_ROW_INVALID,
            EXIT_NOT_FOUND,
            EXIT_DUPLICATE_CONFLICT,
            EXIT_AS_OF_FLAGGED,
            EXIT_TRUE_DUPLICATES,
            EXIT_STORE_UNAVAILABLE,
            EXIT_STORE_TIMEOUT,
            EXIT_STORE_CANCELLED,
            EXIT_STORE_FAILED,
            EXIT_PERSISTENCE,
            EXIT_CONFIG_INVALID,
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
