// SQLite-backed record store over an r2d2 connection pool
//
// The pool is built once by the caller and passed around by reference.
// Every call checks the caller's CallContext first, waits for a connection
// no longer than the context allows, and caps SQLite's lock wait the same way.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use tracing::{debug, warn};

use ordrecon_recon::model::{Identity, ReconciliationRecord, StoredRecord};
use ordrecon_recon::store::{BatchInsertError, CallContext, FieldUpdate, RecordPatch, Store};
use ordrecon_recon::StoreError;

/// Schema migrations, applied in order. `PRAGMA user_version` records how many ran.
const MIGRATIONS: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS reconciliation_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_number TEXT NOT NULL CHECK (length(trim(order_number)) > 0),
    material_number TEXT,
    sales_document INTEGER,
    order_date TEXT,                -- ISO 8601 date
    batch_number TEXT,
    year INTEGER,
    club_name TEXT,
    order_type TEXT,
    status TEXT,
    cdd TEXT,
    ship_out_date TEXT,             -- ISO 8601 date
    tracking_number TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_identity
    ON reconciliation_records (order_number, material_number);
"#,
];

const SELECT_COLUMNS: &str = "id, order_number, material_number, sales_document, order_date, \
    batch_number, year, club_name, order_type, status, cdd, ship_out_date, tracking_number, created_by";

const INSERT_SQL: &str = "INSERT INTO reconciliation_records (order_number, material_number, \
    sales_document, order_date, batch_number, year, club_name, order_type, status, cdd, \
    ship_out_date, tracking_number, created_by, created_at) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Most connections the pool holds open; at least one.
    pub pool_size: usize,
    /// Longest SQLite may wait on a database lock, before any caller deadline.
    pub busy_timeout: Duration,
    /// Longest an unbounded call waits for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pool_size: 4,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

type Pooled = PooledConnection<SqliteConnectionManager>;

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    busy_timeout: Duration,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("pool_size", &self.pool.max_size())
            .field("busy_timeout", &self.busy_timeout)
            .finish()
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    ///
    /// Setup runs on a direct connection so a bad path fails at once; pooled
    /// connections are then opened on demand.
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self, StoreError> {
        let setup = Connection::open(path).map_err(unavailable)?;
        setup.busy_timeout(options.busy_timeout).map_err(unavailable)?;
        setup
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(unavailable)?;
        migrate(&setup)?;
        drop(setup);

        let busy = options.busy_timeout;
        let manager =
            SqliteConnectionManager::file(path).with_init(move |conn| conn.busy_timeout(busy));
        let pool = Pool::builder()
            .max_size(pool_size(options.pool_size))
            .min_idle(Some(0))
            .connection_timeout(options.acquire_timeout)
            .build(manager)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        debug!(path = %path.display(), pool_size = pool.max_size(), "record store opened");
        Ok(Self {
            pool,
            busy_timeout: options.busy_timeout,
        })
    }

    /// Private in-memory database. A single connection that is never
    /// recycled, since each in-memory connection sees its own database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let options = StoreOptions::default();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(options.acquire_timeout)
            .build(SqliteConnectionManager::memory())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let store = Self {
            pool,
            busy_timeout: options.busy_timeout,
        };
        migrate(&*store.connection(&CallContext::unbounded())?)?;
        Ok(store)
    }

    pub fn pool_size(&self) -> usize {
        self.pool.max_size() as usize
    }

    /// Take a pooled connection, waiting no longer than the context allows.
    fn connection(&self, ctx: &CallContext) -> Result<Pooled, StoreError> {
        ctx.check()?;
        let acquired = match ctx.remaining() {
            Some(remaining) => self.pool.get_timeout(remaining),
            None => self.pool.get(),
        };
        let conn = match acquired {
            Ok(conn) => conn,
            Err(e) => {
                // a pool timeout past the caller's deadline is the caller's timeout
                ctx.check()?;
                return Err(StoreError::Unavailable(format!("no free connection: {e}")));
            }
        };
        let wait = ctx
            .remaining()
            .map_or(self.busy_timeout, |r| r.min(self.busy_timeout));
        conn.busy_timeout(wait).map_err(unavailable)?;
        Ok(conn)
    }
}

fn pool_size(requested: usize) -> u32 {
    u32::try_from(requested.max(1)).unwrap_or(u32::MAX)
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let applied: usize = conn
        .pragma_query_value(None, "user_version", |row| row.get::<_, i64>(0))
        .map_err(unavailable)?
        .try_into()
        .unwrap_or(0);

    for (version, sql) in MIGRATIONS.iter().enumerate().skip(applied) {
        conn.execute_batch(sql).map_err(write_error)?;
        conn.pragma_update(None, "user_version", (version + 1) as i64)
            .map_err(write_error)?;
        debug!(version = version + 1, "record store migrated");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn is_connectivity(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::SystemIoFailure
        )
    )
}

fn unavailable(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn query_error(e: rusqlite::Error) -> StoreError {
    if is_connectivity(&e) {
        unavailable(e)
    } else {
        StoreError::Query(e.to_string())
    }
}

fn write_error(e: rusqlite::Error) -> StoreError {
    if is_connectivity(&e) {
        unavailable(e)
    } else {
        StoreError::Write(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn date_to_sql(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn date_from_sql(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        NaiveDate::parse_from_str(&t, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn stored_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        record: ReconciliationRecord {
            order_number: row.get(1)?,
            material_number: row.get(2)?,
            sales_document: row.get(3)?,
            order_date: date_from_sql(row, 4)?,
            batch_number: row.get(5)?,
            year: row.get(6)?,
            club_name: row.get(7)?,
            order_type: row.get(8)?,
            status: row.get(9)?,
            cdd: row.get(10)?,
            ship_out_date: date_from_sql(row, 11)?,
            tracking_number: row.get(12)?,
            created_by: row.get(13)?,
        },
    })
}

fn insert_record(conn: &Connection, record: &ReconciliationRecord) -> rusqlite::Result<i64> {
    let mut stmt = conn.prepare_cached(INSERT_SQL)?;
    stmt.execute(params![
        record.order_number,
        record.material_number,
        record.sales_document,
        date_to_sql(record.order_date),
        record.batch_number,
        record.year,
        record.club_name,
        record.order_type,
        record.status,
        record.cdd,
        date_to_sql(record.ship_out_date),
        record.tracking_number,
        record.created_by,
    ])?;
    Ok(conn.last_insert_rowid())
}

fn lookup(conn: &Connection, identity: &Identity) -> rusqlite::Result<Vec<StoredRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {SELECT_COLUMNS} FROM reconciliation_records \
         WHERE order_number = ?1 AND material_number = ?2 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![identity.order_number, identity.material_number], stored_from_row)?;
    rows.collect()
}

fn text(v: &Option<String>) -> Value {
    v.clone().map_or(Value::Null, Value::Text)
}

fn date(v: &Option<NaiveDate>) -> Value {
    date_to_sql(*v).map_or(Value::Null, Value::Text)
}

/// Column and bound value for one patch entry.
fn assignment(update: &FieldUpdate) -> (&'static str, Value) {
    match update {
        FieldUpdate::MaterialNumber(v) => ("material_number", text(v)),
        FieldUpdate::SalesDocument(v) => ("sales_document", v.map_or(Value::Null, Value::Integer)),
        FieldUpdate::OrderDate(v) => ("order_date", date(v)),
        FieldUpdate::BatchNumber(v) => ("batch_number", text(v)),
        FieldUpdate::Year(v) => ("year", v.map_or(Value::Null, |y| Value::Integer(i64::from(y)))),
        FieldUpdate::ClubName(v) => ("club_name", text(v)),
        FieldUpdate::OrderType(v) => ("order_type", text(v)),
        FieldUpdate::Status(v) => ("status", text(v)),
        FieldUpdate::Cdd(v) => ("cdd", text(v)),
        FieldUpdate::ShipOutDate(v) => ("ship_out_date", date(v)),
        FieldUpdate::TrackingNumber(v) => ("tracking_number", text(v)),
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

impl Store for SqliteStore {
    fn point_lookup(
        &self,
        ctx: &CallContext,
        identity: &Identity,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let conn = self.connection(ctx)?;
        lookup(&conn, identity).map_err(query_error)
    }

    /// One pooled connection serves every identity of the call.
    fn lookup_many(
        &self,
        ctx: &CallContext,
        identities: &[Identity],
    ) -> Result<HashMap<Identity, Vec<StoredRecord>>, StoreError> {
        let conn = self.connection(ctx)?;
        let mut found = HashMap::new();
        for identity in identities {
            ctx.check()?;
            let records = lookup(&conn, identity).map_err(query_error)?;
            if !records.is_empty() {
                found.insert(identity.clone(), records);
            }
        }
        Ok(found)
    }

    fn insert(&self, ctx: &CallContext, record: &ReconciliationRecord) -> Result<i64, StoreError> {
        let conn = self.connection(ctx)?;
        insert_record(&conn, record).map_err(write_error)
    }

    fn insert_all(
        &self,
        ctx: &CallContext,
        records: &[ReconciliationRecord],
    ) -> Result<usize, BatchInsertError> {
        let at = |index: usize| move |source: StoreError| BatchInsertError { index, source };

        let mut conn = self.connection(ctx).map_err(at(0))?;
        let tx = conn.transaction().map_err(|e| at(0)(write_error(e)))?;
        for (index, record) in records.iter().enumerate() {
            ctx.check().map_err(at(index))?;
            insert_record(&tx, record).map_err(|e| at(index)(write_error(e)))?;
        }
        tx.commit().map_err(|e| {
            warn!(error = %e, "batch commit failed");
            at(records.len().saturating_sub(1))(write_error(e))
        })?;
        Ok(records.len())
    }

    fn scan_all(&self, ctx: &CallContext) -> Result<Vec<StoredRecord>, StoreError> {
        let conn = self.connection(ctx)?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM reconciliation_records ORDER BY id"
            ))
            .map_err(query_error)?;
        let rows = stmt.query_map([], stored_from_row).map_err(query_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_error)
    }

    fn update(
        &self,
        ctx: &CallContext,
        order_number: &str,
        patch: &RecordPatch,
    ) -> Result<usize, StoreError> {
        if patch.is_empty() {
            return Ok(0);
        }
        let (columns, mut values): (Vec<&str>, Vec<Value>) =
            patch.updates.iter().map(assignment).unzip();
        let set = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE reconciliation_records SET {set} WHERE order_number = ?{}",
            values.len() + 1
        );
        values.push(Value::Text(order_number.to_string()));

        let conn = self.connection(ctx)?;
        conn.execute(&sql, params_from_iter(values.iter()))
            .map_err(write_error)
    }

    fn delete(&self, ctx: &CallContext, order_number: &str) -> Result<usize, StoreError> {
        let conn = self.connection(ctx)?;
        conn.execute(
            "DELETE FROM reconciliation_records WHERE order_number = ?1",
            params![order_number],
        )
        .map_err(write_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(order: &str, material: Option<&str>) -> ReconciliationRecord {
        let mut rec = ReconciliationRecord::new(order, "system");
        rec.material_number = material.map(String::from);
        rec
    }

    #[test]
    fn absent_fields_are_stored_as_null() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ctx = CallContext::unbounded();
        store.insert(&ctx, &record("A1", None)).unwrap();

        let conn = store.connection(&ctx).unwrap();
        let (nulls, empties): (i64, i64) = conn
            .query_row(
                "SELECT \
                   (material_number IS NULL) + (sales_document IS NULL) + (order_date IS NULL) \
                   + (batch_number IS NULL) + (year IS NULL) + (club_name IS NULL), \
                   (SELECT COUNT(*) FROM reconciliation_records WHERE club_name = '' OR year = 0) \
                 FROM reconciliation_records",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(nulls, 6);
        assert_eq!(empties, 0);
    }

    #[test]
    fn migrations_are_recorded_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.connection(&CallContext::unbounded()).unwrap();
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);
        migrate(&conn).unwrap();
    }

    #[test]
    fn blank_order_number_violates_schema() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .insert(&CallContext::unbounded(), &record("  ", None))
            .unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
    }

    #[test]
    fn update_with_repeated_column_keeps_last_value() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ctx = CallContext::unbounded();
        store.insert(&ctx, &record("A1", Some("M1"))).unwrap();
        let patch = RecordPatch {
            updates: vec![
                FieldUpdate::Status(Some("OPEN".into())),
                FieldUpdate::Status(Some("SHIPPED".into())),
            ],
        };
        assert_eq!(store.update(&ctx, "A1", &patch).unwrap(), 1);
        let rec = &store.scan_all(&ctx).unwrap()[0].record;
        assert_eq!(rec.status.as_deref(), Some("SHIPPED"));
    }

    #[test]
    fn exhausted_pool_times_out_at_the_call_deadline() {
        let store = SqliteStore::open_in_memory().unwrap();
        let _held = store.connection(&CallContext::unbounded()).unwrap();

        let started = std::time::Instant::now();
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        let err = store
            .point_lookup(
                &ctx,
                &Identity {
                    order_number: "A1".into(),
                    material_number: "M1".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::TimedOut), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn pool_size_is_at_least_one() {
        assert_eq!(pool_size(0), 1);
        assert_eq!(pool_size(8), 8);
    }
}
