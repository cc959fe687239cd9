//! Connection gateway for the clinic store.
//!
//! One [`Session`] owns the single process-wide connection. It opens lazily on
//! first use, funnels every statement through [`Session::query`] and
//! [`Session::execute`], and reopens after a connection-level fault.

mod schema;

pub use schema::*;

use std::cell::RefCell;
use std::fmt;
use std::path::Path;

use chrono::{Local, NaiveDateTime, SubsecRound};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Params, Row, Transaction};
use thiserror::Error;

use crate::config::{DatabaseConfig, StoreLocation, CONFIG_FILE_NAME, IN_MEMORY_DATABASE};

/// Why a connection could not be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The store exists but refused access
    AccessDenied,
    /// The store could not be reached or opened
    Unreachable,
    /// The target is not a clinic store
    NotADatabase,
    /// The configuration asks for something the store cannot do
    Unsupported,
    Other,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectFailure::AccessDenied => "access denied",
            ConnectFailure::Unreachable => "unreachable",
            ConnectFailure::NotADatabase => "not a database",
            ConnectFailure::Unsupported => "unsupported setting",
            ConnectFailure::Other => "connection failed",
        };
        f.write_str(text)
    }
}

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Cannot connect to clinic store ({kind}): {detail}")]
    Connection { kind: ConnectFailure, detail: String },

    #[error("Query failed: {0}")]
    Query(#[source] rusqlite::Error),

    #[error("Write failed: {0}")]
    Storage(#[source] rusqlite::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

impl DbError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        DbError::Validation(message.into())
    }

    fn connection(kind: ConnectFailure, detail: impl Into<String>) -> Self {
        DbError::Connection {
            kind,
            detail: detail.into(),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Snapshot of the session's connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub host: String,
    pub database: String,
    pub user: String,
    pub port: u16,
    pub charset: String,
    pub connected: bool,
}

/// The single storage session.
///
/// Not re-entrant: row mappers and unit-of-work closures must not call back
/// into the session.
pub struct Session {
    config: DatabaseConfig,
    location: StoreLocation,
    conn: RefCell<Option<Connection>>,
}

impl Session {
    /// Create a session for `config`; nothing is opened until first use.
    ///
    /// `base_dir` is the directory the store file is resolved against
    /// (normally the directory holding the configuration document).
    pub fn new(config: DatabaseConfig, base_dir: &Path) -> Self {
        let location = config.location(base_dir);
        Self {
            config,
            location,
            conn: RefCell::new(None),
        }
    }

    /// Create a connected in-memory session (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let config = DatabaseConfig {
            database: IN_MEMORY_DATABASE.into(),
            ..DatabaseConfig::default()
        };
        let session = Self::new(config, Path::new("."));
        session.connect()?;
        Ok(session)
    }

    /// Establish the connection now (no-op when already connected).
    pub fn connect(&self) -> DbResult<()> {
        let mut slot = self.conn.borrow_mut();
        self.ensure_open(&mut slot)
    }

    /// Close the connection. The next statement reopens it.
    pub fn disconnect(&self) {
        if let Some(conn) = self.conn.borrow_mut().take() {
            match conn.close() {
                Ok(()) => tracing::info!(database = %self.config.database, "clinic store closed"),
                Err((_, err)) => tracing::error!(error = %err, "error closing clinic store"),
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.borrow().is_some()
    }

    /// Open and close a separate connection with the current settings.
    pub fn test_connection(&self) -> DbResult<()> {
        let conn = self.open()?;
        drop(conn);
        tracing::info!(database = %self.config.database, "connection test succeeded");
        Ok(())
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            host: self.config.host.clone(),
            database: self.config.database.clone(),
            user: self.config.user.clone(),
            port: self.config.port,
            charset: self.config.charset.clone(),
            connected: self.is_connected(),
        }
    }

    /// Human-readable diagnostic for an error raised by this session.
    pub fn diagnose(&self, err: &DbError) -> String {
        match err {
            DbError::Connection {
                kind: ConnectFailure::AccessDenied,
                ..
            } => format!(
                "{err}\nCheck the following settings:\n  user: {}\n  password: {}\n  host: {}\n  port: {}\n  database: {}\nEdit {CONFIG_FILE_NAME} to change them.",
                self.config.user,
                self.config.masked_password(),
                self.config.host,
                self.config.port,
                self.config.database,
            ),
            other => other.to_string(),
        }
    }

    /// Run a row-returning statement.
    pub fn query<T, P, F>(&self, sql: &str, params: P, map: F) -> DbResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        tracing::debug!(sql, "query");
        self.run(DbError::Query, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, map)?;
            rows.collect::<rusqlite::Result<Vec<T>>>()
        })
    }

    /// Run a statement expected to return at most one row.
    pub fn query_opt<T, P, F>(&self, sql: &str, params: P, map: F) -> DbResult<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        tracing::debug!(sql, "query");
        self.run(DbError::Query, |conn| conn.query_row(sql, params, map).optional())
    }

    /// Run an INSERT/UPDATE/DELETE; returns the number of affected rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> DbResult<usize> {
        tracing::debug!(sql, "execute");
        self.run(DbError::Storage, |conn| conn.execute(sql, params))
    }

    /// Run several statements separated by `;`.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.run(DbError::Storage, |conn| conn.execute_batch(sql))
    }

    /// Identifier assigned by the most recent insert on this session.
    pub fn last_insert_id(&self) -> DbResult<i64> {
        self.run(DbError::Query, |conn| Ok(conn.last_insert_rowid()))
    }

    pub fn table_exists(&self, name: &str) -> DbResult<bool> {
        let found = self.query_opt(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(found.is_some())
    }

    /// Run `work` as one atomic unit: committed if it returns `Ok`, rolled
    /// back entirely otherwise.
    pub fn transaction<T, F>(&self, work: F) -> DbResult<T>
    where
        F: FnOnce(&UnitOfWork<'_>) -> DbResult<T>,
    {
        let mut slot = self.conn.borrow_mut();
        self.ensure_open(&mut slot)?;
        let Some(conn) = slot.as_mut() else {
            return Err(DbError::connection(ConnectFailure::Other, "connection unavailable"));
        };

        if !conn.is_autocommit() {
            tracing::warn!("rolling back abandoned transaction");
            conn.execute_batch("ROLLBACK").map_err(DbError::Storage)?;
        }

        let unit = UnitOfWork {
            tx: conn.transaction().map_err(DbError::Storage)?,
        };

        match work(&unit) {
            Ok(value) => {
                unit.tx.commit().map_err(DbError::Storage)?;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(error = %err, "rolling back unit of work");
                if let Err(rollback_err) = unit.tx.rollback() {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    fn run<T>(
        &self,
        wrap: fn(rusqlite::Error) -> DbError,
        op: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> DbResult<T> {
        let mut slot = self.conn.borrow_mut();
        self.ensure_open(&mut slot)?;
        let Some(conn) = slot.as_mut() else {
            return Err(DbError::connection(ConnectFailure::Other, "connection unavailable"));
        };

        match op(conn) {
            Ok(value) => Ok(value),
            Err(err) => {
                if is_connection_fault(&err) {
                    tracing::warn!(error = %err, "discarding faulted connection");
                    *slot = None;
                }
                tracing::error!(error = %err, "statement failed");
                Err(wrap(err))
            }
        }
    }

    fn ensure_open(&self, slot: &mut Option<Connection>) -> DbResult<()> {
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        Ok(())
    }

    fn open(&self) -> DbResult<Connection> {
        if !self.config.is_local_host() {
            return Err(DbError::connection(
                ConnectFailure::Unreachable,
                format!("host {} is not served by the embedded store", self.config.host),
            ));
        }
        let encoding = store_encoding(&self.config.charset)?;

        let conn = match &self.location {
            StoreLocation::Memory => Connection::open_in_memory(),
            StoreLocation::File(path) => Connection::open(path),
        }
        .map_err(connect_error)?;

        conn.pragma_update(None, "encoding", encoding)
            .map_err(connect_error)?;
        let shared_secrets = has_table(&conn, "formulas").map_err(connect_error)?
            && !has_table(&conn, "secret_formulas").map_err(connect_error)?;
        conn.execute_batch(SCHEMA).map_err(connect_error)?;
        if shared_secrets {
            tracing::info!("secret formulas kept in the formula table");
        } else {
            conn.execute_batch(SECRET_FORMULAS_SCHEMA)
                .map_err(connect_error)?;
        }

        tracing::info!(
            database = %self.config.database,
            user = %self.config.user,
            "connected to clinic store"
        );
        Ok(conn)
    }
}

/// Handle for statements inside [`Session::transaction`].
pub struct UnitOfWork<'c> {
    tx: Transaction<'c>,
}

impl UnitOfWork<'_> {
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> DbResult<usize> {
        tracing::debug!(sql, "execute in unit of work");
        self.tx.execute(sql, params).map_err(DbError::Storage)
    }

    pub fn last_insert_id(&self) -> i64 {
        self.tx.last_insert_rowid()
    }
}

fn store_encoding(charset: &str) -> DbResult<&'static str> {
    match charset.trim().to_ascii_lowercase().as_str() {
        "utf8" | "utf8mb4" | "utf-8" => Ok("UTF-8"),
        "utf16" | "utf16le" | "utf-16le" => Ok("UTF-16le"),
        "utf16be" | "utf-16be" => Ok("UTF-16be"),
        other => Err(DbError::connection(
            ConnectFailure::Unsupported,
            format!("character set {other} is not supported"),
        )),
    }
}

fn connect_error(err: rusqlite::Error) -> DbError {
    let kind = match err.sqlite_error_code() {
        Some(ErrorCode::PermissionDenied)
        | Some(ErrorCode::ReadOnly)
        | Some(ErrorCode::AuthorizationForStatementDenied) => ConnectFailure::AccessDenied,
        Some(ErrorCode::CannotOpen) => ConnectFailure::Unreachable,
        Some(ErrorCode::NotADatabase) => ConnectFailure::NotADatabase,
        _ => ConnectFailure::Other,
    };
    DbError::connection(kind, err.to_string())
}

fn is_connection_fault(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::CannotOpen)
            | Some(ErrorCode::NotADatabase)
            | Some(ErrorCode::SystemIoFailure)
            | Some(ErrorCode::DatabaseCorrupt)
    )
}

fn has_table(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// `LIKE` pattern matching `text` literally anywhere in a column.
/// Use with `ESCAPE '\'`.
pub(crate) fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Current local time at the second precision the store keeps.
pub(crate) fn now_stamp() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_open_in_memory() {
        let session = Session::open_in_memory();
        assert!(session.is_ok());
        assert!(session.unwrap().is_connected());
    }

    #[test]
    fn test_schema_initialized() {
        let session = Session::open_in_memory().unwrap();

        let tables: Vec<String> = session
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
                [],
                |row| row.get(0),
            )
            .unwrap();

        for table in [
            "customers",
            "records",
            "prescriptions",
            "formulas",
            "medicines",
            "secret_formulas",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_lazy_connect_and_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(DatabaseConfig::default(), dir.path());
        assert!(!session.is_connected());

        session
            .execute("INSERT INTO customers (name, gender, create_date) VALUES ('王小明', '男', '2024-01-01 09:00:00')", [])
            .unwrap();
        assert!(session.is_connected());
        assert!(dir.path().join("chinese_medicine_db.sqlite3").exists());

        session.disconnect();
        assert!(!session.is_connected());

        // Reopens transparently and sees the committed row
        let count: Vec<i64> = session
            .query("SELECT COUNT(*) FROM customers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, vec![1]);
    }

    #[test]
    fn test_last_insert_id() {
        let session = Session::open_in_memory().unwrap();
        session
            .execute("INSERT INTO customers (name, gender, create_date) VALUES ('甲', '男', '2024-01-01 09:00:00')", [])
            .unwrap();
        let first = session.last_insert_id().unwrap();
        session
            .execute("INSERT INTO customers (name, gender, create_date) VALUES ('乙', '女', '2024-01-01 09:00:00')", [])
            .unwrap();
        assert_eq!(session.last_insert_id().unwrap(), first + 1);
    }

    #[test]
    fn test_remote_host_is_unreachable() {
        let config = DatabaseConfig {
            host: "db.example.com".into(),
            ..DatabaseConfig::default()
        };
        let session = Session::new(config, Path::new("."));
        let err = session.connect().unwrap_err();
        assert!(matches!(
            err,
            DbError::Connection {
                kind: ConnectFailure::Unreachable,
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_charset() {
        let config = DatabaseConfig {
            database: IN_MEMORY_DATABASE.into(),
            charset: "big5".into(),
            ..DatabaseConfig::default()
        };
        let session = Session::new(config, Path::new("."));
        let err = session.connect().unwrap_err();
        assert!(matches!(
            err,
            DbError::Connection {
                kind: ConnectFailure::Unsupported,
                ..
            }
        ));
    }

    #[test]
    fn test_not_a_database() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("chinese_medicine_db.sqlite3"),
            "this is not a clinic store\n".repeat(64),
        )
        .unwrap();

        let session = Session::new(DatabaseConfig::default(), dir.path());
        let err = session.connect().unwrap_err();
        assert!(matches!(
            err,
            DbError::Connection {
                kind: ConnectFailure::NotADatabase,
                ..
            }
        ));
        assert!(!session.is_connected());
    }

    #[test]
    fn test_diagnose_access_denied_lists_settings() {
        let session = Session::new(DatabaseConfig::default(), Path::new("."));
        let err = DbError::Connection {
            kind: ConnectFailure::AccessDenied,
            detail: "denied".into(),
        };
        let message = session.diagnose(&err);
        assert!(message.contains("user: root"));
        assert!(message.contains("port: 3306"));
        assert!(message.contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_query_error_kind() {
        let session = Session::open_in_memory().unwrap();
        let err = session
            .query("SELECT * FROM no_such_table", [], |row| row.get::<_, i64>(0))
            .unwrap_err();
        assert!(matches!(err, DbError::Query(_)));

        let err = session
            .execute("INSERT INTO no_such_table VALUES (1)", [])
            .unwrap_err();
        assert!(matches!(err, DbError::Storage(_)));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let session = Session::open_in_memory().unwrap();

        let result: DbResult<()> = session.transaction(|unit| {
            unit.execute(
                "INSERT INTO customers (name, gender, create_date) VALUES ('丙', '男', '2024-01-01 09:00:00')",
                [],
            )?;
            Err(DbError::validation("abort"))
        });
        assert!(result.is_err());

        let count: Vec<i64> = session
            .query("SELECT COUNT(*) FROM customers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, vec![0]);
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("甘草"), "%甘草%");
        assert_eq!(contains_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }

    #[test]
    fn test_transaction_recovers_abandoned_transaction() {
        let session = Session::open_in_memory().unwrap();
        session.execute_batch("BEGIN").unwrap();
        session
            .execute("INSERT INTO customers (name, gender, create_date) VALUES ('丁', '男', '2024-01-01 09:00:00')", [])
            .unwrap();

        session
            .transaction(|unit| {
                unit.execute(
                    "INSERT INTO customers (name, gender, create_date) VALUES ('戊', '女', '2024-01-01 09:00:00')",
                    [],
                )
            })
            .unwrap();

        let names: Vec<String> = session
            .query("SELECT name FROM customers ORDER BY id", [], |row| row.get(0))
            .unwrap();
        assert_eq!(names, vec!["戊".to_string()]);
    }
}
