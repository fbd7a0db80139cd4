use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{InvoiceError, Result};

pub const SCHEMA_VERSION: i64 = 2;

pub fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn configure_sqlite(conn: &Connection) -> std::result::Result<(), rusqlite::Error> {
    // Apply PRAGMAs on open (outside any transaction).
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA foreign_keys = ON;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> std::result::Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS invoice_numbers (
            number TEXT PRIMARY KEY NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            counter INTEGER NOT NULL,
            createdAt TEXT NOT NULL,
            UNIQUE (year, counter)
        );

        CREATE TABLE IF NOT EXISTS invoice_documents (
            id TEXT NOT NULL UNIQUE,
            number TEXT PRIMARY KEY NOT NULL REFERENCES invoice_numbers(number),
            kind TEXT NOT NULL,
            language TEXT NOT NULL,
            issueDate TEXT NOT NULL,
            currency TEXT NOT NULL,
            grandTotal REAL NOT NULL,
            customerName TEXT,
            modelSha256 TEXT NOT NULL,
            data_json TEXT NOT NULL,
            createdAt TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_invoice_documents_issueDate ON invoice_documents(issueDate);
        "#,
    )?;
    Ok(())
}

pub fn apply_migrations(conn: &Connection) -> std::result::Result<(), rusqlite::Error> {
    let v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    // v=0 means a fresh DB: init_schema already created the latest tables.
    if v == 0 {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        return Ok(());
    }

    if v < 2 {
        let has_customer: bool = conn
            .prepare("SELECT 1 FROM pragma_table_info('invoice_documents') WHERE name = 'customerName'")?
            .exists([])?;
        if !has_customer {
            conn.execute_batch("ALTER TABLE invoice_documents ADD COLUMN customerName TEXT;")?;
        }
        conn.execute_batch("PRAGMA user_version = 2;")?;
    }

    Ok(())
}

/// Opens a connection with PRAGMAs, schema and migrations applied.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    configure_sqlite(conn)?;
    init_schema(conn)?;
    apply_migrations(conn)?;
    Ok(())
}

/// One shared connection; writers additionally serialize on `write_lock`.
#[derive(Clone)]
pub struct DbState {
    conn: Arc<Mutex<Connection>>,
    write_lock: Arc<Mutex<()>>,
}

impl DbState {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_connection(path)?;
        tracing::info!(db = %path.display(), "database ready");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        prepare(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn with_read<T, F>(&self, op_name: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| InvoiceError::Task("db mutex poisoned".to_string()))?;
            f(&guard).map_err(|e| log_failure(op_name, e))
        })
        .await?
    }

    pub async fn with_write<T, F>(&self, op_name: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let write_lock = self.write_lock.clone();
        tokio::task::spawn_blocking(move || {
            let _wg = write_lock
                .lock()
                .map_err(|_| InvoiceError::Task("write mutex poisoned".to_string()))?;
            let mut guard = conn
                .lock()
                .map_err(|_| InvoiceError::Task("db mutex poisoned".to_string()))?;
            f(&mut guard).map_err(|e| log_failure(op_name, e))
        })
        .await?
    }
}

fn log_failure(op_name: &'static str, err: InvoiceError) -> InvoiceError {
    if err.is_user_correctable() {
        tracing::debug!(op = op_name, error = %err, "db operation rejected");
    } else {
        tracing::error!(op = op_name, error = %err, "db operation failed");
    }
    err
}
