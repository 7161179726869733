use crate::errors::{AppError, AppResult};
use crate::normalize::source::{list_tables, quote_identifier, select_table};
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;

pub const HISTORY_TABLE: &str = "records";

const HISTORY_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS records (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  work_order TEXT,
  shift TEXT,
  device TEXT,
  timestamp REAL,
  timestamp_str TEXT,
  temperature REAL,
  current REAL
);
";

/// One sample in the layout written by the history store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryRow {
    pub work_order: Option<String>,
    pub shift: Option<String>,
    pub device: Option<String>,
    pub timestamp: Option<f64>,
    pub timestamp_str: Option<String>,
    pub temperature: Option<f64>,
    pub current: Option<f64>,
}

pub fn create_history_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(HISTORY_SCHEMA_SQL).map_err(AppError::from)
}

pub fn insert_history_rows(conn: &Connection, rows: &[HistoryRow]) -> AppResult<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO records (work_order, shift, device, timestamp, timestamp_str, temperature, current)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for row in rows {
        stmt.execute(params![
            row.work_order,
            row.shift,
            row.device,
            row.timestamp,
            row.timestamp_str,
            row.temperature,
            row.current,
        ])?;
    }
    Ok(rows.len())
}

/// Serializes a database file holding `rows` in the canonical history layout.
pub fn history_database_bytes(rows: &[HistoryRow]) -> AppResult<Vec<u8>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("history.db");
    {
        let conn = Connection::open(&path)?;
        create_history_schema(&conn)?;
        insert_history_rows(&conn, rows)?;
    }
    Ok(fs::read(&path)?)
}

/// The content written by the clear-history action.
pub fn empty_history_database() -> AppResult<Vec<u8>> {
    history_database_bytes(&[])
}

/// Empties the selected table of a history file on disk in place, then compacts it.
pub fn clear_local_history(path: &Path, preferred_tables: &[String]) -> AppResult<usize> {
    if !path.exists() {
        return Err(AppError::NotFound(format!("{} does not exist", path.display())));
    }
    let conn = Connection::open(path)?;
    let tables = list_tables(&conn)?;
    let Some(table) = select_table(&tables, preferred_tables) else {
        return Err(AppError::NotFound(format!("{} contains no tables", path.display())));
    };
    let removed = conn.execute(&format!("DELETE FROM {}", quote_identifier(table)), [])?;
    conn.execute_batch("VACUUM")?;
    tracing::info!(path = %path.display(), table = %table, removed, "cleared local history");
    Ok(removed)
}
