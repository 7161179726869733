use crate::errors::{AppError, AppResult};
use crate::models::{Cell, RawTable, SourceFormat};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::io::Write;

pub const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const PAYLOAD_COLUMN: &str = "data";

pub fn detect_format(bytes: &[u8]) -> SourceFormat {
    if bytes.starts_with(SQLITE_MAGIC) {
        SourceFormat::Sqlite
    } else {
        SourceFormat::Delimited
    }
}

/// Lists user tables in `sqlite_master` order.
pub fn list_tables(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY rowid",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// First preferred name present (case-insensitive), else the first table listed.
pub fn select_table<'a>(tables: &'a [String], preferred: &[String]) -> Option<&'a String> {
    preferred
        .iter()
        .find_map(|wanted| tables.iter().find(|table| table.eq_ignore_ascii_case(wanted)))
        .or_else(|| tables.first())
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn read_table(conn: &Connection, table: &str) -> AppResult<RawTable> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_identifier(table)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(ToString::to_string).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut cells = Vec::with_capacity(width);
        for index in 0..width {
            cells.push(match row.get_ref(index)? {
                ValueRef::Null | ValueRef::Blob(_) => Cell::Null,
                ValueRef::Integer(value) => Cell::Integer(value),
                ValueRef::Real(value) => Cell::Real(value),
                ValueRef::Text(text) => Cell::Text(String::from_utf8_lossy(text).into_owned()),
            });
        }
        rows.push(cells);
    }

    Ok(RawTable {
        name: table.to_string(),
        columns,
        rows,
    })
}

/// Opens raw database bytes through a scratch file and reads the selected table.
pub fn read_sqlite(bytes: &[u8], preferred: &[String]) -> AppResult<RawTable> {
    let mut scratch = tempfile::NamedTempFile::new()?;
    scratch.write_all(bytes)?;
    scratch.flush()?;

    let conn = Connection::open(scratch.path())?;
    let tables = list_tables(&conn)?;
    let Some(table) = select_table(&tables, preferred) else {
        return Err(AppError::NotFound("database contains no tables".to_string()));
    };
    tracing::debug!(table = %table, available = tables.len(), "selected source table");
    read_table(&conn, table)
}

pub fn read_delimited(bytes: &[u8]) -> AppResult<RawTable> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| AppError::Decode("data is neither a SQLite database nor UTF-8 text".to_string()))?;
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Ok(RawTable::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let columns: Vec<String> = reader.headers()?.iter().map(ToString::to_string).collect();
    if columns.iter().all(|column| column.is_empty()) {
        return Err(AppError::Decode("delimited data has no header row".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<Cell> = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    Cell::Null
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        rows.push(cells);
    }

    Ok(RawTable {
        name: "csv".to_string(),
        columns,
        rows,
    })
}

/// Lifts keys of a JSON-object `data` column into columns of their own.
/// Keys override same-named columns; the `data` column itself is dropped.
pub fn expand_payload_column(table: &mut RawTable) {
    let Some(payload_index) = table
        .columns
        .iter()
        .position(|column| column.eq_ignore_ascii_case(PAYLOAD_COLUMN))
    else {
        return;
    };

    let payloads: Vec<Option<serde_json::Map<String, serde_json::Value>>> = table
        .rows
        .iter()
        .map(|row| match row.get(payload_index) {
            Some(Cell::Text(raw)) => serde_json::from_str::<serde_json::Value>(raw)
                .ok()
                .and_then(|value| value.as_object().cloned()),
            _ => None,
        })
        .collect();
    if payloads.iter().all(Option::is_none) {
        return;
    }

    let mut columns = table.columns.clone();
    columns.remove(payload_index);
    for object in payloads.iter().flatten() {
        for key in object.keys() {
            if !columns.iter().any(|column| column == key) {
                columns.push(key.clone());
            }
        }
    }

    let original = std::mem::take(&mut table.rows);
    let original_columns = std::mem::take(&mut table.columns);
    table.rows = original
        .into_iter()
        .zip(payloads)
        .map(|(row, payload)| {
            columns
                .iter()
                .map(|column| {
                    if let Some(value) = payload.as_ref().and_then(|object| object.get(column)) {
                        return Cell::from_json(value);
                    }
                    original_columns
                        .iter()
                        .position(|source| source == column)
                        .and_then(|index| row.get(index).cloned())
                        .unwrap_or(Cell::Null)
                })
                .collect()
        })
        .collect();
    table.columns = columns;
}
