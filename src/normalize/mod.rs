//! Turns raw database or delimited-text bytes into the canonical reading table.
//!
//! Nothing here fails outward: unreadable input becomes an empty table with a
//! diagnostic, and unmatched canonical fields are filled with absent values.

pub mod columns;
pub mod source;
pub mod timestamp;

use crate::config::{DashboardConfig, DEFAULT_TIMESTAMP_FORMAT};
use crate::errors::AppResult;
use crate::models::{CanonicalField, Cell, ColumnAssignment, Normalized, RawTable, Record, SourceFormat, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub preferred_tables: Vec<String>,
    pub timestamp_format: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            preferred_tables: DashboardConfig::default().preferred_tables,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl From<&DashboardConfig> for NormalizeOptions {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            preferred_tables: config.preferred_tables.clone(),
            timestamp_format: config.timestamp_format.clone(),
        }
    }
}

pub fn normalize(bytes: Option<&[u8]>, options: &NormalizeOptions) -> Normalized {
    let Some(bytes) = bytes.filter(|bytes| !bytes.is_empty()) else {
        return Normalized::default();
    };

    let format = source::detect_format(bytes);
    match load_raw(bytes, format, options) {
        Ok(raw) => {
            let assignments = columns::assign(&raw.columns);
            let table = build_table(&raw, &assignments, &options.timestamp_format);
            tracing::debug!(
                table = %raw.name,
                rows = table.len(),
                unmapped = assignments.iter().filter(|assignment| assignment.field.is_none()).count(),
                "normalized source table"
            );
            Normalized {
                table,
                format: Some(format),
                source_table: Some(raw.name),
                assignments,
                diagnostic: None,
            }
        }
        Err(error) => {
            tracing::warn!(error = %error, format = ?format, "failed to read source data");
            Normalized {
                format: Some(format),
                diagnostic: Some(error.to_string()),
                ..Normalized::default()
            }
        }
    }
}

fn load_raw(bytes: &[u8], format: SourceFormat, options: &NormalizeOptions) -> AppResult<RawTable> {
    let mut raw = match format {
        SourceFormat::Sqlite => source::read_sqlite(bytes, &options.preferred_tables)?,
        SourceFormat::Delimited => source::read_delimited(bytes)?,
    };
    source::expand_payload_column(&mut raw);
    Ok(raw)
}

pub fn build_table(raw: &RawTable, assignments: &[ColumnAssignment], timestamp_format: &str) -> Table {
    let positions: Vec<(CanonicalField, Option<usize>)> = CanonicalField::ALL
        .iter()
        .filter(|field| field.is_sourced())
        .map(|field| (*field, columns::position_of(assignments, *field)))
        .collect();
    let cell = |row: &[Cell], field: CanonicalField| -> Option<Cell> {
        positions
            .iter()
            .find(|(candidate, _)| *candidate == field)
            .and_then(|(_, position)| *position)
            .and_then(|index| row.get(index).cloned())
    };

    let mut records: Vec<Record> = raw
        .rows
        .iter()
        .map(|row| {
            let row = row.as_slice();
            let (ts, ts_dt) = timestamp::resolve(cell(row, CanonicalField::Ts).as_ref(), timestamp_format);
            Record {
                id: cell(row, CanonicalField::Id).and_then(|value| value.as_i64()),
                work_order: cell(row, CanonicalField::WorkOrder).and_then(|value| value.as_text()),
                shift: cell(row, CanonicalField::Shift).and_then(|value| value.as_text()),
                device: cell(row, CanonicalField::Device).and_then(|value| value.as_text()),
                ts,
                ts_dt,
                temperature: measurement(cell(row, CanonicalField::Temperature)),
                current: measurement(cell(row, CanonicalField::Current)),
            }
        })
        .collect();

    sort_by_timestamp(&mut records);
    Table { records }
}

fn measurement(cell: Option<Cell>) -> Option<f64> {
    cell.and_then(|value| value.as_f64()).filter(|value| value.is_finite())
}

/// Stable ascending sort on `ts_dt`; records without one come first.
pub fn sort_by_timestamp(records: &mut [Record]) {
    records.sort_by(|left, right| left.ts_dt.cmp(&right.ts_dt));
}

#[cfg(test)]
mod tests {
    use super::{normalize, NormalizeOptions};
    use crate::models::{CanonicalField, Table};

    fn csv(raw: &str) -> Vec<u8> {
        raw.as_bytes().to_vec()
    }

    #[test]
    fn empty_input_yields_empty_table_without_diagnostic() {
        let options = NormalizeOptions::default();
        for bytes in [None, Some(&b""[..])] {
            let normalized = normalize(bytes, &options);
            assert!(normalized.table.is_empty());
            assert!(normalized.diagnostic.is_none());
        }
    }

    #[test]
    fn device_and_temperature_only() {
        let bytes = csv("Device_Name,temp_C\nL1,36.5\n");
        let normalized = normalize(Some(bytes.as_slice()), &NormalizeOptions::default());
        assert_eq!(normalized.table.len(), 1);
        let record = &normalized.table.records[0];
        assert_eq!(record.device.as_deref(), Some("L1"));
        assert_eq!(record.temperature, Some(36.5));
        assert!(record.id.is_none());
        assert!(record.work_order.is_none());
        assert!(record.shift.is_none());
        assert!(record.ts.is_none());
        assert!(record.ts_dt.is_none());
        assert!(record.current.is_none());
    }

    #[test]
    fn output_is_sorted_with_unparseable_first() {
        let bytes = csv(
            "ts,line,current\n\
             2024-05-01 08:00:10,L1,1.0\n\
             garbage,L1,2.0\n\
             2024-05-01 08:00:00,L2,3.0\n\
             2024-05-01 08:00:05,L1,4.0\n",
        );
        let normalized = normalize(Some(bytes.as_slice()), &NormalizeOptions::default());
        let currents: Vec<_> = normalized.table.records.iter().map(|record| record.current).collect();
        assert_eq!(currents, vec![Some(2.0), Some(3.0), Some(4.0), Some(1.0)]);
        assert!(normalized
            .table
            .records
            .windows(2)
            .all(|pair| pair[0].ts_dt <= pair[1].ts_dt));
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let bytes = csv("time,timestamp,Temperature1\n08:00,2024-05-01 08:00:00,30.1\n");
        let options = NormalizeOptions::default();
        assert_eq!(normalize(Some(bytes.as_slice()), &options), normalize(Some(bytes.as_slice()), &options));
    }

    #[test]
    fn time_and_timestamp_resolve_deterministically() {
        let bytes = csv("time,timestamp\n08:00,2024-05-01 08:00:00\n");
        let normalized = normalize(Some(bytes.as_slice()), &NormalizeOptions::default());
        let fields: Vec<_> = normalized
            .assignments
            .iter()
            .map(|assignment| (assignment.source.as_str(), assignment.field))
            .collect();
        assert_eq!(fields, vec![("time", None), ("timestamp", Some(CanonicalField::Ts))]);
        assert_eq!(normalized.table.records[0].ts.as_deref(), Some("2024-05-01 08:00:00"));
        assert!(normalized.table.records[0].ts_dt.is_some());
    }

    #[test]
    fn delimited_epoch_timestamps_are_parsed_and_ordered() {
        let bytes = csv("ts,line,temperature\n1714521660,L1,31.0\n1714521600,L1,30.0\n");
        let normalized = normalize(Some(bytes.as_slice()), &NormalizeOptions::default());
        let first = &normalized.table.records[0];
        assert_eq!(first.ts.as_deref(), Some("2024-05-01 00:00:00"));
        assert!(first.ts_dt.is_some());
        assert_eq!(first.temperature, Some(30.0));
        assert_eq!(normalized.table.records[1].ts.as_deref(), Some("2024-05-01 00:01:00"));
    }

    #[test]
    fn malformed_bytes_degrade_to_empty_with_diagnostic() {
        let normalized = normalize(Some(&[0xde, 0xad, 0xbe, 0xef, 0xff][..]), &NormalizeOptions::default());
        assert!(normalized.table.is_empty());
        assert!(normalized.diagnostic.is_some());
        assert_eq!(Table::columns().len(), CanonicalField::ALL.len());
    }

    #[test]
    fn non_numeric_measurements_become_absent() {
        let bytes = csv("line,temperature,current\nL1,n/a,NaN\n");
        let normalized = normalize(Some(bytes.as_slice()), &NormalizeOptions::default());
        assert!(normalized.table.records[0].temperature.is_none());
        assert!(normalized.table.records[0].current.is_none());
    }
}
