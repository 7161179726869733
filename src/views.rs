use crate::models::{DeviceSeries, HistoryFilters, HistoryOptions, MetricTile, Record, SeriesPoint, Table};
use std::collections::{BTreeMap, BTreeSet};

const UNKNOWN_DEVICE: &str = "N/A";

pub fn apply_filters(table: &Table, filters: &HistoryFilters) -> Table {
    let records = table
        .records
        .iter()
        .filter(|record| match filters.date.as_deref() {
            Some(date) => record.ts.as_deref().is_some_and(|ts| ts.starts_with(date)),
            None => true,
        })
        .filter(|record| match filters.work_order.as_deref() {
            Some(order) => record.work_order.as_deref() == Some(order),
            None => true,
        })
        .filter(|record| match filters.device.as_deref() {
            Some(device) => record.device.as_deref() == Some(device),
            None => true,
        })
        .cloned()
        .collect();
    Table { records }
}

/// Distinct selector values, ascending, absent values skipped.
pub fn history_options(table: &Table) -> HistoryOptions {
    let mut dates = BTreeSet::new();
    let mut work_orders = BTreeSet::new();
    let mut devices = BTreeSet::new();
    for record in &table.records {
        if let Some(date) = record.date() {
            dates.insert(date.to_string());
        }
        if let Some(order) = &record.work_order {
            work_orders.insert(order.clone());
        }
        if let Some(device) = &record.device {
            devices.insert(device.clone());
        }
    }
    HistoryOptions {
        dates: dates.into_iter().collect(),
        work_orders: work_orders.into_iter().collect(),
        devices: devices.into_iter().collect(),
    }
}

/// The most recent record of every device, ordered by device name.
/// Expects `table` in timestamp order, so the last record seen per device wins.
pub fn latest_by_device(table: &Table) -> Vec<Record> {
    let mut latest: BTreeMap<String, &Record> = BTreeMap::new();
    for record in &table.records {
        let Some(device) = &record.device else {
            continue;
        };
        latest.insert(device.clone(), record);
    }
    latest.into_values().cloned().collect()
}

/// One tile per device in the snapshot; with no devices a single placeholder tile is shown.
pub fn metric_tiles(snapshot: &[Record]) -> Vec<MetricTile> {
    if snapshot.is_empty() {
        return vec![MetricTile {
            device: UNKNOWN_DEVICE.to_string(),
            temperature: 0.0,
            current: 0.0,
        }];
    }
    snapshot
        .iter()
        .map(|record| MetricTile {
            device: record.device.clone().unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
            temperature: record.temperature.unwrap_or(0.0),
            current: record.current.unwrap_or(0.0),
        })
        .collect()
}

/// Temperature and current series per device; records without a parsed timestamp are skipped.
pub fn device_series(table: &Table) -> Vec<DeviceSeries> {
    let mut grouped: BTreeMap<String, DeviceSeries> = BTreeMap::new();
    for record in &table.records {
        let (Some(device), Some(ts_dt)) = (&record.device, record.ts_dt) else {
            continue;
        };
        let series = grouped.entry(device.clone()).or_insert_with(|| DeviceSeries {
            device: device.clone(),
            temperature: Vec::new(),
            current: Vec::new(),
        });
        series.temperature.push(SeriesPoint {
            ts_dt,
            value: record.temperature,
        });
        series.current.push(SeriesPoint {
            ts_dt,
            value: record.current,
        });
    }
    grouped.into_values().collect()
}

/// Keeps a requested date only when it exists; otherwise picks the newest date.
pub fn resolve_date(dates: &[String], requested: Option<&str>) -> Option<String> {
    match requested {
        Some(date) if dates.iter().any(|candidate| candidate == date) => Some(date.to_string()),
        _ => dates.last().cloned(),
    }
}
