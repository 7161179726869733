use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Id,
    WorkOrder,
    Shift,
    Device,
    Ts,
    TsDt,
    Temperature,
    Current,
}

impl CanonicalField {
    /// Column order of every normalized table.
    pub const ALL: [CanonicalField; 8] = [
        Self::Id,
        Self::WorkOrder,
        Self::Shift,
        Self::Device,
        Self::Ts,
        Self::TsDt,
        Self::Temperature,
        Self::Current,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::WorkOrder => "work_order",
            Self::Shift => "shift",
            Self::Device => "device",
            Self::Ts => "ts",
            Self::TsDt => "ts_dt",
            Self::Temperature => "temperature",
            Self::Current => "current",
        }
    }

    /// Fields that can be fed from a source column. `ts_dt` is always derived.
    pub fn is_sourced(self) -> bool {
        !matches!(self, Self::TsDt)
    }
}

/// One untyped value read from a source table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Integer(value) => Some(value.to_string()),
            Self::Real(value) => Some(value.to_string()),
            Self::Text(value) if value.trim().is_empty() => None,
            Self::Text(value) => Some(value.trim().to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            Self::Text(value) => value.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Null => None,
            Self::Integer(value) => Some(*value),
            Self::Real(value) if value.fract() == 0.0 => Some(*value as i64),
            Self::Real(_) => None,
            Self::Text(value) => value.trim().parse::<i64>().ok(),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Integer(i64::from(*flag)),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(Self::Integer)
                .or_else(|| number.as_f64().map(Self::Real))
                .unwrap_or(Self::Null),
            serde_json::Value::String(text) => Self::Text(text.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// A source table before column matching: names in source order, rows aligned to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Record {
    pub id: Option<i64>,
    pub work_order: Option<String>,
    pub shift: Option<String>,
    pub device: Option<String>,
    pub ts: Option<String>,
    pub ts_dt: Option<NaiveDateTime>,
    pub temperature: Option<f64>,
    pub current: Option<f64>,
}

impl Record {
    pub fn date(&self) -> Option<&str> {
        self.ts.as_deref().and_then(|ts| ts.get(..10))
    }
}

/// Normalized readings, ordered by parsed timestamp with absent timestamps first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub records: Vec<Record>,
}

impl Table {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns() -> Vec<&'static str> {
        CanonicalField::ALL.iter().map(|field| field.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAssignment {
    pub source: String,
    pub field: Option<CanonicalField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    Sqlite,
    Delimited,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Normalized {
    pub table: Table,
    pub format: Option<SourceFormat>,
    pub source_table: Option<String>,
    pub assignments: Vec<ColumnAssignment>,
    pub diagnostic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Live,
    History,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilters {
    pub date: Option<String>,
    pub work_order: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryOptions {
    pub dates: Vec<String>,
    pub work_orders: Vec<String>,
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTile {
    pub device: String,
    pub temperature: f64,
    pub current: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub ts_dt: NaiveDateTime,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSeries {
    pub device: String,
    pub temperature: Vec<SeriesPoint>,
    pub current: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataFreshness {
    Fresh,
    LastKnownGood,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub page: Page,
    pub source: String,
    pub source_table: Option<String>,
    pub freshness: DataFreshness,
    pub status: Option<String>,
    pub options: HistoryOptions,
    pub filters: HistoryFilters,
    pub tiles: Vec<MetricTile>,
    pub snapshot: Vec<Record>,
    pub series: Vec<DeviceSeries>,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "outcome", content = "message")]
pub enum ClearOutcome {
    Cleared(String),
    Rejected(String),
    Failed(String),
}

impl ClearOutcome {
    pub fn is_cleared(&self) -> bool {
        matches!(self, Self::Cleared(_))
    }
}
