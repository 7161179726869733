use crate::config::{DashboardConfig, SourceKind};
use crate::db;
use crate::errors::AppResult;
use crate::models::{ClearOutcome, DashboardView, DataFreshness, HistoryFilters, HistoryOptions, Page, Table};
use crate::normalize::{normalize, NormalizeOptions};
use crate::redaction::Redactor;
use crate::remote::{store_from_config, BlobStore, FetchOutcome};
use crate::views;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRequest {
    Live,
    History(HistoryFilters),
}

/// Outcome of one fetch-then-normalize pass for a page.
#[derive(Debug, Clone)]
struct Loaded {
    table: Table,
    source: String,
    source_table: Option<String>,
    freshness: DataFreshness,
    status: Option<String>,
}

/// Fetches, normalizes and shapes page data. Holds the last successfully loaded
/// table per page and serves it when a refresh yields nothing newer.
pub struct Dashboard {
    config: DashboardConfig,
    store: Arc<dyn BlobStore>,
    options: NormalizeOptions,
    redactor: Redactor,
    last_good: Mutex<HashMap<Page, (Table, Option<String>)>>,
}

impl Dashboard {
    pub fn new(config: DashboardConfig, store: Arc<dyn BlobStore>) -> Self {
        let options = NormalizeOptions::from(&config);
        let mut secrets = store.secrets();
        secrets.extend(config.github.token.iter().cloned());
        Self {
            config,
            store,
            options,
            redactor: Redactor::new(secrets),
            last_good: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: DashboardConfig) -> AppResult<Self> {
        config.validate()?;
        let store = store_from_config(&config)?;
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    fn path_for(&self, page: Page) -> &str {
        match page {
            Page::Live => &self.config.live_path,
            Page::History => &self.config.history_path,
        }
    }

    fn revision(&self) -> &str {
        &self.config.github.revision
    }

    fn remember(&self, page: Page, table: &Table, source_table: &Option<String>) {
        match self.last_good.lock() {
            Ok(mut last_good) => {
                last_good.insert(page, (table.clone(), source_table.clone()));
            }
            Err(_) => tracing::error!("last-known-good cache mutex poisoned"),
        }
    }

    fn recall(&self, page: Page) -> Option<(Table, Option<String>)> {
        self.last_good
            .lock()
            .ok()
            .and_then(|last_good| last_good.get(&page).cloned())
    }

    fn forget(&self, page: Page) {
        if let Ok(mut last_good) = self.last_good.lock() {
            last_good.remove(&page);
        }
    }

    fn load(&self, page: Page) -> Loaded {
        let fetched = self.store.fetch(self.path_for(page), self.revision());
        self.settle(page, fetched)
    }

    /// Normalizes a fetch result for `page`, falling back to the last good table.
    fn settle(&self, page: Page, fetched: FetchOutcome) -> Loaded {
        let source = self.store.describe(self.path_for(page), self.revision());
        let fetch_failed = !fetched.is_found();
        let normalized = normalize(fetched.bytes.as_deref(), &self.options);
        let readable = normalized.diagnostic.is_none();

        let status = [fetched.status, normalized.diagnostic]
            .into_iter()
            .flatten()
            .map(|message| self.redactor.redact(&message))
            .collect::<Vec<_>>();
        let status = (!status.is_empty()).then(|| status.join("; "));

        if !fetch_failed && readable {
            self.remember(page, &normalized.table, &normalized.source_table);
            let freshness = if normalized.table.is_empty() {
                DataFreshness::Empty
            } else {
                DataFreshness::Fresh
            };
            return Loaded {
                table: normalized.table,
                source,
                source_table: normalized.source_table,
                freshness,
                status,
            };
        }

        if let Some(message) = &status {
            tracing::warn!(page = ?page, status = %message, "refresh yielded no data");
        }
        match self.recall(page) {
            Some((table, source_table)) if !table.is_empty() => Loaded {
                table,
                source,
                source_table,
                freshness: DataFreshness::LastKnownGood,
                status,
            },
            _ => Loaded {
                table: Table::empty(),
                source,
                source_table: None,
                freshness: DataFreshness::Empty,
                status,
            },
        }
    }

    pub fn refresh(&self, request: &RefreshRequest) -> DashboardView {
        match request {
            RefreshRequest::Live => self.refresh_live(),
            RefreshRequest::History(filters) => self.refresh_history(filters),
        }
    }

    pub fn refresh_live(&self) -> DashboardView {
        let loaded = self.load(Page::Live);
        let snapshot = views::latest_by_device(&loaded.table);
        DashboardView {
            page: Page::Live,
            tiles: views::metric_tiles(&snapshot),
            series: views::device_series(&loaded.table),
            options: HistoryOptions::default(),
            filters: HistoryFilters::default(),
            row_count: loaded.table.len(),
            snapshot,
            source: loaded.source,
            source_table: loaded.source_table,
            freshness: loaded.freshness,
            status: loaded.status,
        }
    }

    /// History page. Uses the history database when it can be fetched, otherwise the
    /// dated CSV archive for the requested (or newest) date.
    pub fn refresh_history(&self, filters: &HistoryFilters) -> DashboardView {
        let fetched = self.store.fetch(self.path_for(Page::History), self.revision());
        if !fetched.is_found() {
            if let Some(view) = self.refresh_archive(filters) {
                return view;
            }
        }

        let loaded = self.settle(Page::History, fetched);
        let dates = views::history_options(&loaded.table).dates;
        let date = views::resolve_date(&dates, filters.date.as_deref());
        let dated = views::apply_filters(
            &loaded.table,
            &HistoryFilters {
                date: date.clone(),
                ..HistoryFilters::default()
            },
        );
        history_view(loaded, dates, date, dated, filters)
    }

    /// `None` when there are no archives to fall back to.
    fn refresh_archive(&self, filters: &HistoryFilters) -> Option<DashboardView> {
        let dir = self.config.archives_dir.trim_end_matches('/');
        if dir.is_empty() {
            return None;
        }
        let names = match self.store.list(dir, self.revision()) {
            Ok(names) => names,
            Err(error) => {
                tracing::warn!(dir = %dir, error = %self.redactor.redact(&error.to_string()), "archive listing failed");
                return None;
            }
        };
        let dates = archive_dates(&names);
        let date = views::resolve_date(&dates, filters.date.as_deref())?;

        let path = format!("{}/{}.csv", dir, date);
        let fetched = self.store.fetch(&path, self.revision());
        let normalized = normalize(fetched.bytes.as_deref(), &self.options);
        let status = [fetched.status, normalized.diagnostic]
            .into_iter()
            .flatten()
            .map(|message| self.redactor.redact(&message))
            .collect::<Vec<_>>();
        let status = (!status.is_empty()).then(|| status.join("; "));
        let readable = status.is_none();
        if let Some(message) = &status {
            tracing::warn!(path = %path, status = %message, "archive yielded no data");
        }

        let table = if readable { normalized.table } else { Table::empty() };
        let loaded = Loaded {
            freshness: if table.is_empty() {
                DataFreshness::Empty
            } else {
                DataFreshness::Fresh
            },
            source: self.store.describe(&path, self.revision()),
            source_table: normalized.source_table.filter(|_| readable),
            status,
            table,
        };
        tracing::debug!(path = %path, rows = loaded.table.len(), "serving history from archive");
        let dated = loaded.table.clone();
        Some(history_view(loaded, dates, Some(date), dated, filters))
    }

    /// Overwrites the history file with an empty canonical database once
    /// `confirmation` exactly equals the configured phrase.
    pub fn clear_history(&self, confirmation: &str) -> ClearOutcome {
        if confirmation != self.config.confirmation_phrase {
            tracing::warn!("clear-history confirmation text did not match");
            return ClearOutcome::Rejected(format!(
                "confirmation text does not match; type {} to confirm",
                self.config.confirmation_phrase
            ));
        }

        let path = self.path_for(Page::History);
        let result = db::empty_history_database().and_then(|bytes| {
            self.store
                .put(path, self.revision(), &bytes, &self.config.github.commit_message)
        });
        match result {
            Ok(()) => {
                self.forget(Page::History);
                tracing::info!(path = %path, source = ?self.config.source, "history database cleared");
                ClearOutcome::Cleared(format!(
                    "history database cleared: {}",
                    self.store.describe(path, self.revision())
                ))
            }
            Err(error) => {
                let message = self.redactor.redact(&error.to_string());
                tracing::error!(path = %path, error = %message, "failed to clear history database");
                ClearOutcome::Failed(message)
            }
        }
    }

    /// Local sources only: deletes rows in place and compacts the file.
    pub fn clear_local_history_in_place(&self, confirmation: &str) -> ClearOutcome {
        if confirmation != self.config.confirmation_phrase {
            return ClearOutcome::Rejected("confirmation text does not match".to_string());
        }
        if self.config.source != SourceKind::Local {
            return ClearOutcome::Failed("in-place clearing needs a local source".to_string());
        }
        let path = self.config.local_root.join(self.path_for(Page::History));
        match db::clear_local_history(&path, &self.config.preferred_tables) {
            Ok(removed) => {
                self.forget(Page::History);
                ClearOutcome::Cleared(format!("removed {} rows from {}", removed, path.display()))
            }
            Err(error) => ClearOutcome::Failed(error.to_string()),
        }
    }
}

/// Dates named by `<YYYY-MM-DD>.csv` archive files, ascending.
fn archive_dates(names: &[String]) -> Vec<String> {
    let mut dates: Vec<String> = names
        .iter()
        .filter_map(|name| {
            let path = Path::new(name);
            let is_csv = path
                .extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"));
            is_csv
                .then(|| path.file_stem().and_then(|stem| stem.to_str()))
                .flatten()
                .map(ToString::to_string)
        })
        .collect();
    dates.sort();
    dates.dedup();
    dates
}

/// Shapes a history page from the rows of the selected date. Work-order and device
/// options come from that date only.
fn history_view(
    loaded: Loaded,
    dates: Vec<String>,
    date: Option<String>,
    dated: Table,
    filters: &HistoryFilters,
) -> DashboardView {
    let day = views::history_options(&dated);
    let filtered = views::apply_filters(
        &dated,
        &HistoryFilters {
            date: None,
            work_order: filters.work_order.clone(),
            device: filters.device.clone(),
        },
    );
    let snapshot = views::latest_by_device(&filtered);
    DashboardView {
        page: Page::History,
        tiles: views::metric_tiles(&snapshot),
        series: views::device_series(&filtered),
        row_count: filtered.len(),
        snapshot,
        options: HistoryOptions {
            dates,
            work_orders: day.work_orders,
            devices: day.devices,
        },
        filters: HistoryFilters {
            date,
            work_order: filters.work_order.clone(),
            device: filters.device.clone(),
        },
        source: loaded.source,
        source_table: loaded.source_table,
        freshness: loaded.freshness,
        status: loaded.status,
    }
}
