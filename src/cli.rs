use crate::dashboard::{Dashboard, RefreshRequest};
use crate::errors::{AppError, AppResult};
use crate::models::{ClearOutcome, DashboardView, DataFreshness, HistoryFilters, Normalized, Page};
use crate::normalize::{normalize, NormalizeOptions};
use crate::scheduler::spawn_refresh_loop;
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "ems-console",
    version,
    about = "Production-line temperature and current readings from SQLite history files",
    arg_required_else_help = true
)]
pub struct Cli {
    #[arg(long, global = true, env = "EMS_CONFIG", help = "YAML configuration file")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Also log to stderr")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Latest reading per device, refreshed on the configured interval")]
    Live {
        #[arg(long, help = "Refresh once and exit")]
        once: bool,
        #[arg(long, help = "Print views as JSON lines")]
        json: bool,
    },
    #[command(about = "Browse the history store by date, work order and device")]
    History {
        #[arg(long, help = "Date prefix (YYYY-MM-DD); defaults to the newest date")]
        date: Option<String>,
        #[arg(long, help = "Only this work order")]
        work_order: Option<String>,
        #[arg(long, help = "Only this device/line")]
        device: Option<String>,
        #[arg(long, help = "Print the view as JSON")]
        json: bool,
    },
    #[command(about = "Normalize a local database or CSV file and print the result")]
    Inspect {
        #[arg(help = "Path to a SQLite database or CSV file")]
        file: PathBuf,
        #[arg(long, help = "Print the normalized table as JSON")]
        json: bool,
    },
    #[command(about = "Reset the history store to an empty table")]
    ClearHistory {
        #[arg(long, help = "Confirmation text; must equal the configured phrase exactly")]
        confirm: String,
        #[arg(long, help = "Delete rows in place instead of rewriting the file (local source only)")]
        in_place: bool,
    },
}

pub async fn run_live(dashboard: Arc<Dashboard>, once: bool, json: bool) -> AppResult<()> {
    if once {
        let view = tokio::task::spawn_blocking(move || dashboard.refresh_live())
            .await
            .map_err(|error| AppError::Internal(error.to_string()))?;
        print_view(&view, json)?;
        return Ok(());
    }

    let interval = dashboard.config().refresh_interval();
    let handle = spawn_refresh_loop(dashboard, RefreshRequest::Live, interval, move |view| {
        if let Err(error) = print_view(&view, json) {
            tracing::error!(error = %error, "failed to render view");
        }
    });
    tokio::signal::ctrl_c().await?;
    handle.cancel();
    let delivered = handle.join().await;
    tracing::info!(delivered, "live view stopped");
    Ok(())
}

pub fn run_history(dashboard: &Dashboard, filters: HistoryFilters, json: bool) -> AppResult<()> {
    let view = dashboard.refresh_history(&filters);
    print_view(&view, json)
}

pub fn run_inspect(file: &Path, options: &NormalizeOptions, json: bool) -> AppResult<()> {
    let bytes = std::fs::read(file)?;
    let normalized = normalize(Some(&bytes[..]), options);
    if json {
        println!("{}", serde_json::to_string_pretty(&normalized)?);
    } else {
        print!("{}", render_normalized(&normalized));
    }
    Ok(())
}

pub fn run_clear(dashboard: &Dashboard, confirm: &str, in_place: bool) -> AppResult<()> {
    let outcome = if in_place {
        dashboard.clear_local_history_in_place(confirm)
    } else {
        dashboard.clear_history(confirm)
    };
    match outcome {
        ClearOutcome::Cleared(message) => {
            println!("{}", message);
            Ok(())
        }
        ClearOutcome::Rejected(message) => Err(AppError::Confirmation(message)),
        ClearOutcome::Failed(message) => Err(AppError::Remote(message)),
    }
}

fn print_view(view: &DashboardView, json: bool) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string(view)?);
    } else {
        print!("{}", render_view(view));
    }
    Ok(())
}

fn cell<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string())
}

pub fn render_view(view: &DashboardView) -> String {
    let mut out = String::new();
    let title = match view.page {
        Page::Live => "Live readings",
        Page::History => "History",
    };
    let _ = writeln!(out, "== {} ==", title);
    let _ = writeln!(
        out,
        "source: {}{}",
        view.source,
        view.source_table
            .as_deref()
            .map(|table| format!(" (table {})", table))
            .unwrap_or_default()
    );
    match view.freshness {
        DataFreshness::Fresh => {}
        DataFreshness::LastKnownGood => {
            let _ = writeln!(out, "showing last successful load");
        }
        DataFreshness::Empty => {
            let _ = writeln!(out, "no data available");
        }
    }
    if let Some(status) = &view.status {
        let _ = writeln!(out, "status: {}", status);
    }
    if view.page == Page::History {
        let _ = writeln!(out, "dates: {}", view.options.dates.join(", "));
        let _ = writeln!(out, "work orders: {}", view.options.work_orders.join(", "));
        let _ = writeln!(out, "devices: {}", view.options.devices.join(", "));
        let _ = writeln!(
            out,
            "filters: date={} work_order={} device={}",
            cell(&view.filters.date),
            cell(&view.filters.work_order),
            cell(&view.filters.device)
        );
    }

    for tile in &view.tiles {
        let _ = writeln!(
            out,
            "{:<12} {:>8.1} °C {:>8.2} A",
            tile.device, tile.temperature, tile.current
        );
    }

    if !view.snapshot.is_empty() {
        let _ = writeln!(
            out,
            "{:<12} {:<8} {:<12} {:<20} {:>11} {:>8}",
            "device", "shift", "work_order", "ts", "temperature", "current"
        );
        for record in &view.snapshot {
            let _ = writeln!(
                out,
                "{:<12} {:<8} {:<12} {:<20} {:>11} {:>8}",
                cell(&record.device),
                cell(&record.shift),
                cell(&record.work_order),
                cell(&record.ts),
                cell(&record.temperature),
                cell(&record.current)
            );
        }
    }
    let _ = writeln!(out, "rows: {}", view.row_count);
    out
}

pub fn render_normalized(normalized: &Normalized) -> String {
    let mut out = String::new();
    if let Some(diagnostic) = &normalized.diagnostic {
        let _ = writeln!(out, "error: {}", diagnostic);
    }
    if let Some(table) = &normalized.source_table {
        let _ = writeln!(out, "table: {}", table);
    }
    for assignment in &normalized.assignments {
        let target = assignment
            .field
            .map(|field| field.as_str())
            .unwrap_or("(unmapped)");
        let _ = writeln!(out, "  {} -> {}", assignment.source, target);
    }
    let _ = writeln!(out, "{}", crate::models::Table::columns().join("\t"));
    for record in &normalized.table.records {
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            cell(&record.id),
            cell(&record.work_order),
            cell(&record.shift),
            cell(&record.device),
            cell(&record.ts),
            cell(&record.ts_dt),
            cell(&record.temperature),
            cell(&record.current)
        );
    }
    let _ = writeln!(out, "rows: {}", normalized.table.len());
    out
}

#[cfg(test)]
mod tests {
    use super::{render_normalized, render_view, Cli, Command};
    use crate::models::{DashboardView, DataFreshness, HistoryFilters, HistoryOptions, MetricTile, Page};
    use crate::normalize::{normalize, NormalizeOptions};
    use clap::Parser;

    #[test]
    fn parses_history_filters() {
        let cli = Cli::try_parse_from([
            "ems-console",
            "history",
            "--date",
            "2024-05-01",
            "--work-order",
            "WO-1",
        ])
        .expect("parse");
        match cli.command {
            Command::History { date, work_order, device, json } => {
                assert_eq!(date.as_deref(), Some("2024-05-01"));
                assert_eq!(work_order.as_deref(), Some("WO-1"));
                assert!(device.is_none());
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn clear_history_requires_confirmation_flag() {
        assert!(Cli::try_parse_from(["ems-console", "clear-history"]).is_err());
        assert!(Cli::try_parse_from(["ems-console", "clear-history", "--confirm", "DELETE"]).is_ok());
    }

    #[test]
    fn renders_fallback_and_status() {
        let view = DashboardView {
            page: Page::Live,
            source: "memory:live.db".to_string(),
            source_table: Some("records".to_string()),
            freshness: DataFreshness::LastKnownGood,
            status: Some("HTTP 502".to_string()),
            options: HistoryOptions::default(),
            filters: HistoryFilters::default(),
            tiles: vec![MetricTile {
                device: "L1".to_string(),
                temperature: 36.5,
                current: 2.0,
            }],
            snapshot: Vec::new(),
            series: Vec::new(),
            row_count: 4,
        };
        let text = render_view(&view);
        assert!(text.contains("showing last successful load"));
        assert!(text.contains("status: HTTP 502"));
        assert!(text.contains("36.5"));
        assert!(text.contains("rows: 4"));
    }

    #[test]
    fn history_render_lists_every_selector() {
        let view = DashboardView {
            page: Page::History,
            source: "memory:history.db".to_string(),
            source_table: None,
            freshness: DataFreshness::Fresh,
            status: None,
            options: HistoryOptions {
                dates: vec!["2024-05-01".to_string()],
                work_orders: vec!["WO-1".to_string()],
                devices: vec!["L1".to_string(), "L2".to_string()],
            },
            filters: HistoryFilters::default(),
            tiles: Vec::new(),
            snapshot: Vec::new(),
            series: Vec::new(),
            row_count: 0,
        };
        let text = render_view(&view);
        assert!(text.contains("dates: 2024-05-01"));
        assert!(text.contains("work orders: WO-1"));
        assert!(text.contains("devices: L1, L2"));
    }

    #[test]
    fn renders_unmapped_columns() {
        let normalized = normalize(Some(&b"time,timestamp\n08:00,2024-05-01 08:00:00\n"[..]), &NormalizeOptions::default());
        let text = render_normalized(&normalized);
        assert!(text.contains("time -> (unmapped)"));
        assert!(text.contains("timestamp -> ts"));
    }
}
