//! Inspect command implementation.

use deltasync_server::columns;
use deltasync_store::{Database, Filter};
use serde::Serialize;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Last committed transaction.
    pub committed_seq: u64,
    /// Total rows across all tables.
    pub total_rows: usize,
    /// Total soft-deleted rows across all tables.
    pub total_tombstones: usize,
    /// Per-table statistics, ordered by name.
    pub tables: Vec<TableReport>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableReport {
    /// Server table name.
    pub name: String,
    /// Rows, including soft-deleted ones.
    pub rows: usize,
    /// Soft-deleted rows.
    pub tombstones: usize,
}

/// Runs the inspect command.
///
/// The store is opened read-only and is never written.
pub fn run(data_dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = super::open_existing(data_dir, true)?;
    let result = inspect(&db, data_dir)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    db.close()?;
    Ok(())
}

fn inspect(db: &Database, data_dir: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let tombstone = Filter::new().flag(columns::IS_DELETED, true);

    let mut tables = Vec::new();
    for stats in db.stats()? {
        let tombstones = db.count(&stats.name, &tombstone)?;
        tables.push(TableReport {
            name: stats.name,
            rows: stats.rows,
            tombstones,
        });
    }

    Ok(InspectResult {
        path: data_dir.display().to_string(),
        committed_seq: db.committed_seq(),
        total_rows: tables.iter().map(|t| t.rows).sum(),
        total_tombstones: tables.iter().map(|t| t.tombstones).sum(),
        tables,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Data directory: {}", result.path);
    println!("Committed seq:  {}", result.committed_seq);
    println!();

    if result.tables.is_empty() {
        println!("No tables.");
        return;
    }

    println!("{:<32} {:>10} {:>12}", "TABLE", "ROWS", "TOMBSTONES");
    for table in &result.tables {
        println!("{:<32} {:>10} {:>12}", table.name, table.rows, table.tombstones);
    }
    println!(
        "{:<32} {:>10} {:>12}",
        "total", result.total_rows, result.total_tombstones
    );
}
