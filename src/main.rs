//! roster-sync — push a directory of exported batches to the remote store.
//!
//! Expects `<batch-dir>/<table>.json` files, each a JSON array of
//! header->cell objects as exported from the tabular edit surface. Tables
//! are reconciled in dependency order; per-row status markers go to stdout
//! in submission order so they can be written back to the sheet.
//!
//! Usage: `roster-sync <batch-dir>`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use shift_roster::config::load_config;
use shift_roster::postgrest::StoreClient;
use shift_roster::sync::{BatchSummary, Reconciler, SheetRow, SyncTable};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match run().await {
        Ok(failed_rows) if failed_rows == 0 => ExitCode::SUCCESS,
        Ok(failed_rows) => {
            eprintln!("{} row(s) failed", failed_rows);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<usize, String> {
    let batch_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("Usage: roster-sync <batch-dir>")?;
    if !batch_dir.is_dir() {
        return Err(format!("Not a directory: {}", batch_dir.display()));
    }

    let config = load_config()?;
    let client = StoreClient::new(
        &config.store_url,
        config.store_api_key.clone().unwrap_or_default(),
    )
    .map_err(|e| e.to_string())?;
    let reconciler = Reconciler::new(&client);

    let mut failed_rows = 0;
    for table in SyncTable::ORDERED {
        let path = batch_dir.join(format!("{}.json", table.as_str()));
        if !path.exists() {
            continue;
        }

        let rows = read_batch(&path)?;
        log::info!("reconciling {} ({} rows)", table.as_str(), rows.len());
        let results = reconciler
            .reconcile(table, &rows)
            .await
            .map_err(|e| format!("{}: {}", table.as_str(), e))?;

        for result in &results {
            println!(
                "{}\t{}\t{}",
                table.as_str(),
                result.index + 1,
                result.outcome.status_marker()
            );
        }
        let summary = BatchSummary::of(&results);
        println!(
            "# {}: {} applied, {} skipped, {} failed",
            table.as_str(),
            summary.applied,
            summary.skipped,
            summary.failed
        );
        failed_rows += summary.failed;
    }

    Ok(failed_rows)
}

/// Read one exported batch: a JSON array of flat objects. Non-string
/// scalars (sheet numbers, booleans) are accepted and stringified.
fn read_batch(path: &Path) -> Result<Vec<SheetRow>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let raw: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

    Ok(raw
        .into_iter()
        .map(|obj| SheetRow::from_pairs(obj.into_iter().map(|(k, v)| (k, cell_text(v)))))
        .collect())
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
