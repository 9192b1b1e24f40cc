use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::print_json;
use crate::workspace::Workspace;

pub async fn index_project(project: String) -> Result<()> {
    info!("Indexing project: {}", project);
    let workspace = Arc::new(Workspace::open(&project)?);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
    spinner.set_message(format!("Indexing {}", workspace.root().display()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    // Ctrl+C stops the walk between documents; nothing partial is committed
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; cancelling indexing");
                cancel.cancel();
            }
        }
    });

    let batch = tokio::task::spawn_blocking({
        let workspace = workspace.clone();
        let cancel = cancel.clone();
        move || workspace.index(&cancel)
    })
    .await
    .context("Indexing task panicked")?;
    watcher.abort();
    spinner.finish_and_clear();
    let batch = batch?;

    print_json(&json!({
        "workspace": batch.workspace_path,
        "database": workspace.database_path().display().to_string(),
        "cancelled": batch.cancelled,
        "stats": batch.stats,
        "warnings": batch.warnings,
    }))
}
