use anyhow::Result;
use serde_json::json;
use std::path::Path;

use crate::cli::print_json;
use crate::workspace::Workspace;

pub async fn show_stats(project: String) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    let db_path = workspace.database_path();
    if !db_path.exists() {
        anyhow::bail!("No graph at {}; run 'semgraph index --project {}' first", db_path.display(), project);
    }

    let stats = workspace.stats()?;
    print_json(&json!({
        "database": db_path.display().to_string(),
        "size_mb": get_db_size(&db_path)?,
        "stats": stats,
    }))
}

fn get_db_size(db_path: &Path) -> Result<f64> {
    let metadata = std::fs::metadata(db_path)?;
    let size_bytes = metadata.len() as f64;
    let size_mb = size_bytes / (1024.0 * 1024.0);
    Ok((size_mb * 100.0).round() / 100.0)
}
