use anyhow::Result;

use crate::cli::print_json;
use crate::index::NodeType;
use crate::query::engine::{QueryKind, QueryResult};
use crate::workspace::Workspace;

pub async fn query_index(
    query_type: String,
    target: String,
    project: String,
    format: String,
    node_type: Option<String>,
    limit: usize,
) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    let engine = workspace.query()?;

    // Execute query
    let results = if query_type == "search" {
        let node_type = node_type.as_deref().map(NodeType::from_str).transpose()?;
        engine.search(&target, node_type, limit)?
    } else {
        engine.run(QueryKind::from_str(&query_type)?, &target)?
    };

    match format.as_str() {
        "json" => print_json(&results),
        "text" => {
            print_text(&query_type, &target, &results);
            Ok(())
        }
        _ => Err(anyhow::anyhow!("Unknown format: {}", format)),
    }
}

fn print_text(query_type: &str, target: &str, results: &[QueryResult]) {
    if results.is_empty() {
        println!("No results found for {} of '{}'", query_type, target);
        return;
    }
    println!("Found {} results:", results.len());
    for result in results {
        println!(
            "  {}:{} - {} ({})",
            result.file.as_deref().unwrap_or("-"),
            result.line.unwrap_or(0),
            result.full_name,
            result.node_type
        );
    }
}
