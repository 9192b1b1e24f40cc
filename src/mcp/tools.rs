// MCP tool handlers

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::RefactorError;
use crate::index::NodeType;
use crate::query::engine::QueryKind;
use crate::refactor::blast_radius::{analyze_rename, AnalyzeRenameRequest};
use crate::refactor::constructor::{generate_constructor, GenerateConstructorRequest};
use crate::refactor::extract_interface::{extract_interface, ExtractInterfaceRequest};
use crate::refactor::implement_interface::{implement_interface, ImplementInterfaceRequest};
use crate::refactor::rename::{rename, RenameRequest};
use crate::refactor::safe_delete::{safe_delete, SafeDeleteRequest};
use crate::refactor::signature::{change_signature, ChangeSignatureRequest};
use crate::refactor::types::{create_type, move_type, CreateTypeRequest, MoveTypeRequest};
use crate::refactor::RefactorResult;
use crate::workspace::Workspace;

#[derive(Debug, Deserialize)]
pub struct QueryArgs {
    pub query_type: QueryKind,
    pub target: String,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct SearchArgs {
    pub pattern: String,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Single text block result
pub fn text(text: impl Into<String>, is_error: bool) -> Value {
    let mut result = json!({
        "content": [{
            "type": "text",
            "text": text.into()
        }]
    });
    if is_error {
        result["isError"] = json!(true);
    }
    result
}

fn pretty<T: Serialize>(value: &T, is_error: bool) -> Result<Value> {
    Ok(text(serde_json::to_string_pretty(value)?, is_error))
}

fn refactored(result: RefactorResult) -> Result<Value> {
    let failed = !result.success;
    pretty(&result, failed)
}

fn parse<T: DeserializeOwned>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone()).map_err(|e| RefactorError::InvalidRequest(e.to_string()).into())
}

/// Tool failure as a readable result; ambiguity lists every candidate
pub fn failure(error: &anyhow::Error) -> Value {
    match error.downcast_ref::<RefactorError>() {
        Some(RefactorError::Ambiguous { candidates, .. }) => {
            let mut lines = vec![error.to_string()];
            for candidate in candidates {
                lines.push(format!(
                    "  {} {} ({})",
                    candidate.kind,
                    candidate.qualified_name,
                    candidate.file.as_deref().unwrap_or("external")
                ));
            }
            text(lines.join("\n"), true)
        }
        _ => text(format!("{:#}", error), true),
    }
}

pub async fn index(workspace: &Workspace, _args: &Value, cancel: &CancellationToken) -> Result<Value> {
    let batch = workspace.index(cancel)?;
    pretty(
        &json!({
            "workspace": batch.workspace_path,
            "cancelled": batch.cancelled,
            "stats": batch.stats,
            "warnings": batch.warnings,
        }),
        false,
    )
}

pub async fn query(workspace: &Workspace, args: &Value) -> Result<Value> {
    let args: QueryArgs = parse(args)?;
    let results = workspace.query()?.run(args.query_type, &args.target)?;

    let mut lines = Vec::new();
    if results.is_empty() {
        lines.push(format!("No {} found for '{}'", args.query_type.as_str(), args.target));
    } else {
        lines.push(format!(
            "Found {} {} of '{}':",
            results.len(),
            args.query_type.as_str(),
            args.target
        ));
        for result in results {
            lines.push(format!(
                "  {}:{} - {} ({})",
                result.file.as_deref().unwrap_or("-"),
                result.line.unwrap_or(0),
                result.full_name,
                result.node_type
            ));
        }
    }
    Ok(text(lines.join("\n"), false))
}

pub async fn search(workspace: &Workspace, args: &Value) -> Result<Value> {
    let args: SearchArgs = parse(args)?;
    let node_type = args.node_type.as_deref().map(NodeType::from_str).transpose()?;
    let results = workspace.query()?.search(&args.pattern, node_type, args.limit)?;
    pretty(&results, false)
}

pub async fn stats(workspace: &Workspace, _args: &Value) -> Result<Value> {
    pretty(&workspace.stats()?, false)
}

pub async fn analyze(workspace: &Workspace, args: &Value) -> Result<Value> {
    let request: AnalyzeRenameRequest = parse(args)?;
    let analysis = analyze_rename(workspace.context(), &request)?;
    pretty(&analysis, !analysis.success)
}

/// Run one of the refactoring tools
pub async fn refactor(workspace: &Workspace, name: &str, args: &Value) -> Result<Value> {
    let ctx = workspace.context();
    let result = match name {
        "semgraph_rename" => rename(ctx, &parse::<RenameRequest>(args)?).await?,
        "semgraph_change_signature" => change_signature(ctx, &parse::<ChangeSignatureRequest>(args)?).await?,
        "semgraph_implement_interface" => {
            implement_interface(ctx, &parse::<ImplementInterfaceRequest>(args)?).await?
        }
        "semgraph_generate_constructor" => {
            generate_constructor(ctx, &parse::<GenerateConstructorRequest>(args)?).await?
        }
        "semgraph_extract_interface" => extract_interface(ctx, &parse::<ExtractInterfaceRequest>(args)?).await?,
        "semgraph_safe_delete" => safe_delete(ctx, &parse::<SafeDeleteRequest>(args)?).await?,
        "semgraph_create_type" => create_type(ctx, &parse::<CreateTypeRequest>(args)?).await?,
        "semgraph_move_type" => move_type(ctx, &parse::<MoveTypeRequest>(args)?).await?,
        _ => return Err(anyhow::anyhow!("Unknown tool: {}", name)),
    };
    refactored(result)
}
