// Refactoring commands: print the result as JSON, exit non-zero on failure

use anyhow::Result;

use crate::cli::print_json;
use crate::error::RefactorError;
use crate::refactor::blast_radius::{self, AnalyzeRenameRequest};
use crate::refactor::constructor::{self, GenerateConstructorRequest};
use crate::refactor::extract_interface::{self, ExtractInterfaceRequest};
use crate::refactor::implement_interface::{self, ImplementInterfaceRequest};
use crate::refactor::rename::{self, RenameRequest};
use crate::refactor::safe_delete::{self, SafeDeleteRequest};
use crate::refactor::signature::{self, ChangeSignatureRequest, NewParameter};
use crate::refactor::types::{self, CreateTypeRequest, MoveTypeRequest};
use crate::refactor::RefactorResult;
use crate::workspace::Workspace;

/// Ambiguity lists its candidates so the caller can narrow the query
fn explain(error: anyhow::Error) -> anyhow::Error {
    if let Some(RefactorError::Ambiguous { candidates, .. }) = error.downcast_ref::<RefactorError>() {
        for candidate in candidates {
            eprintln!(
                "  {} {} ({})",
                candidate.kind,
                candidate.qualified_name,
                candidate.file.as_deref().unwrap_or("external")
            );
        }
    }
    error
}

/// `"CancellationToken token = default"` -> type, name and default value
pub fn parse_parameter(raw: &str) -> Result<NewParameter, String> {
    let (declaration, default_value) = match raw.split_once('=') {
        Some((declaration, value)) => (declaration.trim(), Some(value.trim().to_string())),
        None => (raw.trim(), None),
    };
    match declaration.rsplit_once(char::is_whitespace) {
        Some((type_name, name)) if !type_name.trim().is_empty() && !name.is_empty() => Ok(NewParameter {
            name: name.to_string(),
            type_name: type_name.trim().to_string(),
            default_value: default_value.filter(|v| !v.is_empty()),
        }),
        _ => Err(format!("expected \"<type> <name>[=<default>]\", got \"{}\"", raw)),
    }
}

fn report(outcome: Result<RefactorResult>) -> Result<()> {
    let result = outcome.map_err(explain)?;
    print_json(&result)?;
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn analyze_rename(project: String, request: AnalyzeRenameRequest) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    let analysis = blast_radius::analyze_rename(workspace.context(), &request).map_err(explain)?;
    print_json(&analysis)?;
    if !analysis.success {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn rename(project: String, request: RenameRequest) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    report(rename::rename(workspace.context(), &request).await)
}

pub async fn change_signature(project: String, request: ChangeSignatureRequest) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    report(signature::change_signature(workspace.context(), &request).await)
}

pub async fn implement_interface(project: String, request: ImplementInterfaceRequest) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    report(implement_interface::implement_interface(workspace.context(), &request).await)
}

pub async fn generate_constructor(project: String, request: GenerateConstructorRequest) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    report(constructor::generate_constructor(workspace.context(), &request).await)
}

pub async fn extract_interface(project: String, request: ExtractInterfaceRequest) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    report(extract_interface::extract_interface(workspace.context(), &request).await)
}

pub async fn safe_delete(project: String, request: SafeDeleteRequest) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    report(safe_delete::safe_delete(workspace.context(), &request).await)
}

pub async fn create_type(project: String, request: CreateTypeRequest) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    report(types::create_type(workspace.context(), &request).await)
}

pub async fn move_type(project: String, request: MoveTypeRequest) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    report(types::move_type(workspace.context(), &request).await)
}
