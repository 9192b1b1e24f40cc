// Create a new type file, or move a type into a file of its own

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, info};

use super::edits::{apply_edits, declaration_lines, tidy, TextEdit};
use super::synth::{compilation_unit, is_valid_identifier, type_declaration, TypeShape};
use super::write::FileWriteCoordinator;
use super::{declaring_source, invalid, settle, ApplyOptions, ChangeSet, RefactorContext, RefactorResult};
use crate::compiler::csharp::loader::sanitize_namespace;
use crate::compiler::{path_key, Solution, TypeKind};
use crate::resolver::SymbolQuery;

fn default_kind() -> String {
    "class".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTypeRequest {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Directory for the new file, relative to the workspace root
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Overrides the namespace derived from the directory
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub base_type: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub type_parameters: Vec<String>,
    #[serde(default)]
    pub usings: Vec<String>,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub validate: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveTypeRequest {
    #[serde(flatten)]
    pub symbol: SymbolQuery,
    /// Defaults to `{TypeName}.cs` next to the current file
    #[serde(default)]
    pub target_file: Option<PathBuf>,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub validate: bool,
}

/// Root namespace of the owning project plus the directory segments below it
pub fn namespace_for_directory(solution: &Solution, directory: &Path) -> Option<String> {
    let project = solution.owning_project(directory)?;
    let relative = directory
        .strip_prefix(&project.directory)
        .map(|r| r.to_string_lossy().to_string())
        .unwrap_or_default();
    let suffix = sanitize_namespace(&relative);
    let namespace = [project.root_namespace.as_str(), suffix.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".");
    (!namespace.is_empty()).then_some(namespace)
}

fn using_directive(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches(';');
    let raw = raw.strip_prefix("using ").unwrap_or(raw);
    format!("using {};", raw.trim())
}

/// Strip one level of indentation from every line
fn dedent(text: &str, indent: &str) -> String {
    text.lines()
        .map(|line| line.strip_prefix(indent).unwrap_or(line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn resolve_target(ctx: &RefactorContext, path: PathBuf) -> PathBuf {
    let path = if path.is_relative() { ctx.root.join(path) } else { path };
    FileWriteCoordinator::absolute(&path)
}

pub async fn create_type(ctx: &RefactorContext, request: &CreateTypeRequest) -> Result<RefactorResult> {
    settle(run_create(ctx, request).await)
}

async fn run_create(ctx: &RefactorContext, request: &CreateTypeRequest) -> Result<RefactorResult> {
    if !is_valid_identifier(&request.name) {
        return invalid(format!("'{}' is not a valid type name", request.name));
    }
    let Some(kind) = TypeKind::from_keyword(&request.kind) else {
        return invalid(format!("unknown type kind '{}'", request.kind));
    };

    let directory = resolve_target(ctx, request.directory.clone().unwrap_or_default());
    let target = directory.join(format!("{}.cs", request.name));
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        return invalid(format!("{} already exists", target.display()));
    }

    let solution = ctx.compiler.solution()?;
    let namespace = request
        .namespace
        .clone()
        .or_else(|| namespace_for_directory(&solution, &directory));
    // Follow the namespace style of the project's existing files
    let file_scoped = solution
        .owning_project(&directory)
        .and_then(|p| p.documents.first())
        .and_then(|d| ctx.compiler.file_context(&d.path).ok())
        .map(|c| c.file_scoped_namespace)
        .unwrap_or(false);

    let shape = TypeShape {
        name: request.name.clone(),
        modifiers: request.modifiers.clone(),
        type_parameters: request.type_parameters.clone(),
        base_type: request.base_type.clone(),
        interfaces: request.interfaces.clone(),
        attributes: request.attributes.clone(),
        members: Vec::new(),
    };
    let declaration = type_declaration(kind, &shape)?;
    let usings: Vec<String> = request.usings.iter().map(|u| using_directive(u)).collect();
    let content = compilation_unit(&usings, namespace.as_deref(), file_scoped, &declaration);

    let mut changes = ChangeSet::new();
    changes.create(&target, content);

    let message = format!(
        "{} {} {} in {}",
        if request.preview { "Would create" } else { "Created" },
        kind.keyword(),
        request.name,
        ctx.relative(&target)
    );
    info!("{}", message);
    Ok(ctx
        .finish(message, changes, &ApplyOptions::new(request.preview, request.validate))
        .await)
}

pub async fn move_type(ctx: &RefactorContext, request: &MoveTypeRequest) -> Result<RefactorResult> {
    settle(run_move(ctx, request).await)
}

async fn run_move(ctx: &RefactorContext, request: &MoveTypeRequest) -> Result<RefactorResult> {
    let symbol = ctx.require(&request.symbol, "type")?;
    if !symbol.is_type() {
        return invalid(format!("{} is a {}, not a type", symbol.display_name, symbol.kind));
    }
    let Some(syntax) = symbol.syntax.as_ref() else {
        return invalid(format!("{} is not declared in source", symbol.display_name));
    };
    if syntax.nested {
        return invalid(format!("{} is nested in another type and cannot be moved", symbol.display_name));
    }

    let (source_file, before) = declaring_source(ctx, &symbol)?;
    let target = match &request.target_file {
        Some(path) => resolve_target(ctx, path.clone()),
        None => source_file.with_file_name(format!("{}.cs", symbol.name)),
    };
    if path_key(&target) == path_key(&source_file) {
        return invalid(format!("{} is already in {}", symbol.name, ctx.relative(&source_file)));
    }
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        return invalid(format!("{} already exists", target.display()));
    }

    let context = ctx.compiler.file_context(&source_file)?;
    let mut changes = ChangeSet::new();
    if context.type_count == 1 {
        debug!("{} is alone in its file; renaming the file", symbol.name);
        changes.relocate(&source_file, &target);
    } else {
        let lines = declaration_lines(&before, &syntax.span);
        let declaration = dedent(before[lines.clone()].trim_end(), &syntax.indent);
        let content = compilation_unit(
            &context.usings,
            symbol.namespace.as_deref(),
            context.file_scoped_namespace,
            &declaration,
        );
        let remaining = tidy(&apply_edits(&before, vec![TextEdit::delete(lines)])?);
        changes.create(&target, content);
        changes.modify(&source_file, before, remaining);
    }

    let message = format!(
        "{} {} to {}",
        if request.preview { "Would move" } else { "Moved" },
        symbol.name,
        ctx.relative(&target)
    );
    info!("{}", message);
    Ok(ctx
        .finish(message, changes, &ApplyOptions::new(request.preview, request.validate))
        .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refactor::testing::{read, workspace};

    const PROJECT: &str = "<Project Sdk=\"Microsoft.NET.Sdk\">\n  <PropertyGroup>\n    <RootNamespace>Acme.Store</RootNamespace>\n  </PropertyGroup>\n</Project>\n";

    const MODELS: &str = r#"using System;
using System.Collections.Generic;

namespace Acme.Store.Models
{
    public class Order
    {
        public int Id { get; set; }
    }

    /// <summary>An order line</summary>
    public class OrderLine
    {
        public class Detail { }
    }
}
"#;

    fn create(name: &str, kind: &str, directory: Option<&str>) -> CreateTypeRequest {
        CreateTypeRequest {
            name: name.to_string(),
            kind: kind.to_string(),
            directory: directory.map(PathBuf::from),
            namespace: None,
            modifiers: Vec::new(),
            base_type: None,
            interfaces: Vec::new(),
            attributes: Vec::new(),
            type_parameters: Vec::new(),
            usings: Vec::new(),
            preview: false,
            validate: false,
        }
    }

    fn move_request(name: &str) -> MoveTypeRequest {
        MoveTypeRequest {
            symbol: SymbolQuery::named(name),
            target_file: None,
            preview: false,
            validate: false,
        }
    }

    #[tokio::test]
    async fn test_create_type_derives_namespace() {
        let (dir, ctx) = workspace(&[("Store.csproj", PROJECT), ("Models/Orders.cs", MODELS)]);
        let mut req = create("Invoice", "record", Some("Billing/Documents"));
        req.interfaces = vec!["IComparable<Invoice>".to_string()];
        req.usings = vec!["System".to_string()];

        let result = create_type(&ctx, &req).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            read(&dir, "Billing/Documents/Invoice.cs"),
            "using System;\n\nnamespace Acme.Store.Billing.Documents\n{\n    public record Invoice : IComparable<Invoice>\n    {\n    }\n}\n"
        );

        let again = create_type(&ctx, &req).await.unwrap();
        assert!(!again.success);
        assert!(again.message.contains("already exists"));
    }

    #[tokio::test]
    async fn test_create_enum_is_rejected() {
        let (_dir, ctx) = workspace(&[("Store.csproj", PROJECT)]);
        let result = create_type(&ctx, &create("Status", "enum", None)).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("not supported"));
    }

    #[tokio::test]
    async fn test_move_splices_into_new_file() {
        let (dir, ctx) = workspace(&[("Store.csproj", PROJECT), ("Models/Orders.cs", MODELS)]);
        let result = move_type(&ctx, &move_request("OrderLine")).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.created_files.len(), 1);

        let moved = read(&dir, "Models/OrderLine.cs");
        assert_eq!(
            moved,
            "using System;\nusing System.Collections.Generic;\n\nnamespace Acme.Store.Models\n{\n    /// <summary>An order line</summary>\n    public class OrderLine\n    {\n        public class Detail { }\n    }\n}\n"
        );
        let remaining = read(&dir, "Models/Orders.cs");
        assert!(!remaining.contains("OrderLine"));
        assert!(remaining.ends_with("        public int Id { get; set; }\n    }\n}\n"));
    }

    #[tokio::test]
    async fn test_move_sole_type_renames_file() {
        let (dir, ctx) = workspace(&[(
            "Models/Legacy.cs",
            "namespace Acme.Store.Models\n{\n    public class Customer { }\n}\n",
        )]);
        let result = move_type(&ctx, &move_request("Customer")).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert!(!dir.path().join("Models/Legacy.cs").exists());
        assert!(read(&dir, "Models/Customer.cs").contains("public class Customer"));
    }

    #[tokio::test]
    async fn test_nested_type_cannot_move() {
        let (_dir, ctx) = workspace(&[("Models/Orders.cs", MODELS)]);
        let result = move_type(&ctx, &move_request("Detail")).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("nested"));
    }
}
