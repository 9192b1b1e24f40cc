// Extract an interface from a type's public instance surface

use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use tracing::info;

use super::edits::{add_base_type, apply_edits};
use super::synth::{compilation_unit, interface_method, interface_property, is_valid_identifier, type_declaration, TypeShape};
use super::{declaring_source, invalid, settle, ApplyOptions, ChangeSet, RefactorContext, RefactorResult};
use crate::compiler::{Symbol, SymbolKind, TypeKind};
use crate::resolver::SymbolQuery;

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractInterfaceRequest {
    pub class_name: String,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Defaults to `I{ClassName}`
    #[serde(default)]
    pub interface_name: Option<String>,
    #[serde(default)]
    pub members: Option<Vec<String>>,
    /// Defaults to `{InterfaceName}.cs` next to the class
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub validate: bool,
}

fn extractable(member: &Symbol) -> bool {
    matches!(member.kind, SymbolKind::Method | SymbolKind::Property)
        && member.has_modifier("public")
        && !member.is_static()
        && !member.is_implicit
}

/// `<T, U>` -> `["T", "U"]`
fn split_type_parameters(raw: Option<&str>) -> Vec<String> {
    raw.map(|r| r.trim().trim_start_matches('<').trim_end_matches('>'))
        .map(|inner| {
            inner
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub async fn extract_interface(ctx: &RefactorContext, request: &ExtractInterfaceRequest) -> Result<RefactorResult> {
    settle(run(ctx, request).await)
}

async fn run(ctx: &RefactorContext, request: &ExtractInterfaceRequest) -> Result<RefactorResult> {
    let mut query = SymbolQuery::named(&request.class_name);
    query.file_path = request.file_path.clone();
    let class = ctx.require(&query, "class")?;
    if !matches!(
        class.type_kind(),
        Some(TypeKind::Class | TypeKind::Struct | TypeKind::Record | TypeKind::RecordStruct)
    ) {
        return invalid(format!("cannot extract an interface from {}", class.display_name));
    }

    let interface_name = request
        .interface_name
        .clone()
        .unwrap_or_else(|| format!("I{}", class.name));
    if !is_valid_identifier(&interface_name) {
        return invalid(format!("'{}' is not a valid identifier", interface_name));
    }

    let members = ctx.compiler.members(&class)?;
    let mut selected: Vec<&Symbol> = members.iter().filter(|m| extractable(m)).collect();
    if let Some(wanted) = &request.members {
        for name in wanted {
            if !selected.iter().any(|m| &m.name == name) {
                return invalid(format!("'{}' is not a public instance method or property of {}", name, class.name));
            }
        }
        selected.retain(|m| wanted.contains(&m.name));
    }
    if selected.is_empty() {
        return invalid(format!("{} has no public instance methods or properties to extract", class.name));
    }

    let (class_file, before) = declaring_source(ctx, &class)?;
    let target = request.output_path.clone().unwrap_or_else(|| {
        class_file
            .parent()
            .map(|dir| dir.join(format!("{}.cs", interface_name)))
            .unwrap_or_else(|| PathBuf::from(format!("{}.cs", interface_name)))
    });
    let target = if target.is_relative() { ctx.root.join(target) } else { target };
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        return invalid(format!("{} already exists", target.display()));
    }

    let type_parameters = split_type_parameters(class.type_parameters.as_deref());
    let shape = TypeShape {
        name: interface_name.clone(),
        modifiers: vec!["public".to_string()],
        type_parameters: type_parameters.clone(),
        members: selected
            .iter()
            .map(|m| match m.kind {
                SymbolKind::Property => interface_property(m),
                _ => interface_method(m),
            })
            .collect(),
        ..TypeShape::default()
    };
    let declaration = type_declaration(TypeKind::Interface, &shape)?;
    let context = ctx.compiler.file_context(&class_file).unwrap_or_default();
    let content = compilation_unit(
        &context.usings,
        class.namespace.as_deref(),
        context.file_scoped_namespace,
        &declaration,
    );

    let Some(syntax) = class.syntax.as_ref() else {
        return invalid(format!("{} has no declaration syntax", class.display_name));
    };
    let base = if type_parameters.is_empty() {
        interface_name.clone()
    } else {
        format!("{}<{}>", interface_name, type_parameters.join(", "))
    };
    let after = apply_edits(&before, vec![add_base_type(syntax, &base)])?;

    let mut changes = ChangeSet::new();
    changes.create(&target, content);
    changes.modify(&class_file, before, after);

    let message = format!(
        "{} {} with {} member(s) from {}",
        if request.preview { "Would extract" } else { "Extracted" },
        interface_name,
        selected.len(),
        class.name
    );
    info!("{} into {}", message, target.display());
    Ok(ctx
        .finish(message, changes, &ApplyOptions::new(request.preview, request.validate))
        .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refactor::testing::{read, workspace};

    const PRINTER: &str = r#"using System;
using System.Text;

namespace Office
{
    public class Printer
    {
        public Printer() { }
        public void Print(string text) { }
        public string Name { get; private set; }
        public static Printer Create() => new Printer();
        private void Helper() { }
    }
}
"#;

    fn request() -> ExtractInterfaceRequest {
        ExtractInterfaceRequest {
            class_name: "Printer".to_string(),
            file_path: None,
            interface_name: None,
            members: None,
            output_path: None,
            preview: false,
            validate: false,
        }
    }

    #[tokio::test]
    async fn test_extracts_public_instance_surface() {
        let (dir, ctx) = workspace(&[("Office/Printer.cs", PRINTER)]);
        let result = extract_interface(&ctx, &request()).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.created_files.len(), 1);

        let interface = read(&dir, "Office/IPrinter.cs");
        assert_eq!(
            interface,
            "using System;\nusing System.Text;\n\nnamespace Office\n{\n    public interface IPrinter\n    {\n        void Print(string text);\n\n        string Name { get; }\n    }\n}\n"
        );
        assert!(read(&dir, "Office/Printer.cs").contains("public class Printer : IPrinter"));
    }

    #[tokio::test]
    async fn test_existing_target_fails() {
        let (dir, ctx) = workspace(&[
            ("Printer.cs", PRINTER),
            ("IPrinter.cs", "namespace Office { }"),
        ]);
        let result = extract_interface(&ctx, &request()).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("already exists"));
        assert_eq!(read(&dir, "Printer.cs"), PRINTER);
    }

    #[tokio::test]
    async fn test_allowlist_must_name_extractable_members() {
        let (_dir, ctx) = workspace(&[("Printer.cs", PRINTER)]);
        let mut req = request();
        req.members = Some(vec!["Helper".to_string()]);
        let result = extract_interface(&ctx, &req).await.unwrap();
        assert!(!result.success);

        req.members = Some(vec!["Print".to_string()]);
        req.interface_name = Some("IPrintable".to_string());
        req.preview = true;
        let preview = extract_interface(&ctx, &req).await.unwrap();
        assert!(preview.success);
        assert_eq!(preview.preview_diffs.len(), 2);
        assert!(preview.preview_diffs[0].after.as_ref().unwrap().contains("void Print(string text);"));
    }
}
