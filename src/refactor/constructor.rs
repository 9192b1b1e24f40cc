// Constructor generation from read-only state

use std::collections::HashSet;

use anyhow::Result;
use serde::Deserialize;
use tracing::info;

use super::edits::{apply_edits, insert_members};
use super::synth::{camel_case, escape_identifier};
use super::{declaring_source, invalid, settle, ApplyOptions, ChangeSet, RefactorContext, RefactorResult};
use crate::compiler::{Symbol, SymbolKind, TypeKind};
use crate::resolver::SymbolQuery;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateConstructorRequest {
    pub class_name: String,
    #[serde(default)]
    pub file_path: Option<std::path::PathBuf>,
    /// Only these members, in declaration order
    #[serde(default)]
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub validate: bool,
}

/// Non-static read-only fields and get-only auto-properties
fn assignable(member: &Symbol) -> bool {
    if member.is_static() || member.is_implicit {
        return false;
    }
    match member.kind {
        SymbolKind::Field => member.has_modifier("readonly"),
        SymbolKind::Property => member
            .accessors
            .map(|a| a.get && a.auto && !a.set && !a.init)
            .unwrap_or(false),
        _ => false,
    }
}

pub async fn generate_constructor(ctx: &RefactorContext, request: &GenerateConstructorRequest) -> Result<RefactorResult> {
    settle(run(ctx, request).await)
}

async fn run(ctx: &RefactorContext, request: &GenerateConstructorRequest) -> Result<RefactorResult> {
    let mut query = SymbolQuery::named(&request.class_name);
    query.file_path = request.file_path.clone();
    let class = ctx.require(&query, "class")?;
    if !matches!(
        class.type_kind(),
        Some(TypeKind::Class | TypeKind::Struct | TypeKind::Record | TypeKind::RecordStruct)
    ) {
        return invalid(format!("{} cannot declare a constructor", class.display_name));
    }

    let members = ctx.compiler.members(&class)?;
    let mut selected: Vec<&Symbol> = members.iter().filter(|m| assignable(m)).collect();
    if let Some(wanted) = &request.members {
        for name in wanted {
            if !selected.iter().any(|m| &m.name == name) {
                return invalid(format!(
                    "'{}' is not a read-only field or get-only auto-property of {}",
                    name, class.name
                ));
            }
        }
        selected.retain(|m| wanted.contains(&m.name));
    }
    if selected.is_empty() {
        return invalid(format!(
            "{} has no read-only fields or get-only auto-properties to initialize",
            class.name
        ));
    }

    let types: Vec<&str> = selected
        .iter()
        .map(|m| m.return_type.as_deref().unwrap_or("object"))
        .collect();
    let duplicate = members.iter().any(|m| {
        m.kind == SymbolKind::Constructor
            && !m.is_static()
            && m.parameters.iter().map(|p| p.type_name.as_str()).eq(types.iter().copied())
    });
    if duplicate {
        return invalid(format!(
            "{} already has a constructor taking ({})",
            class.name,
            types.join(", ")
        ));
    }

    let mut used = HashSet::new();
    let mut parameters = Vec::new();
    let mut assignments = Vec::new();
    for (member, type_name) in selected.iter().zip(&types) {
        let base = camel_case(&member.name);
        let mut name = base.clone();
        let mut suffix = 2;
        while !used.insert(name.clone()) {
            name = format!("{}{}", base, suffix);
            suffix += 1;
        }
        let parameter = escape_identifier(&name);
        parameters.push(format!("{} {}", type_name, parameter));
        if name == member.name {
            assignments.push(format!("    this.{} = {};", member.name, parameter));
        } else {
            assignments.push(format!("    {} = {};", member.name, parameter));
        }
    }

    let constructor = format!(
        "public {}({})\n{{\n{}\n}}",
        class.name,
        parameters.join(", "),
        assignments.join("\n")
    );

    let (file, before) = declaring_source(ctx, &class)?;
    let Some(syntax) = class.syntax.as_ref() else {
        return invalid(format!("{} has no declaration syntax", class.display_name));
    };
    let after = apply_edits(&before, vec![insert_members(&before, syntax, &[constructor])?])?;

    let mut changes = ChangeSet::new();
    changes.modify(file, before, after);

    let message = format!(
        "{} constructor for {} initializing {}",
        if request.preview { "Would generate" } else { "Generated" },
        class.name,
        selected.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join(", ")
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

    const SERVICE: &str = r#"namespace Billing
{
    public class InvoiceService
    {
        private readonly IClock _clock;
        private readonly int count;
        private static readonly object Gate = new object();
        public string Region { get; }
        public int Retries { get; set; }
        public int Computed => 5;
    }

    public interface IClock { }
}
"#;

    fn request(members: Option<&[&str]>) -> GenerateConstructorRequest {
        GenerateConstructorRequest {
            class_name: "InvoiceService".to_string(),
            file_path: None,
            members: members.map(|m| m.iter().map(|s| s.to_string()).collect()),
            preview: false,
            validate: false,
        }
    }

    #[tokio::test]
    async fn test_generates_from_read_only_state() {
        let (dir, ctx) = workspace(&[("InvoiceService.cs", SERVICE)]);
        let result = generate_constructor(&ctx, &request(None)).await.unwrap();
        assert!(result.success, "{:?}", result.error);

        let text = read(&dir, "InvoiceService.cs");
        assert!(text.contains("public InvoiceService(IClock clock, int count, string region)"));
        assert!(text.contains("            _clock = clock;\n"));
        assert!(text.contains("            this.count = count;\n"));
        assert!(text.contains("            Region = region;\n"));
        assert!(!text.contains("retries"));
    }

    #[tokio::test]
    async fn test_allowlist_and_duplicate_constructor() {
        let (dir, ctx) = workspace(&[("InvoiceService.cs", SERVICE)]);
        let result = generate_constructor(&ctx, &request(Some(&["Region"]))).await.unwrap();
        assert!(result.success);
        assert!(read(&dir, "InvoiceService.cs").contains("public InvoiceService(string region)"));

        let again = generate_constructor(&ctx, &request(Some(&["Region"]))).await.unwrap();
        assert!(!again.success);
        assert!(again.message.contains("already has a constructor taking (string)"));
    }

    #[tokio::test]
    async fn test_nothing_to_initialize_fails() {
        let source = "namespace Billing { public class Empty { public int Count { get; set; } } }";
        let (_dir, ctx) = workspace(&[("Empty.cs", source)]);
        let mut req = request(None);
        req.class_name = "Empty".to_string();
        let result = generate_constructor(&ctx, &req).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("no read-only fields"));

        let unknown = generate_constructor(&ctx, &GenerateConstructorRequest {
            members: Some(vec!["Count".to_string()]),
            ..req
        })
        .await
        .unwrap();
        assert!(!unknown.success);
    }
}
