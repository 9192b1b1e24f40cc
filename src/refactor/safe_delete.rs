// Delete a symbol only when nothing references it

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

use super::edits::{apply_edits, declaration_lines, declarator_removal, tidy, TextEdit};
use super::{invalid, settle, ApplyOptions, ChangeSet, RefactorContext, RefactorResult, ReferenceSummary};
use crate::error::RefactorError;
use crate::resolver::SymbolQuery;

#[derive(Debug, Clone, Deserialize)]
pub struct SafeDeleteRequest {
    #[serde(flatten)]
    pub symbol: SymbolQuery,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub validate: bool,
}

pub async fn safe_delete(ctx: &RefactorContext, request: &SafeDeleteRequest) -> Result<RefactorResult> {
    settle(run(ctx, request).await)
}

async fn run(ctx: &RefactorContext, request: &SafeDeleteRequest) -> Result<RefactorResult> {
    let symbol = ctx.require(&request.symbol, "symbol")?;
    if symbol.is_external() {
        return invalid(format!("{} is not declared in this workspace", symbol.display_name));
    }
    if symbol.is_implicit {
        return invalid(format!("{} is synthesized and has no declaration to remove", symbol.display_name));
    }

    let references = ctx.compiler.find_references(&symbol)?;
    if !references.is_empty() {
        let limit = ctx.config.refactor.max_reported_references;
        let error = RefactorError::ReferencesRemain {
            name: symbol.name.clone(),
            count: references.len(),
        };
        warn!("Refusing to delete {}: {}", symbol, error);
        let mut result = RefactorResult::failure(format!("Cannot delete {}: {}", symbol.display_name, error));
        result.remaining_references = references.iter().take(limit).map(ReferenceSummary::from).collect();
        return Ok(result);
    }

    let mut removals: BTreeMap<PathBuf, (Vec<TextEdit>, usize)> = BTreeMap::new();
    for declaration in ctx.compiler.declarations_of(&symbol)? {
        let (Some(file), Some(syntax)) = (declaration.file(), declaration.syntax.as_ref()) else {
            continue;
        };
        let before = ctx.document_text(file)?;
        let entry = removals.entry(file.to_path_buf()).or_default();
        if declaration.is_type() && !syntax.nested {
            entry.1 += 1;
        }
        let range = match &syntax.declarator {
            Some(declarator) if syntax.declarator_count > 1 => declarator_removal(&before, declarator),
            _ => declaration_lines(&before, &syntax.span),
        };
        entry.0.push(TextEdit::delete(range));
    }
    if removals.is_empty() {
        return invalid(format!("no source declaration found for {}", symbol.display_name));
    }

    let mut changes = ChangeSet::new();
    for (path, (edits, top_level_types)) in removals {
        let before = ctx.document_text(&path)?;
        let types_in_file = ctx
            .compiler
            .file_context(&path)
            .map(|c| c.type_count)
            .unwrap_or(usize::MAX);
        // Nothing else declared here
        if top_level_types > 0 && types_in_file == top_level_types {
            changes.delete(path, before);
            continue;
        }
        let after = tidy(&apply_edits(&before, edits)?);
        changes.modify(path, before, after);
    }

    let message = format!(
        "{} {} {}",
        if request.preview { "Would delete" } else { "Deleted" },
        symbol.kind,
        symbol.display_name
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

    const LEDGER: &str = r#"namespace Books
{
    public class Ledger
    {
        private int _a, _b, _c;

        /// <summary>Unused helper</summary>
        private void Unused()
        {
        }

        public void Post()
        {
            Audit();
            _b = 1;
        }

        private void Audit() { }
    }
}
"#;

    fn request(name: &str) -> SafeDeleteRequest {
        SafeDeleteRequest {
            symbol: SymbolQuery::named(name).in_type("Ledger"),
            preview: false,
            validate: false,
        }
    }

    #[tokio::test]
    async fn test_unreferenced_member_removed_with_doc_comment() {
        let (dir, ctx) = workspace(&[("Ledger.cs", LEDGER)]);
        let result = safe_delete(&ctx, &request("Unused")).await.unwrap();
        assert!(result.success, "{:?}", result.error);

        let text = read(&dir, "Ledger.cs");
        assert!(!text.contains("Unused"));
        assert!(!text.contains("<summary>"));
        assert!(text.contains("        private int _a, _b, _c;\n\n        public void Post()"));
    }

    #[tokio::test]
    async fn test_referenced_member_is_refused() {
        let (dir, ctx) = workspace(&[("Ledger.cs", LEDGER)]);
        let result = safe_delete(&ctx, &request("Audit")).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("1 reference(s) to 'Audit' remain"));
        assert_eq!(result.remaining_references.len(), 1);
        assert_eq!(result.remaining_references[0].line, 14);
        assert_eq!(result.remaining_references[0].text, "Audit();");
        assert_eq!(read(&dir, "Ledger.cs"), LEDGER);

        // Same context once the last call is gone
        std::fs::write(dir.path().join("Ledger.cs"), LEDGER.replace("            Audit();\n", "")).unwrap();
        let result = safe_delete(&ctx, &request("Audit")).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        let text = read(&dir, "Ledger.cs");
        assert!(!text.contains("Audit"));
        assert!(text.contains("public void Post()"));
    }

    #[tokio::test]
    async fn test_single_declarator_removed() {
        let (dir, ctx) = workspace(&[("Ledger.cs", LEDGER)]);
        let result = safe_delete(&ctx, &request("_c")).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert!(read(&dir, "Ledger.cs").contains("private int _a, _b;"));

        let refused = safe_delete(&ctx, &request("_b")).await.unwrap();
        assert!(!refused.success);
    }

    #[tokio::test]
    async fn test_sole_type_deletes_file() {
        let (dir, ctx) = workspace(&[
            ("Ledger.cs", LEDGER),
            ("Journal.cs", "namespace Books\n{\n    public class Journal { }\n}\n"),
        ]);
        let req = SafeDeleteRequest {
            symbol: SymbolQuery::named("Journal"),
            preview: false,
            validate: false,
        };
        let result = safe_delete(&ctx, &req).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.deleted_files.len(), 1);
        assert!(!dir.path().join("Journal.cs").exists());
    }
}
