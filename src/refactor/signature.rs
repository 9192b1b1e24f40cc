// Add and remove method parameters, updating call sites for additions

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, info};

use super::edits::{append_argument, apply_edits, TextEdit};
use super::synth::{default_expression, is_valid_identifier};
use super::{invalid, settle, ApplyOptions, ChangeSet, RefactorContext, RefactorResult};
use crate::compiler::SymbolKind;
use crate::error::RefactorError;
use crate::resolver::SymbolQuery;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub default_value: Option<String>,
}

impl NewParameter {
    fn declaration(&self) -> String {
        match &self.default_value {
            Some(value) => format!("{} {} = {}", self.type_name, self.name, value),
            None => format!("{} {}", self.type_name, self.name),
        }
    }

    /// Argument appended at existing call sites
    fn argument(&self) -> String {
        self.default_value
            .clone()
            .unwrap_or_else(|| default_expression(&self.type_name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeSignatureRequest {
    #[serde(flatten)]
    pub method: SymbolQuery,
    #[serde(default)]
    pub add_parameters: Vec<NewParameter>,
    #[serde(default)]
    pub remove_parameters: Vec<String>,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub validate: bool,
}

pub async fn change_signature(ctx: &RefactorContext, request: &ChangeSignatureRequest) -> Result<RefactorResult> {
    settle(run(ctx, request).await)
}

async fn run(ctx: &RefactorContext, request: &ChangeSignatureRequest) -> Result<RefactorResult> {
    if request.add_parameters.is_empty() && request.remove_parameters.is_empty() {
        return invalid("no parameters to add or remove");
    }

    let method = ctx.require(&request.method, "method")?;
    if !matches!(method.kind, SymbolKind::Method | SymbolKind::Constructor) {
        return invalid(format!("{} is a {}, not a method", method.display_name, method.kind));
    }
    let (file, syntax) = match (method.file(), method.syntax.as_ref()) {
        (Some(file), Some(syntax)) => (file.to_path_buf(), syntax),
        _ => return invalid(format!("{} is not declared in source", method.display_name)),
    };
    let list = syntax
        .parameter_list
        .clone()
        .ok_or_else(|| RefactorError::InvalidRequest(format!("{} has no parameter list", method.display_name)))?;

    for name in &request.remove_parameters {
        if !method.parameters.iter().any(|p| &p.name == name) {
            return invalid(format!("{} has no parameter named '{}'", method.display_name, name));
        }
    }
    let kept: Vec<&str> = method
        .parameters
        .iter()
        .filter(|p| !request.remove_parameters.contains(&p.name))
        .map(|p| p.text.as_str())
        .collect();

    let mut names: HashSet<&str> = method
        .parameters
        .iter()
        .filter(|p| !request.remove_parameters.contains(&p.name))
        .map(|p| p.name.as_str())
        .collect();
    for added in &request.add_parameters {
        if !is_valid_identifier(&added.name) || added.type_name.trim().is_empty() {
            return invalid(format!("'{} {}' is not a valid parameter", added.type_name, added.name));
        }
        if !names.insert(added.name.as_str()) {
            return invalid(format!("{} already has a parameter named '{}'", method.display_name, added.name));
        }
    }

    let declarations: Vec<String> = kept
        .iter()
        .map(|s| s.to_string())
        .chain(request.add_parameters.iter().map(NewParameter::declaration))
        .collect();

    let mut edits: BTreeMap<PathBuf, Vec<TextEdit>> = BTreeMap::new();
    edits
        .entry(file.clone())
        .or_default()
        .push(TextEdit::replace(list.clone(), format!("({})", declarations.join(", "))));

    let references = ctx.compiler.find_references(&method)?;
    let mut updated_calls = 0;
    if !request.add_parameters.is_empty() {
        let appended = request
            .add_parameters
            .iter()
            .map(NewParameter::argument)
            .collect::<Vec<_>>()
            .join(", ");
        for reference in &references {
            let Some(arguments) = &reference.call_arguments else {
                debug!("Skipping non-call reference at {}:{}", reference.file.display(), reference.line);
                continue;
            };
            let source = ctx.document_text(&reference.file)?;
            edits
                .entry(reference.file.clone())
                .or_default()
                .push(append_argument(&source, arguments, &appended));
            updated_calls += 1;
        }
    }

    let mut changes = ChangeSet::new();
    for (path, file_edits) in edits {
        let before = ctx.document_text(&path)?;
        let after = apply_edits(&before, file_edits)?;
        changes.modify(path, before, after);
    }

    let mut message = format!(
        "{} signature of {}: {} call site(s) updated",
        if request.preview { "Would change" } else { "Changed" },
        method.display_name,
        updated_calls
    );
    let mut warnings = Vec::new();
    if !request.remove_parameters.is_empty() && !references.is_empty() {
        let note = format!(
            "call sites still pass arguments for removed parameter(s) {}; update them manually",
            request.remove_parameters.join(", ")
        );
        message.push_str(&format!("; {}", note));
        warnings.push(note);
    }

    info!("{}", message);
    let options = ApplyOptions::new(request.preview, request.validate);
    let mut result = ctx.finish(message, changes, &options).await;
    result.warnings.extend(warnings);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refactor::testing::{read, workspace};

    const ORDER: &str = r#"namespace Shop
{
    public class Order
    {
        public void Save(string path, int copies)
        {
        }

        public decimal Total { get; set; }
    }

    public class Checkout
    {
        public void Run(Order order)
        {
            order.Save("a.txt", 1);
            order.Save("b.txt", 2);
        }
    }
}
"#;

    fn request(add: Vec<NewParameter>, remove: &[&str]) -> ChangeSignatureRequest {
        ChangeSignatureRequest {
            method: SymbolQuery::named("Save").in_type("Order"),
            add_parameters: add,
            remove_parameters: remove.iter().map(|s| s.to_string()).collect(),
            preview: false,
            validate: false,
        }
    }

    fn param(name: &str, type_name: &str, default_value: Option<&str>) -> NewParameter {
        NewParameter {
            name: name.to_string(),
            type_name: type_name.to_string(),
            default_value: default_value.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_added_parameters_reach_call_sites() {
        let (dir, ctx) = workspace(&[("Order.cs", ORDER)]);
        let req = request(
            vec![param("force", "bool", Some("false")), param("retries", "int", None)],
            &[],
        );
        let result = change_signature(&ctx, &req).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert!(result.message.contains("2 call site(s) updated"));

        let text = read(&dir, "Order.cs");
        assert!(text.contains("public void Save(string path, int copies, bool force = false, int retries)"));
        assert!(text.contains("order.Save(\"a.txt\", 1, false, default(int));"));
        assert!(text.contains("order.Save(\"b.txt\", 2, false, default(int));"));
    }

    #[tokio::test]
    async fn test_removed_parameters_leave_call_sites() {
        let (dir, ctx) = workspace(&[("Order.cs", ORDER)]);
        let result = change_signature(&ctx, &request(Vec::new(), &["copies"])).await.unwrap();
        assert!(result.success);
        assert!(result.message.contains("update them manually"));
        assert_eq!(result.warnings.len(), 1);

        let text = read(&dir, "Order.cs");
        assert!(text.contains("public void Save(string path)"));
        assert!(text.contains("order.Save(\"a.txt\", 1);"));
    }

    #[tokio::test]
    async fn test_invalid_changes_fail() {
        let (dir, ctx) = workspace(&[("Order.cs", ORDER)]);

        let missing = change_signature(&ctx, &request(Vec::new(), &["nope"])).await.unwrap();
        assert!(!missing.success);
        assert!(missing.message.contains("no parameter named 'nope'"));

        let duplicate = change_signature(&ctx, &request(vec![param("path", "string", None)], &[]))
            .await
            .unwrap();
        assert!(!duplicate.success);

        let empty = change_signature(&ctx, &request(Vec::new(), &[])).await.unwrap();
        assert!(!empty.success);

        let mut property = request(vec![param("x", "int", None)], &[]);
        property.method = SymbolQuery::named("Total").in_type("Order");
        let not_method = change_signature(&ctx, &property).await.unwrap();
        assert!(!not_method.success);
        assert!(not_method.message.contains("not a method"));

        assert_eq!(read(&dir, "Order.cs"), ORDER);
    }
}
