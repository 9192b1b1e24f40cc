// Reference-aware rename of any resolvable symbol

use anyhow::Result;
use serde::Deserialize;
use tracing::info;

use super::synth::is_valid_identifier;
use super::{invalid, settle, ApplyOptions, ChangeSet, RefactorContext, RefactorResult};
use crate::resolver::SymbolQuery;

#[derive(Debug, Clone, Deserialize)]
pub struct RenameRequest {
    #[serde(flatten)]
    pub symbol: SymbolQuery,
    pub new_name: String,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub validate: bool,
}

pub async fn rename(ctx: &RefactorContext, request: &RenameRequest) -> Result<RefactorResult> {
    settle(run(ctx, request).await)
}

async fn run(ctx: &RefactorContext, request: &RenameRequest) -> Result<RefactorResult> {
    let new_name = request.new_name.trim();
    if !is_valid_identifier(new_name) {
        return invalid(format!("'{}' is not a valid identifier", new_name));
    }

    let symbol = ctx.require(&request.symbol, "symbol")?;
    if symbol.is_external() {
        return invalid(format!("{} is not declared in this workspace", symbol.display_name));
    }
    if symbol.name == new_name {
        return invalid(format!("{} is already named '{}'", symbol.display_name, new_name));
    }

    let before = ctx.compiler.workspace_state()?;
    let after = ctx.compiler.rename_across_workspace(&symbol, new_name)?;

    let mut changes = ChangeSet::new();
    for (path, old_text, new_text) in before.changed_documents(&after) {
        changes.modify(path, old_text, new_text);
    }
    if changes.is_empty() {
        return Ok(RefactorResult::unchanged(format!("Nothing to rename for {}", symbol.display_name)));
    }

    info!(
        "Renaming {} to '{}' across {} file(s)",
        symbol, new_name, changes.len()
    );
    let message = format!(
        "{} {} '{}' to '{}' in {} file(s)",
        if request.preview { "Would rename" } else { "Renamed" },
        symbol.kind,
        symbol.name,
        new_name,
        changes.len()
    );
    let options = ApplyOptions {
        preview: request.preview,
        validate: request.validate,
        residual_name: Some(symbol.name.clone()),
    };
    Ok(ctx.finish(message, changes, &options).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefactorError;
    use crate::refactor::testing::{read, workspace};

    const CART: &str = "namespace Shop\n{\n    // Cart keeps the lines\n    public class Cart\n    {\n        public Cart() { }\n        public int Count { get; set; }\n    }\n}\n";
    const CHECKOUT: &str = "namespace Shop\n{\n    public class Checkout\n    {\n        private Cart _cart = new Cart();\n        public int Size() => _cart.Count;\n    }\n}\n";

    fn request(name: &str, new_name: &str) -> RenameRequest {
        RenameRequest {
            symbol: SymbolQuery::named(name),
            new_name: new_name.to_string(),
            preview: false,
            validate: false,
        }
    }

    #[tokio::test]
    async fn test_rename_type_across_files() {
        let (dir, ctx) = workspace(&[("Cart.cs", CART), ("Checkout.cs", CHECKOUT)]);
        let result = rename(&ctx, &request("Cart", "Basket")).await.unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.modified_files.len(), 2);
        let cart = read(&dir, "Cart.cs");
        assert!(cart.contains("public class Basket"));
        assert!(cart.contains("public Basket() { }"));
        assert!(read(&dir, "Checkout.cs").contains("private Basket _cart = new Basket();"));
    }

    #[tokio::test]
    async fn test_rename_keeps_edits_made_after_load() {
        let (dir, ctx) = workspace(&[("Cart.cs", CART), ("Checkout.cs", CHECKOUT)]);
        assert!(ctx.compiler.all_types().unwrap().len() >= 2);

        let edited = format!("{}// user edit\n", CHECKOUT);
        std::fs::write(dir.path().join("Checkout.cs"), &edited).unwrap();
        let result = rename(&ctx, &request("Cart", "Basket")).await.unwrap();

        assert!(result.success, "{:?}", result.error);
        let checkout = read(&dir, "Checkout.cs");
        assert!(checkout.contains("new Basket()"));
        assert!(checkout.ends_with("// user edit\n"));
    }

    #[tokio::test]
    async fn test_preview_leaves_disk_untouched() {
        let (dir, ctx) = workspace(&[("Cart.cs", CART), ("Checkout.cs", CHECKOUT)]);
        let mut req = request("Count", "Quantity");
        req.symbol = req.symbol.in_type("Cart");
        req.preview = true;

        let result = rename(&ctx, &req).await.unwrap();
        assert!(result.success);
        assert!(result.message.starts_with("Would rename property"));
        assert_eq!(result.preview_diffs.len(), 2);
        assert!(result.modified_files.is_empty());
        assert_eq!(read(&dir, "Checkout.cs"), CHECKOUT);
    }

    #[tokio::test]
    async fn test_validate_reports_residual_text() {
        let (_dir, ctx) = workspace(&[("Cart.cs", CART), ("Checkout.cs", CHECKOUT)]);
        let mut req = request("Cart", "Basket");
        req.validate = true;

        let result = rename(&ctx, &req).await.unwrap();
        assert!(result.success);
        let validation = result.validation.unwrap();
        assert_eq!(validation.residuals.len(), 1);
        assert!(validation.residuals[0].text.contains("// Cart keeps the lines"));
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_and_unknown_names_fail() {
        let (_dir, ctx) = workspace(&[("Cart.cs", CART)]);

        let keyword = rename(&ctx, &request("Cart", "class")).await.unwrap();
        assert!(!keyword.success);
        assert!(keyword.message.contains("not a valid identifier"));

        let same = rename(&ctx, &request("Cart", "Cart")).await.unwrap();
        assert!(!same.success);

        let missing = rename(&ctx, &request("Wagon", "Basket")).await.unwrap();
        assert!(!missing.success);
        assert_eq!(missing.message, "symbol not found: Wagon");
    }

    #[tokio::test]
    async fn test_ambiguous_symbol_raises() {
        let (_dir, ctx) = workspace(&[
            ("A.cs", "namespace Billing { public class Invoice { } }"),
            ("B.cs", "namespace Legacy { public class Invoice { } }"),
        ]);
        let err = rename(&ctx, &request("Invoice", "Bill")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RefactorError>(),
            Some(RefactorError::Ambiguous { .. })
        ));
    }
}
