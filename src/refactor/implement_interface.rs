// Stub out the members of an interface a type does not yet implement

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::edits::{add_base_type, apply_edits, insert_members};
use super::synth::{method_stub, property_stub, StubStyle};
use super::{declaring_source, invalid, settle, ApplyOptions, ChangeSet, RefactorContext, RefactorResult};
use crate::compiler::csharp::syntax::{bare_type_name, type_arguments};
use crate::compiler::{Parameter, Symbol, SymbolInfo, SymbolKind, TypeKind};
use crate::resolver::{Resolution, SymbolQuery};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("identifier pattern is valid"));

#[derive(Debug, Clone, Deserialize)]
pub struct ImplementInterfaceRequest {
    pub class_name: String,
    /// Generic interfaces take their type arguments here: `IRepository<Order>`
    pub interface_name: String,
    /// Narrows the class lookup
    #[serde(default)]
    pub file_path: Option<std::path::PathBuf>,
    /// Write `IName.Member` implementations instead of public members
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub validate: bool,
}

/// An interface with its type parameters bound to concrete arguments
struct BoundInterface {
    symbol: Symbol,
    /// How the interface is written at the implementation site
    written: String,
    bindings: HashMap<String, String>,
}

fn type_parameter_names(symbol: &Symbol) -> Vec<String> {
    symbol
        .type_parameters
        .as_deref()
        .map(type_arguments)
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.trim_start_matches("in ").trim_start_matches("out ").trim().to_string())
        .collect()
}

/// Replace whole identifiers bound to type arguments
fn substitute(text: &str, bindings: &HashMap<String, String>) -> String {
    if bindings.is_empty() {
        return text.to_string();
    }
    IDENTIFIER
        .replace_all(text, |caps: &Captures| {
            bindings
                .get(&caps[0])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Bind `interface` to the arguments written in `written`, read in the scope of `outer`
fn bind(interface: Symbol, written: &str, outer: &HashMap<String, String>) -> Result<BoundInterface> {
    let arguments: Vec<String> = type_arguments(written)
        .iter()
        .map(|a| substitute(a, outer))
        .collect();
    let parameters = type_parameter_names(&interface);
    if parameters.len() != arguments.len() {
        return invalid(format!(
            "{} takes {} type argument(s), got {}; write it as {}<...>",
            interface.name,
            parameters.len(),
            arguments.len(),
            interface.name
        ));
    }
    let written = if arguments.is_empty() {
        interface.name.clone()
    } else {
        format!("{}<{}>", interface.name, arguments.join(", "))
    };
    Ok(BoundInterface {
        bindings: parameters.into_iter().zip(arguments).collect(),
        symbol: interface,
        written,
    })
}

/// The interface followed by every interface it inherits, each visited once
fn interface_closure(ctx: &RefactorContext, root: BoundInterface) -> Result<Vec<BoundInterface>> {
    let mut seen = HashSet::from([root.symbol.display_name.clone()]);
    let mut queue = VecDeque::from([root]);
    let mut closure = Vec::new();
    while let Some(current) = queue.pop_front() {
        for base in &current.symbol.base_types {
            let name = bare_type_name(base);
            let symbol = match ctx.resolver.resolve(&SymbolQuery::named(&name))? {
                Resolution::Found(symbol) if symbol.type_kind() == Some(TypeKind::Interface) => symbol,
                Resolution::Found(_) | Resolution::NotFound => {
                    debug!("Base interface {} of {} is not in the workspace", base, current.symbol.name);
                    continue;
                }
                Resolution::Ambiguous(_) => {
                    warn!("Base interface {} of {} is ambiguous; skipping it", base, current.symbol.name);
                    continue;
                }
            };
            if !seen.insert(symbol.display_name.clone()) {
                continue;
            }
            match bind(symbol, base, &current.bindings) {
                Ok(bound) => queue.push_back(bound),
                Err(e) => warn!("Skipping base interface {}: {:#}", base, e),
            }
        }
        closure.push(current);
    }
    Ok(closure)
}

/// A copy of `member` with bound type parameters replaced in its signature
fn specialize(member: &Symbol, bindings: &HashMap<String, String>) -> Symbol {
    if bindings.is_empty() {
        return member.clone();
    }
    let info = member.info();
    Symbol::new(SymbolInfo {
        return_type: info.return_type.as_deref().map(|t| substitute(t, bindings)),
        parameters: info
            .parameters
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                type_name: substitute(&p.type_name, bindings),
                default_value: p.default_value.clone(),
                text: substitute(&p.text, bindings),
            })
            .collect(),
        ..info.clone()
    })
}

pub async fn implement_interface(ctx: &RefactorContext, request: &ImplementInterfaceRequest) -> Result<RefactorResult> {
    settle(run(ctx, request).await)
}

async fn run(ctx: &RefactorContext, request: &ImplementInterfaceRequest) -> Result<RefactorResult> {
    let mut class_query = SymbolQuery::named(&request.class_name);
    class_query.file_path = request.file_path.clone();
    let class = ctx.require(&class_query, "class")?;
    match class.type_kind() {
        Some(TypeKind::Class | TypeKind::Struct | TypeKind::Record | TypeKind::RecordStruct) => {}
        _ => return invalid(format!("{} cannot implement an interface", class.display_name)),
    }

    let interface_name = bare_type_name(&request.interface_name);
    let interface = ctx.require(&SymbolQuery::named(&interface_name), "interface")?;
    if interface.type_kind() != Some(TypeKind::Interface) {
        return invalid(format!("{} is not an interface", interface.display_name));
    }
    let root = bind(interface.clone(), &request.interface_name, &HashMap::new())?;
    let written = root.written.clone();

    let mut implemented: HashSet<String> = ctx
        .compiler
        .members(&class)?
        .into_iter()
        .map(|m| m.name.clone())
        .collect();
    let mut missing: Vec<(Symbol, String)> = Vec::new();
    for bound in interface_closure(ctx, root)? {
        for member in ctx.compiler.members(&bound.symbol)? {
            if !matches!(member.kind, SymbolKind::Method | SymbolKind::Property) || member.is_static() {
                continue;
            }
            if !implemented.insert(member.name.clone()) {
                continue;
            }
            missing.push((specialize(&member, &bound.bindings), bound.written.clone()));
        }
    }

    let listed = class
        .base_types
        .iter()
        .any(|b| bare_type_name(b).rsplit('.').next() == Some(interface.name.as_str()));
    if missing.is_empty() && listed {
        return Ok(RefactorResult::unchanged(format!(
            "{} already implements {}",
            class.name, interface.name
        )));
    }

    let (file, before) = declaring_source(ctx, &class)?;
    let Some(syntax) = class.syntax.as_ref() else {
        return invalid(format!("{} has no declaration syntax", class.display_name));
    };
    let short_exception = ctx
        .compiler
        .file_context(&file)
        .map(|c| c.usings.iter().any(|u| u.trim() == "using System;"))
        .unwrap_or(false);

    let stubs: Vec<String> = missing
        .iter()
        .map(|(member, declared_by)| {
            let style = StubStyle {
                explicit_interface: request.explicit.then_some(declared_by.as_str()),
                short_exception,
            };
            match member.kind {
                SymbolKind::Property => property_stub(member, style),
                _ => method_stub(member, style),
            }
        })
        .collect();

    let mut edits = Vec::new();
    if !listed {
        edits.push(add_base_type(syntax, &written));
    }
    if !stubs.is_empty() {
        edits.push(insert_members(&before, syntax, &stubs)?);
    }
    let after = apply_edits(&before, edits)?;

    let mut changes = ChangeSet::new();
    changes.modify(file, before, after);

    let message = format!(
        "{} {} member(s) of {} on {}",
        if request.preview { "Would implement" } else { "Implemented" },
        stubs.len(),
        written,
        class.name
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

    const PRINTER: &str = r#"using System;

namespace Office
{
    public interface IPrinter
    {
        void Print(string text);
        string Name { get; set; }
        int Pages { get; }
    }

    public class Printer
    {
        public void Print(string text)
        {
        }
    }
}
"#;

    fn request(explicit: bool) -> ImplementInterfaceRequest {
        ImplementInterfaceRequest {
            class_name: "Printer".to_string(),
            interface_name: "IPrinter".to_string(),
            file_path: None,
            explicit,
            preview: false,
            validate: false,
        }
    }

    #[tokio::test]
    async fn test_stubs_missing_members() {
        let (dir, ctx) = workspace(&[("Printer.cs", PRINTER)]);
        let result = implement_interface(&ctx, &request(false)).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert!(result.message.contains("2 member(s)"));

        let text = read(&dir, "Printer.cs");
        assert!(text.contains("public class Printer : IPrinter"));
        assert!(text.contains(
            "        public string Name\n        {\n            get => throw new NotImplementedException();\n            set => throw new NotImplementedException();\n        }"
        ));
        assert!(text.contains("public int Pages\n        {\n            get => throw new NotImplementedException();\n        }"));
        assert_eq!(text.matches("public void Print").count(), 1);
    }

    #[tokio::test]
    async fn test_explicit_implementation() {
        let (dir, ctx) = workspace(&[("Printer.cs", PRINTER)]);
        let result = implement_interface(&ctx, &request(true)).await.unwrap();
        assert!(result.success);

        let text = read(&dir, "Printer.cs");
        assert!(text.contains("string IPrinter.Name"));
        assert!(text.contains("int IPrinter.Pages"));
    }

    #[tokio::test]
    async fn test_complete_type_is_a_no_op() {
        let source = "namespace Office\n{\n    public interface IJob { void Run(); }\n    public class Job : IJob\n    {\n        public void Run() { }\n    }\n}\n";
        let (dir, ctx) = workspace(&[("Job.cs", source)]);
        let mut req = request(false);
        req.class_name = "Job".to_string();
        req.interface_name = "IJob".to_string();

        let result = implement_interface(&ctx, &req).await.unwrap();
        assert!(result.success);
        assert!(result.message.contains("already implements"));
        assert!(result.modified_files.is_empty());
        assert_eq!(read(&dir, "Job.cs"), source);
    }

    #[tokio::test]
    async fn test_inherited_interface_members_are_stubbed() {
        let source = "namespace Docs\n{\n    public interface IBase { void Open(); }\n    public interface IDoc : IBase { void Save(); }\n    public class Doc\n    {\n    }\n}\n";
        let (dir, ctx) = workspace(&[("Doc.cs", source)]);
        let mut req = request(false);
        req.class_name = "Doc".to_string();
        req.interface_name = "IDoc".to_string();

        let result = implement_interface(&ctx, &req).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert!(result.message.contains("2 member(s)"));
        let text = read(&dir, "Doc.cs");
        assert!(text.contains("public class Doc : IDoc"));
        assert!(text.contains("public void Save()"));
        assert!(text.contains("public void Open()"));

        // Explicit stubs name the interface that declares the member
        let (dir, ctx) = workspace(&[("Doc.cs", source)]);
        req.explicit = true;
        assert!(implement_interface(&ctx, &req).await.unwrap().success);
        let text = read(&dir, "Doc.cs");
        assert!(text.contains("void IDoc.Save()"));
        assert!(text.contains("void IBase.Open()"));
    }

    #[tokio::test]
    async fn test_generic_interface_is_bound() {
        let source = "namespace Store\n{\n    public interface IReader<TKey> { TKey First(); }\n    public interface IRepo<T> : IReader<int> { T Get(int id); void Put(T item); }\n    public class Item { }\n    public class Repo\n    {\n    }\n}\n";
        let (dir, ctx) = workspace(&[("Repo.cs", source)]);
        let mut req = request(false);
        req.class_name = "Repo".to_string();
        req.interface_name = "IRepo<Item>".to_string();

        let result = implement_interface(&ctx, &req).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        let text = read(&dir, "Repo.cs");
        assert!(text.contains("public class Repo : IRepo<Item>"));
        assert!(text.contains("public Item Get(int id)"));
        assert!(text.contains("public void Put(Item item)"));
        assert!(text.contains("public int First()"));
        assert!(!text.contains("public T "));

        // Missing type arguments are rejected
        let (dir, ctx) = workspace(&[("Repo.cs", source)]);
        req.interface_name = "IRepo".to_string();
        let result = implement_interface(&ctx, &req).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("takes 1 type argument(s)"));
        assert_eq!(read(&dir, "Repo.cs"), source);
    }

    #[tokio::test]
    async fn test_non_interface_fails() {
        let (_dir, ctx) = workspace(&[("Printer.cs", PRINTER)]);
        let mut req = request(false);
        req.interface_name = "Printer".to_string();
        let result = implement_interface(&ctx, &req).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("is not an interface"));
    }
}
