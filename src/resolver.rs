// Symbol resolution from a name plus optional scoping hints

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compiler::{CompilerService, Symbol};
use crate::error::{Candidate, RefactorError};

/// What the caller knows about the symbol it wants
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolQuery {
    pub name: String,
    #[serde(default)]
    pub containing_type: Option<String>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl SymbolQuery {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn in_type(mut self, containing_type: impl Into<String>) -> Self {
        self.containing_type = Some(containing_type.into());
        self
    }

    pub fn in_file(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Symbol),
    NotFound,
    Ambiguous(Vec<Symbol>),
}

/// (kind, qualified name, file) for every candidate
pub fn candidates(symbols: &[Symbol]) -> Vec<Candidate> {
    symbols
        .iter()
        .map(|s| Candidate {
            kind: s.kind.as_str().to_string(),
            qualified_name: s.display_name.clone(),
            file: s.file().map(|f| f.display().to_string()),
        })
        .collect()
}

/// Simple name, or a dotted suffix of the qualified name
fn matches_name(symbol: &Symbol, name: &str) -> bool {
    if symbol.name == name {
        return true;
    }
    name.contains('.')
        && (symbol.qualified_name == name
            || symbol.display_name == name
            || symbol.qualified_name.ends_with(&format!(".{}", name)))
}

fn matches_type_name(qualified: &str, simple: &str, wanted: &str) -> bool {
    simple == wanted || qualified == wanted || qualified.ends_with(&format!(".{}", wanted))
}

pub struct SymbolResolver {
    compiler: Arc<dyn CompilerService>,
}

impl SymbolResolver {
    pub fn new(compiler: Arc<dyn CompilerService>) -> Self {
        Self { compiler }
    }

    pub fn resolve(&self, query: &SymbolQuery) -> Result<Resolution> {
        let mut found = match &query.file_path {
            Some(path) => self.search_file(query, path)?,
            None => self.search_solution(query)?,
        };

        // Candidates are identified by display string
        let mut seen = HashSet::new();
        found.retain(|s| seen.insert(s.display_name.clone()));
        debug!("Resolved '{}' to {} candidate(s)", query.name, found.len());

        Ok(match found.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Found(found.remove(0)),
            _ => {
                if query.containing_type.is_none() {
                    let types: Vec<&Symbol> = found.iter().filter(|s| s.is_type()).collect();
                    if types.len() == 1 {
                        return Ok(Resolution::Found(types[0].clone()));
                    }
                }
                Resolution::Ambiguous(found)
            }
        })
    }

    /// Found symbols only: ambiguity becomes an error, absence becomes `None`
    pub fn resolve_required(&self, query: &SymbolQuery) -> Result<Option<Symbol>> {
        match self.resolve(query)? {
            Resolution::Found(symbol) => Ok(Some(symbol)),
            Resolution::NotFound => Ok(None),
            Resolution::Ambiguous(symbols) => Err(RefactorError::Ambiguous {
                name: query.name.clone(),
                candidates: candidates(&symbols),
            }
            .into()),
        }
    }

    fn search_file(&self, query: &SymbolQuery, path: &std::path::Path) -> Result<Vec<Symbol>> {
        let declared = match self.compiler.declarations_in_file(path) {
            Ok(declared) => declared,
            Err(e) => {
                debug!("No declarations for {}: {:#}", path.display(), e);
                return Ok(Vec::new());
            }
        };

        Ok(declared
            .into_iter()
            .filter(|s| matches_name(s, &query.name))
            .filter(|s| match query.containing_type.as_deref() {
                None => true,
                Some(wanted) if s.is_type() => matches_type_name(&s.qualified_name, &s.name, wanted),
                Some(wanted) => s
                    .containing_type
                    .as_deref()
                    .map(|owner| {
                        let simple = owner.rsplit('.').next().unwrap_or(owner);
                        matches_type_name(owner, simple, wanted)
                    })
                    .unwrap_or(false),
            })
            .collect())
    }

    fn search_solution(&self, query: &SymbolQuery) -> Result<Vec<Symbol>> {
        let types = self.compiler.all_types()?;
        let mut found = Vec::new();

        match query.containing_type.as_deref() {
            Some(wanted) => {
                for t in types
                    .iter()
                    .filter(|t| matches_type_name(&t.qualified_name, &t.name, wanted))
                {
                    found.extend(
                        self.compiler
                            .members(t)?
                            .into_iter()
                            .filter(|m| m.name == query.name),
                    );
                }
            }
            None => {
                found.extend(types.iter().filter(|t| matches_name(t, &query.name)).cloned());
                for t in &types {
                    found.extend(
                        self.compiler
                            .members(t)?
                            .into_iter()
                            .filter(|m| matches_name(m, &query.name)),
                    );
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::csharp::CSharpCompiler;
    use crate::compiler::SymbolKind;
    use crate::config::Config;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn resolver(files: &[(&str, &str)]) -> (TempDir, SymbolResolver) {
        let dir = tempdir().unwrap();
        for (name, text) in files {
            fs::write(dir.path().join(name), text).unwrap();
        }
        let compiler = CSharpCompiler::new(dir.path(), Arc::new(Config::default()));
        (dir, SymbolResolver::new(Arc::new(compiler)))
    }

    const SHOP: &str = r#"namespace Retail
{
    public class Order { public decimal Total { get; set; } }
    public class Shop
    {
        public Order Order { get; set; }
        public void Close() { }
    }
}
"#;

    #[test]
    fn test_type_preferred_over_member() {
        let (_dir, resolver) = resolver(&[("Shop.cs", SHOP)]);
        match resolver.resolve(&SymbolQuery::named("Order")).unwrap() {
            Resolution::Found(symbol) => {
                assert!(symbol.is_type());
                assert_eq!(symbol.display_name, "Retail.Order");
            }
            other => panic!("expected the type, got {:?}", other),
        }
    }

    #[test]
    fn test_containing_type_selects_member() {
        let (_dir, resolver) = resolver(&[("Shop.cs", SHOP)]);
        let symbol = resolver
            .resolve_required(&SymbolQuery::named("Order").in_type("Shop"))
            .unwrap()
            .unwrap();
        assert_eq!(symbol.kind, SymbolKind::Property);
        assert_eq!(symbol.display_name, "Retail.Shop.Order");
    }

    #[test]
    fn test_ambiguous_types_raise() {
        let (_dir, resolver) = resolver(&[
            ("A.cs", "namespace Billing { public class Invoice { } }"),
            ("B.cs", "namespace Legacy { public class Invoice { } }"),
        ]);
        let err = resolver
            .resolve_required(&SymbolQuery::named("Invoice"))
            .unwrap_err();
        match err.downcast_ref::<RefactorError>() {
            Some(RefactorError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.iter().all(|c| c.kind == "class" && c.file.is_some()));
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }

        let qualified = resolver
            .resolve_required(&SymbolQuery::named("Legacy.Invoice"))
            .unwrap()
            .unwrap();
        assert_eq!(qualified.qualified_name, "Legacy.Invoice");
    }

    #[test]
    fn test_file_path_restricts_search() {
        let (dir, resolver) = resolver(&[
            ("A.cs", "namespace Billing { public class Invoice { } }"),
            ("B.cs", "namespace Legacy { public class Invoice { } }"),
        ]);
        let symbol = resolver
            .resolve_required(&SymbolQuery::named("Invoice").in_file(dir.path().join("B.cs")))
            .unwrap()
            .unwrap();
        assert_eq!(symbol.qualified_name, "Legacy.Invoice");
    }

    #[test]
    fn test_partial_declarations_are_one_candidate() {
        let (dir, resolver) = resolver(&[
            ("Cart.cs", "namespace Retail { public partial class Cart { } }"),
            ("Cart.Lines.cs", "namespace Retail { public partial class Cart { public int Count { get; } } }"),
        ]);
        match resolver.resolve(&SymbolQuery::named("Cart")).unwrap() {
            Resolution::Found(symbol) => assert_eq!(symbol.display_name, "Retail.Cart"),
            other => panic!("expected one symbol, got {:?}", other),
        }
        let in_file = SymbolQuery::named("Cart").in_file(dir.path().join("Cart.Lines.cs"));
        assert!(matches!(resolver.resolve(&in_file).unwrap(), Resolution::Found(_)));
    }

    #[test]
    fn test_not_found() {
        let (_dir, resolver) = resolver(&[("Shop.cs", SHOP)]);
        assert!(resolver
            .resolve_required(&SymbolQuery::named("Missing"))
            .unwrap()
            .is_none());
        assert!(matches!(
            resolver.resolve(&SymbolQuery::named("Close").in_type("Order")).unwrap(),
            Resolution::NotFound
        ));
    }
}
