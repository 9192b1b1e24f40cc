// C# compiler service built on tree-sitter-c-sharp

pub mod loader;
pub mod model;
pub mod resolve;
pub mod syntax;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use tracing::{debug, info};

use self::model::{SemanticModel, TypeRef};
use self::resolve::DocumentResolver;
use crate::compiler::{
    CompiledView, CompilerService, Document, FileContext, MemberDeclaration, Project,
    ReferenceLocation, Solution, Symbol, SymbolKind, TypeDeclaration, WorkspaceState,
};
use crate::config::Config;

/// Modification time and length of a file or directory; `None` when missing
type Stamp = Option<(SystemTime, u64)>;

fn stamp(path: &Path) -> Stamp {
    let metadata = std::fs::metadata(path).ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

/// A built model and the disk state it was built from
struct CachedModel {
    model: Arc<SemanticModel>,
    stamps: Vec<(PathBuf, Stamp)>,
}

impl CachedModel {
    /// Stamps every document, its directory and the workspace root
    fn new(root: &Path, model: Arc<SemanticModel>) -> Self {
        let mut paths = BTreeSet::new();
        paths.insert(root.to_path_buf());
        for project in &model.solution.projects {
            paths.insert(project.file_path.clone());
            for document in &project.documents {
                paths.insert(document.path.clone());
                if let Some(parent) = document.path.parent() {
                    paths.insert(parent.to_path_buf());
                }
            }
        }
        let stamps = paths
            .into_iter()
            .map(|path| {
                let current = stamp(&path);
                (path, current)
            })
            .collect();
        Self { model, stamps }
    }

    fn changed_path(&self) -> Option<&Path> {
        self.stamps
            .iter()
            .find(|(path, recorded)| stamp(path) != *recorded)
            .map(|(path, _)| path.as_path())
    }
}

/// Heuristic semantic model of a C# workspace.
///
/// The model is cached and rebuilt when a document, a document directory or a
/// project file changes on disk, or after `invalidate`.
pub struct CSharpCompiler {
    root: PathBuf,
    config: Arc<Config>,
    model: RwLock<Option<CachedModel>>,
}

impl CSharpCompiler {
    pub fn new(root: impl Into<PathBuf>, config: Arc<Config>) -> Self {
        Self {
            root: root.into(),
            config,
            model: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model(&self) -> Result<Arc<SemanticModel>> {
        if let Some(cached) = self.model.read().as_ref() {
            if cached.changed_path().is_none() {
                return Ok(cached.model.clone());
            }
        }

        let mut slot = self.model.write();
        if let Some(cached) = slot.as_ref() {
            match cached.changed_path() {
                None => return Ok(cached.model.clone()),
                Some(path) => debug!("{} changed on disk; reloading", path.display()),
            }
        }
        info!("Loading C# workspace at {}", self.root.display());
        let solution = loader::load_solution(&self.root, &self.config)?;
        let model = Arc::new(SemanticModel::build(Arc::new(solution))?);
        *slot = Some(CachedModel::new(&self.root, model.clone()));
        Ok(model)
    }

    fn document_of(model: &SemanticModel, path: &Path) -> Result<usize> {
        model
            .document_index(path)
            .ok_or_else(|| anyhow!("{} is not part of the workspace", path.display()))
    }
}

impl CompilerService for CSharpCompiler {
    fn solution(&self) -> Result<Arc<Solution>> {
        Ok(self.model()?.solution.clone())
    }

    fn compiled_view(&self, project: &Project) -> Option<Arc<dyn CompiledView>> {
        let model = match self.model() {
            Ok(model) => model,
            Err(e) => {
                debug!("No semantic model for {}: {:#}", project.name, e);
                return None;
            }
        };
        if model.unavailable.contains(&project.id) {
            return None;
        }
        Some(Arc::new(CSharpView {
            model,
            project: project.clone(),
        }))
    }

    fn all_types(&self) -> Result<Vec<Symbol>> {
        Ok(self.model()?.all_type_symbols())
    }

    fn members(&self, type_symbol: &Symbol) -> Result<Vec<Symbol>> {
        let model = self.model()?;
        let Some(index) = model.type_index_of(type_symbol) else {
            return Ok(Vec::new());
        };
        Ok(model.types[index]
            .members
            .iter()
            .map(|&m| model.members[m].symbol.clone())
            .collect())
    }

    fn declarations_in_file(&self, path: &Path) -> Result<Vec<Symbol>> {
        let model = self.model()?;
        let doc = Self::document_of(&model, path)?;
        let mut found: Vec<Symbol> = Vec::new();
        for entry in &model.types {
            for (declaration, &d) in entry.declarations.iter().zip(&entry.docs) {
                if d == doc {
                    found.push(declaration.clone());
                }
            }
        }
        found.extend(
            model
                .members
                .iter()
                .filter(|m| m.doc == doc)
                .map(|m| m.symbol.clone()),
        );
        found.sort_by_key(|s| s.syntax.as_ref().map(|x| x.span.start).unwrap_or(0));
        Ok(found)
    }

    fn declarations_of(&self, symbol: &Symbol) -> Result<Vec<Symbol>> {
        Ok(resolve::declarations_of(&*self.model()?, symbol))
    }

    fn find_references(&self, symbol: &Symbol) -> Result<Vec<ReferenceLocation>> {
        Ok(resolve::find_references(&*self.model()?, symbol))
    }

    fn rename_across_workspace(&self, symbol: &Symbol, new_name: &str) -> Result<WorkspaceState> {
        Ok(resolve::rename(&*self.model()?, symbol, new_name))
    }

    fn workspace_state(&self) -> Result<WorkspaceState> {
        let model = self.model()?;
        let mut state = WorkspaceState::default();
        for document in &model.documents {
            state
                .documents
                .insert(document.path.clone(), document.source.clone());
        }
        Ok(state)
    }

    fn file_context(&self, path: &Path) -> Result<FileContext> {
        let model = self.model()?;
        let doc = Self::document_of(&model, path)?;
        Ok(model.documents[doc].context.clone())
    }

    fn invalidate(&self) {
        debug!("Invalidating cached C# semantic model");
        *self.model.write() = None;
    }
}

/// Compiled view over one project of a cached model
pub struct CSharpView {
    model: Arc<SemanticModel>,
    project: Project,
}

impl CSharpView {
    fn member_declaration(&self, doc: usize, member: usize) -> MemberDeclaration {
        let model = &self.model;
        let entry = &model.members[member];
        let symbol = entry.symbol.clone();
        let mut invocations = Vec::new();
        let mut created_types = Vec::new();

        let scans_body = matches!(symbol.kind, SymbolKind::Method | SymbolKind::Constructor);
        if let (true, Some(syntax)) = (scans_body, symbol.syntax.as_ref()) {
            if let Some(node) = model.node_at(doc, &syntax.span) {
                let mut resolver = DocumentResolver::new(model, doc);
                for inner in syntax::descendants(node) {
                    match inner.kind() {
                        "invocation_expression" => {
                            invocations.extend(resolver.resolve_invocation(inner));
                        }
                        "object_creation_expression" => {
                            created_types.extend(resolver.resolve_creation(inner));
                        }
                        _ => {}
                    }
                }
            }
        }

        let overridden = if symbol.has_modifier("override") {
            self.overridden_member(entry.owner, &symbol)
        } else {
            None
        };

        MemberDeclaration {
            symbol: Some(symbol),
            invocations,
            created_types,
            overridden,
        }
    }

    /// Nearest base-type member with the same name and arity
    fn overridden_member(&self, owner: usize, symbol: &Symbol) -> Option<Symbol> {
        let model = &self.model;
        let mut current = model.types[owner].base_type.clone();
        let mut guard = 0;
        while let Some(TypeRef::Source(base)) = current {
            guard += 1;
            if guard > model.types.len() {
                break;
            }
            let found = model.types[base].members.iter().find(|&&m| {
                let candidate = &model.members[m].symbol;
                candidate.name == symbol.name
                    && candidate.kind == symbol.kind
                    && candidate.parameters.len() == symbol.parameters.len()
            });
            if let Some(&m) = found {
                return Some(model.members[m].symbol.clone());
            }
            current = model.types[base].base_type.clone();
        }
        None
    }
}

impl CompiledView for CSharpView {
    fn project(&self) -> &Project {
        &self.project
    }

    fn type_declarations(&self, document: &Document) -> Vec<TypeDeclaration> {
        let model = &self.model;
        let Some(doc) = model.document_index(&document.path) else {
            return Vec::new();
        };

        let mut declarations = Vec::new();
        for entry in &model.types {
            for (position, (declaration, &d)) in entry.declarations.iter().zip(&entry.docs).enumerate() {
                if d != doc {
                    continue;
                }
                let Some(span) = declaration.syntax.as_ref().map(|s| s.span.clone()) else {
                    continue;
                };
                // Base types are reported once, on the first partial declaration
                let first = position == 0;
                let members = entry
                    .members
                    .iter()
                    .copied()
                    .filter(|&m| {
                        let member = &model.members[m];
                        member.doc == doc
                            && member
                                .symbol
                                .syntax
                                .as_ref()
                                .map(|s| span.start <= s.span.start && s.span.end <= span.end)
                                .unwrap_or(false)
                    })
                    .map(|m| self.member_declaration(doc, m))
                    .collect();

                declarations.push(TypeDeclaration {
                    kind: entry.kind,
                    symbol: Some(declaration.clone()),
                    base_type: entry
                        .base_type
                        .as_ref()
                        .filter(|_| first)
                        .map(|r| model.ref_symbol(r)),
                    interfaces: if first {
                        entry.interfaces.iter().map(|r| model.ref_symbol(r)).collect()
                    } else {
                        Vec::new()
                    },
                    members,
                });
            }
        }
        declarations.sort_by_key(|t| {
            t.symbol
                .as_ref()
                .and_then(|s| s.syntax.as_ref())
                .map(|s| s.span.start)
                .unwrap_or(0)
        });
        declarations
    }
}
