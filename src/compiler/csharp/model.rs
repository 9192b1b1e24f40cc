// Solution-wide declaration tables for the C# adapter

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};
use tree_sitter::{Node, Tree};

use super::syntax::{self, bare_type_name, type_arity, RawMember, RawType};
use crate::compiler::{
    path_key, FileContext, ProjectId, Solution, SourceLocation, Symbol, SymbolInfo, SymbolKind,
    TypeKind,
};

/// A parsed document kept alive for the lifetime of the model
pub struct SourceDocument {
    pub path: PathBuf,
    pub project: ProjectId,
    pub source: String,
    pub tree: Tree,
    pub context: FileContext,
    pub imports: Vec<String>,
    pub aliases: HashMap<String, String>,
}

/// A resolved type: declared in the solution, or known only by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Source(usize),
    External(String),
}

pub struct TypeEntry {
    pub qualified_name: String,
    pub kind: TypeKind,
    pub arity: usize,
    /// One symbol per (partial) declaration; all compare equal
    pub declarations: Vec<Symbol>,
    pub docs: Vec<usize>,
    pub outer: Option<usize>,
    pub base_type: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub members: Vec<usize>,
}

pub struct MemberEntry {
    pub symbol: Symbol,
    pub owner: usize,
    pub doc: usize,
}

const PREDEFINED: &[&str] = &[
    "bool", "byte", "sbyte", "char", "decimal", "double", "float", "int", "uint", "nint",
    "nuint", "long", "ulong", "short", "ushort", "object", "string", "dynamic",
];

pub fn looks_like_interface(name: &str) -> bool {
    let simple = name.rsplit('.').next().unwrap_or(name);
    let mut chars = simple.chars();
    chars.next() == Some('I') && chars.next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
}

/// The heuristic semantic model of a whole solution
pub struct SemanticModel {
    pub solution: Arc<Solution>,
    pub documents: Vec<SourceDocument>,
    pub types: Vec<TypeEntry>,
    pub members: Vec<MemberEntry>,
    /// Projects with at least one unreadable document
    pub unavailable: HashSet<ProjectId>,
    by_qualified: HashMap<String, Vec<usize>>,
    by_simple: HashMap<String, Vec<usize>>,
    type_by_span: HashMap<(usize, usize), usize>,
    doc_by_path: HashMap<String, usize>,
    project_imports: HashMap<ProjectId, Vec<String>>,
}

impl SemanticModel {
    /// Read, parse and index every document of the solution
    pub fn build(solution: Arc<Solution>) -> Result<Self> {
        let mut model = SemanticModel {
            solution: solution.clone(),
            documents: Vec::new(),
            types: Vec::new(),
            members: Vec::new(),
            unavailable: HashSet::new(),
            by_qualified: HashMap::new(),
            by_simple: HashMap::new(),
            type_by_span: HashMap::new(),
            doc_by_path: HashMap::new(),
            project_imports: HashMap::new(),
        };

        let mut raw_files = Vec::new();
        for project in &solution.projects {
            for document in &project.documents {
                let source = match std::fs::read_to_string(&document.path) {
                    Ok(source) => source,
                    Err(e) => {
                        warn!("Cannot read {}: {}", document.path.display(), e);
                        model.unavailable.insert(project.id);
                        continue;
                    }
                };
                let tree = syntax::parse(&source)?;
                let raw = syntax::extract(&source, &tree);

                model
                    .project_imports
                    .entry(project.id)
                    .or_default()
                    .extend(raw.global_imports.iter().cloned());

                let index = model.documents.len();
                model.doc_by_path.insert(path_key(&document.path), index);
                model.documents.push(SourceDocument {
                    path: document.path.clone(),
                    project: project.id,
                    source,
                    tree,
                    context: raw.context.clone(),
                    imports: raw.imports.clone(),
                    aliases: raw.aliases.iter().cloned().collect(),
                });
                raw_files.push((index, raw));
            }
        }

        for (doc, raw) in &raw_files {
            for raw_type in &raw.types {
                model.register_type(*doc, raw_type);
            }
        }
        for (doc, raw) in &raw_files {
            for raw_type in &raw.types {
                let Some(&owner) = model.type_by_span.get(&(*doc, raw_type.syntax.span.start)) else {
                    continue;
                };
                for member in &raw_type.members {
                    model.register_member(*doc, owner, member);
                }
            }
        }
        for index in 0..model.types.len() {
            model.resolve_bases(index);
        }

        debug!(
            "Semantic model: {} documents, {} types, {} members",
            model.documents.len(),
            model.types.len(),
            model.members.len()
        );
        Ok(model)
    }

    fn register_type(&mut self, doc: usize, raw: &RawType) {
        let qualified = raw.qualified_name();
        let arity = raw
            .type_parameters
            .as_deref()
            .map(type_arity)
            .unwrap_or(0);
        let outer = if raw.outer.is_empty() {
            None
        } else {
            let mut parts: Vec<&str> = raw.namespace.iter().map(String::as_str).collect();
            parts.extend(raw.outer.iter().map(String::as_str));
            Some(parts.join("."))
        };

        let keyword = raw.kind.keyword();
        let signature = syntax::squash(&format!(
            "{} {} {}{}",
            raw.modifiers.join(" "),
            keyword,
            raw.name,
            raw.type_parameters.as_deref().unwrap_or("")
        ));
        let path = self.documents[doc].path.clone();
        let symbol = Symbol::new(SymbolInfo {
            kind: SymbolKind::Type(raw.kind),
            name: raw.name.clone(),
            display_name: format!(
                "{}{}",
                qualified,
                raw.type_parameters.as_deref().unwrap_or("")
            ),
            qualified_name: qualified.clone(),
            namespace: raw.namespace.clone(),
            containing_type: outer.clone(),
            signature: Some(signature),
            modifiers: raw.modifiers.clone(),
            return_type: None,
            parameters: Vec::new(),
            type_parameters: raw.type_parameters.clone(),
            accessors: None,
            base_types: raw.base_types.clone(),
            is_implicit: false,
            location: Some(SourceLocation {
                file: path,
                line: raw.line,
                column: raw.column,
            }),
            syntax: Some(raw.syntax.clone()),
        });

        let existing = self
            .by_qualified
            .get(&qualified)
            .and_then(|ids| ids.iter().copied().find(|&i| self.types[i].arity == arity));
        let index = match existing {
            Some(index) => {
                let entry = &mut self.types[index];
                entry.declarations.push(symbol);
                entry.docs.push(doc);
                index
            }
            None => {
                let index = self.types.len();
                let outer_index = outer
                    .as_deref()
                    .and_then(|q| self.by_qualified.get(q))
                    .and_then(|ids| ids.first().copied());
                self.types.push(TypeEntry {
                    qualified_name: qualified.clone(),
                    kind: raw.kind,
                    arity,
                    declarations: vec![symbol],
                    docs: vec![doc],
                    outer: outer_index,
                    base_type: None,
                    interfaces: Vec::new(),
                    members: Vec::new(),
                });
                self.by_qualified.entry(qualified).or_default().push(index);
                self.by_simple.entry(raw.name.clone()).or_default().push(index);
                index
            }
        };
        self.type_by_span.insert((doc, raw.syntax.span.start), index);
    }

    fn register_member(&mut self, doc: usize, owner: usize, raw: &RawMember) {
        let owner_entry = &self.types[owner];
        let owner_name = owner_entry.qualified_name.clone();
        let namespace = owner_entry.declarations[0].namespace.clone();
        let parameter_types = raw
            .parameters
            .iter()
            .map(|p| p.type_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let display_name = match raw.kind {
            SymbolKind::Method => format!(
                "{}.{}{}({})",
                owner_name,
                raw.name,
                raw.type_parameters.as_deref().unwrap_or(""),
                parameter_types
            ),
            SymbolKind::Constructor => format!("{}.{}({})", owner_name, raw.name, parameter_types),
            _ => format!("{}.{}", owner_name, raw.name),
        };

        let symbol = Symbol::new(SymbolInfo {
            kind: raw.kind,
            name: raw.name.clone(),
            display_name,
            qualified_name: format!("{}.{}", owner_name, raw.name),
            namespace,
            containing_type: Some(owner_name),
            signature: Some(raw.signature.clone()),
            modifiers: raw.modifiers.clone(),
            return_type: raw.return_type.clone(),
            parameters: raw.parameters.clone(),
            type_parameters: raw.type_parameters.clone(),
            accessors: raw.accessors,
            base_types: Vec::new(),
            is_implicit: raw.is_implicit,
            location: Some(SourceLocation {
                file: self.documents[doc].path.clone(),
                line: raw.line,
                column: raw.column,
            }),
            syntax: Some(raw.syntax.clone()),
        });

        let index = self.members.len();
        self.members.push(MemberEntry { symbol, owner, doc });
        self.types[owner].members.push(index);
    }

    fn resolve_bases(&mut self, index: usize) {
        let entry = &self.types[index];
        let kind = entry.kind;
        let doc = entry.docs[0];
        let outer = entry.outer;
        let mut written: Vec<String> = Vec::new();
        for declaration in &entry.declarations {
            for base in &declaration.base_types {
                if !written.contains(base) {
                    written.push(base.clone());
                }
            }
        }

        let resolved: Vec<TypeRef> = written
            .iter()
            .filter_map(|base| self.lookup_type(base, doc, outer))
            .collect();

        let (base_type, interfaces) = match kind {
            TypeKind::Class | TypeKind::Record => {
                let mut iter = resolved.into_iter();
                match iter.next() {
                    Some(first) if self.is_class_like(&first) => (Some(first), iter.collect()),
                    Some(first) => {
                        let mut all = vec![first];
                        all.extend(iter);
                        (None, all)
                    }
                    None => (None, Vec::new()),
                }
            }
            TypeKind::Interface | TypeKind::Struct | TypeKind::RecordStruct => (None, resolved),
            // `enum E : byte` names the underlying type, not a base
            TypeKind::Enum => (None, Vec::new()),
        };

        let entry = &mut self.types[index];
        entry.base_type = base_type;
        entry.interfaces = interfaces;
    }

    fn is_class_like(&self, reference: &TypeRef) -> bool {
        match reference {
            TypeRef::Source(index) => {
                matches!(self.types[*index].kind, TypeKind::Class | TypeKind::Record)
            }
            TypeRef::External(name) => !looks_like_interface(name),
        }
    }

    pub fn document_index(&self, path: &Path) -> Option<usize> {
        self.doc_by_path.get(&path_key(path)).copied()
    }

    /// Type declared at `start` byte of a document
    pub fn type_at(&self, doc: usize, start: usize) -> Option<usize> {
        self.type_by_span.get(&(doc, start)).copied()
    }

    fn find_qualified(&self, qualified: &str, arity: usize) -> Option<usize> {
        let ids = self.by_qualified.get(qualified)?;
        ids.iter()
            .copied()
            .find(|&i| self.types[i].arity == arity)
            .or_else(|| ids.first().copied())
    }

    /// Namespace in effect for code inside `enclosing` (or at file level)
    fn namespace_for(&self, doc: usize, enclosing: Option<usize>) -> Option<String> {
        match enclosing {
            Some(t) => self.types[t].declarations[0].namespace.clone(),
            None => self.documents[doc].context.namespace.clone(),
        }
    }

    /// Resolve a written type to a type declared in the solution
    pub fn lookup_source_type(&self, written: &str, doc: usize, enclosing: Option<usize>) -> Option<usize> {
        let bare = bare_type_name(written);
        if bare.is_empty() {
            return None;
        }
        let arity = type_arity(written);
        let document = &self.documents[doc];

        if let Some(target) = document.aliases.get(&bare) {
            return self.find_qualified(&bare_type_name(target), type_arity(target));
        }

        let mut scope = enclosing;
        while let Some(t) = scope {
            let candidate = format!("{}.{}", self.types[t].qualified_name, bare);
            if let Some(found) = self.find_qualified(&candidate, arity) {
                return Some(found);
            }
            scope = self.types[t].outer;
        }

        if let Some(namespace) = self.namespace_for(doc, enclosing) {
            let mut prefix = namespace.as_str();
            loop {
                if let Some(found) = self.find_qualified(&format!("{}.{}", prefix, bare), arity) {
                    return Some(found);
                }
                match prefix.rfind('.') {
                    Some(i) => prefix = &prefix[..i],
                    None => break,
                }
            }
        }

        if let Some(found) = self.find_qualified(&bare, arity) {
            return Some(found);
        }

        let project_imports = self
            .project_imports
            .get(&document.project)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for import in document.imports.iter().chain(project_imports) {
            if let Some(found) = self.find_qualified(&format!("{}.{}", import, bare), arity) {
                return Some(found);
            }
        }

        // Last resort: a unique simple name anywhere in the solution
        let simple = bare.rsplit('.').next().unwrap_or(&bare);
        let candidates: Vec<usize> = self
            .by_simple
            .get(simple)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|&i| self.types[i].arity == arity)
                    .filter(|&i| !bare.contains('.') || self.types[i].qualified_name.ends_with(&bare))
                    .collect()
            })
            .unwrap_or_default();
        match candidates.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Resolve a written type; names that are not declared become external types
    pub fn lookup_type(&self, written: &str, doc: usize, enclosing: Option<usize>) -> Option<TypeRef> {
        let bare = bare_type_name(written);
        if bare.is_empty() || matches!(bare.as_str(), "void" | "var") {
            return None;
        }
        if PREDEFINED.contains(&bare.as_str()) {
            return Some(TypeRef::External(bare));
        }
        Some(match self.lookup_source_type(written, doc, enclosing) {
            Some(index) => TypeRef::Source(index),
            None => TypeRef::External(bare),
        })
    }

    pub fn type_symbol(&self, index: usize) -> &Symbol {
        &self.types[index].declarations[0]
    }

    pub fn ref_symbol(&self, reference: &TypeRef) -> Symbol {
        match reference {
            TypeRef::Source(index) => self.type_symbol(*index).clone(),
            TypeRef::External(name) => {
                let kind = if looks_like_interface(name) {
                    TypeKind::Interface
                } else {
                    TypeKind::Class
                };
                Symbol::external(SymbolKind::Type(kind), name)
            }
        }
    }

    /// Members named `name` visible on a type: its own, else the nearest base's
    pub fn find_members(&self, type_index: usize, name: &str) -> Vec<usize> {
        let mut visited = HashSet::new();
        let mut queue = vec![type_index];
        while !queue.is_empty() {
            let mut next = Vec::new();
            let mut found = Vec::new();
            for t in queue {
                if !visited.insert(t) {
                    continue;
                }
                let entry = &self.types[t];
                found.extend(
                    entry
                        .members
                        .iter()
                        .copied()
                        .filter(|&m| self.members[m].symbol.name == name)
                        .filter(|&m| self.members[m].symbol.kind != SymbolKind::Constructor),
                );
                for base in entry.base_type.iter().chain(entry.interfaces.iter()) {
                    if let TypeRef::Source(b) = base {
                        next.push(*b);
                    }
                }
            }
            if !found.is_empty() {
                return found;
            }
            queue = next;
        }
        Vec::new()
    }

    /// Declared type of a field, property or event, or a method's return type
    pub fn member_type(&self, member: usize) -> Option<TypeRef> {
        let entry = &self.members[member];
        let written = entry.symbol.return_type.as_deref()?;
        self.lookup_type(written, entry.doc, Some(entry.owner))
    }

    pub fn type_index_of(&self, symbol: &Symbol) -> Option<usize> {
        if !symbol.is_type() {
            return None;
        }
        self.by_qualified
            .get(&symbol.qualified_name)?
            .iter()
            .copied()
            .find(|&i| self.type_symbol(i) == symbol)
    }

    pub fn member_index_of(&self, symbol: &Symbol) -> Option<usize> {
        let owner = self
            .by_qualified
            .get(symbol.containing_type.as_deref()?)?
            .iter()
            .copied()
            .find(|&t| {
                self.types[t]
                    .members
                    .iter()
                    .any(|&m| self.members[m].symbol == *symbol)
            })?;
        self.types[owner]
            .members
            .iter()
            .copied()
            .find(|&m| self.members[m].symbol == *symbol)
    }

    /// The smallest node covering exactly `span`
    pub fn node_at<'m>(&'m self, doc: usize, span: &Range<usize>) -> Option<Node<'m>> {
        let root = self.documents[doc].tree.root_node();
        let mut node = root.descendant_for_byte_range(span.start, span.end)?;
        while node.byte_range() != *span {
            node = node.parent()?;
            if node.start_byte() < span.start || node.end_byte() > span.end {
                return None;
            }
        }
        Some(node)
    }

    pub fn all_type_symbols(&self) -> Vec<Symbol> {
        self.types.iter().map(|t| t.declarations[0].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Document, Project};
    use tempfile::tempdir;

    fn model_for(files: &[(&str, &str)]) -> (tempfile::TempDir, SemanticModel) {
        let dir = tempdir().unwrap();
        let mut documents = Vec::new();
        for (name, text) in files {
            let path = dir.path().join(name);
            std::fs::write(&path, text).unwrap();
            documents.push(Document {
                path,
                project: ProjectId(0),
            });
        }
        let solution = Solution {
            name: "Test".to_string(),
            path: dir.path().to_path_buf(),
            root: dir.path().to_path_buf(),
            projects: vec![Project {
                id: ProjectId(0),
                name: "Test".to_string(),
                file_path: dir.path().join("Test.csproj"),
                directory: dir.path().to_path_buf(),
                root_namespace: "Test".to_string(),
                documents,
                project_references: Vec::new(),
            }],
        };
        let model = SemanticModel::build(Arc::new(solution)).unwrap();
        (dir, model)
    }

    #[test]
    fn test_partial_declarations_merge() {
        let (_dir, model) = model_for(&[
            ("A.cs", "namespace Shop { public partial class Cart { public void Add() {} } }"),
            ("B.cs", "namespace Shop { public partial class Cart { public void Clear() {} } }"),
        ]);
        assert_eq!(model.types.len(), 1);
        assert_eq!(model.types[0].declarations.len(), 2);
        assert_eq!(model.types[0].members.len(), 2);
    }

    #[test]
    fn test_base_and_interfaces_resolved() {
        let (_dir, model) = model_for(&[(
            "Shapes.cs",
            "using System;\nnamespace Geo {\n  public interface IShape {}\n  public abstract class Shape : IShape {}\n  public class Circle : Shape, IShape, IDisposable { public void Dispose() {} }\n}\n",
        )]);
        let circle = model
            .types
            .iter()
            .find(|t| t.qualified_name == "Geo.Circle")
            .unwrap();
        assert!(matches!(circle.base_type, Some(TypeRef::Source(_))));
        assert_eq!(circle.interfaces.len(), 2);
        assert!(circle
            .interfaces
            .contains(&TypeRef::External("IDisposable".to_string())));

        let shape = model
            .types
            .iter()
            .find(|t| t.qualified_name == "Geo.Shape")
            .unwrap();
        assert!(shape.base_type.is_none());
        assert_eq!(shape.interfaces.len(), 1);
    }

    #[test]
    fn test_lookup_prefers_nested_then_namespace() {
        let (_dir, model) = model_for(&[(
            "Types.cs",
            "namespace A { public class Item {} public class Box { public class Item {} } }\nnamespace B { public class Item {} }\n",
        )]);
        let box_index = model
            .types
            .iter()
            .position(|t| t.qualified_name == "A.Box")
            .unwrap();
        let nested = model.lookup_source_type("Item", 0, Some(box_index)).unwrap();
        assert_eq!(model.types[nested].qualified_name, "A.Box.Item");

        let top = model.lookup_source_type("B.Item", 0, None).unwrap();
        assert_eq!(model.types[top].qualified_name, "B.Item");

        assert_eq!(
            model.lookup_type("List<int>", 0, None),
            Some(TypeRef::External("List".to_string()))
        );
        assert_eq!(model.lookup_type("void", 0, None), None);
    }

    #[test]
    fn test_find_members_walks_base_chain() {
        let (_dir, model) = model_for(&[(
            "Base.cs",
            "namespace N { public class Base { public void Run() {} } public class Derived : Base { } }",
        )]);
        let derived = model
            .types
            .iter()
            .position(|t| t.qualified_name == "N.Derived")
            .unwrap();
        let found = model.find_members(derived, "Run");
        assert_eq!(found.len(), 1);
        assert_eq!(model.members[found[0]].symbol.display_name, "N.Base.Run()");
    }
}
