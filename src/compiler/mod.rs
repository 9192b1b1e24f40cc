// Compiler service boundary: solution model, symbols and adapter traits
//
// Everything above this module (graph builder, resolver, refactorings) only
// talks to `CompilerService` / `CompiledView`. The C# adapter lives in
// `csharp`; tests substitute their own implementations.

pub mod csharp;

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, Range};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

/// Index of a project inside its solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProjectId(pub usize);

/// A loaded solution: the root of every indexing run
#[derive(Debug, Clone)]
pub struct Solution {
    pub name: String,
    /// The `.sln` file, or the root directory when there is none
    pub path: PathBuf,
    pub root: PathBuf,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// The project file, or the project directory for implicit projects
    pub file_path: PathBuf,
    pub directory: PathBuf,
    pub root_namespace: String,
    pub documents: Vec<Document>,
    /// Absolute paths of referenced project files
    pub project_references: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub project: ProjectId,
}

impl Solution {
    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(id.0)
    }

    pub fn project_by_file(&self, file_path: &Path) -> Option<&Project> {
        let wanted = path_key(file_path);
        self.projects.iter().find(|p| path_key(&p.file_path) == wanted)
    }

    /// The project whose directory is the longest prefix of `dir`
    pub fn owning_project(&self, dir: &Path) -> Option<&Project> {
        let wanted = path_key(dir);
        self.projects
            .iter()
            .filter(|p| {
                let root = path_key(&p.directory);
                wanted == root || wanted.starts_with(&format!("{}/", root.trim_end_matches('/')))
            })
            .max_by_key(|p| path_key(&p.directory).len())
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.projects.iter().flat_map(|p| p.documents.iter())
    }
}

/// Case-insensitive, forward-slash form of a path used for comparisons
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_lowercase()
}

/// Type declaration kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
    Record,
    RecordStruct,
    Enum,
}

impl TypeKind {
    /// Declaration keyword(s) for this kind
    pub fn keyword(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Struct => "struct",
            TypeKind::Record => "record",
            TypeKind::RecordStruct => "record struct",
            TypeKind::Enum => "enum",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "class" => Some(TypeKind::Class),
            "interface" => Some(TypeKind::Interface),
            "struct" => Some(TypeKind::Struct),
            "record" | "record class" => Some(TypeKind::Record),
            "record struct" | "recordstruct" => Some(TypeKind::RecordStruct),
            "enum" => Some(TypeKind::Enum),
            _ => None,
        }
    }
}

/// Kinds of resolved symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Namespace,
    Type(TypeKind),
    Constructor,
    Method,
    Property,
    Field,
    Event,
    EnumMember,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Namespace => "namespace",
            SymbolKind::Type(kind) => kind.keyword(),
            SymbolKind::Constructor => "constructor",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Field => "field",
            SymbolKind::Event => "event",
            SymbolKind::EnumMember => "enum_member",
        }
    }

    pub fn is_type(&self) -> bool {
        matches!(self, SymbolKind::Type(_))
    }

    pub fn is_member(&self) -> bool {
        !matches!(self, SymbolKind::Namespace | SymbolKind::Type(_))
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
    pub default_value: Option<String>,
    /// Source text of the whole parameter, modifiers and attributes included
    pub text: String,
}

/// Accessor shape of a property
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Accessors {
    pub get: bool,
    pub set: bool,
    pub init: bool,
    /// Every accessor is bodiless (`{ get; set; }`)
    pub auto: bool,
    /// The setter carries its own, narrower accessibility
    pub restricted_set: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    /// 1-based
    pub line: usize,
    /// 1-based
    pub column: usize,
}

/// Byte ranges of a declaration inside its document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationSyntax {
    /// The whole declaration, attributes included
    pub span: Range<usize>,
    pub name_span: Range<usize>,
    pub parameter_list: Option<Range<usize>>,
    /// Braced body of a type or a member
    pub body: Option<Range<usize>>,
    pub base_list: Option<Range<usize>>,
    /// Insertion point for a base list when there is none
    pub header_end: usize,
    /// Leading whitespace of the declaration's first line
    pub indent: String,
    /// Declared inside another type
    pub nested: bool,
    /// For field-like declarations: this declarator and the sibling count
    pub declarator: Option<Range<usize>>,
    pub declarator_count: usize,
}

/// Everything the adapter knows about one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub kind: SymbolKind,
    pub name: String,
    /// Fully-qualified display string; the identity of the symbol
    pub display_name: String,
    /// Dotted name without parameter or type-parameter lists
    pub qualified_name: String,
    pub namespace: Option<String>,
    /// Qualified name of the containing type
    pub containing_type: Option<String>,
    pub signature: Option<String>,
    pub modifiers: Vec<String>,
    /// Return type for methods, declared type for properties/fields/events
    pub return_type: Option<String>,
    pub parameters: Vec<Parameter>,
    pub type_parameters: Option<String>,
    pub accessors: Option<Accessors>,
    /// Raw base-list entries of a type declaration
    pub base_types: Vec<String>,
    /// Synthesized by the compiler rather than written in source
    pub is_implicit: bool,
    pub location: Option<SourceLocation>,
    pub syntax: Option<DeclarationSyntax>,
}

/// Cheaply clonable handle to a resolved symbol.
///
/// Two handles denote the same symbol when both are types (or both are not)
/// and their display names match; partial declarations therefore compare equal.
#[derive(Debug, Clone)]
pub struct Symbol(Arc<SymbolInfo>);

impl Symbol {
    pub fn new(info: SymbolInfo) -> Self {
        Self(Arc::new(info))
    }

    /// A symbol known only by name (library or otherwise unindexed code)
    pub fn external(kind: SymbolKind, qualified_name: &str) -> Self {
        let name = qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(qualified_name)
            .to_string();
        let (namespace, containing_type) = match qualified_name.rsplit_once('.') {
            Some((prefix, _)) if kind.is_member() => (None, Some(prefix.to_string())),
            Some((prefix, _)) => (Some(prefix.to_string()), None),
            None => (None, None),
        };
        Self::new(SymbolInfo {
            kind,
            name,
            display_name: qualified_name.to_string(),
            qualified_name: qualified_name.to_string(),
            namespace,
            containing_type,
            signature: None,
            modifiers: Vec::new(),
            return_type: None,
            parameters: Vec::new(),
            type_parameters: None,
            accessors: None,
            base_types: Vec::new(),
            is_implicit: false,
            location: None,
            syntax: None,
        })
    }

    pub fn info(&self) -> &SymbolInfo {
        &self.0
    }

    pub fn is_type(&self) -> bool {
        self.kind.is_type()
    }

    pub fn type_kind(&self) -> Option<TypeKind> {
        match self.kind {
            SymbolKind::Type(kind) => Some(kind),
            _ => None,
        }
    }

    /// Declared outside the loaded solution
    pub fn is_external(&self) -> bool {
        self.location.is_none()
    }

    pub fn file(&self) -> Option<&Path> {
        self.location.as_ref().map(|l| l.file.as_path())
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    pub fn is_static(&self) -> bool {
        self.has_modifier("static") || self.has_modifier("const")
    }

    /// `System.Object` and its keyword alias
    pub fn is_universal_root(&self) -> bool {
        matches!(
            self.qualified_name.as_str(),
            "object" | "Object" | "System.Object"
        )
    }
}

impl Deref for Symbol {
    type Target = SymbolInfo;

    fn deref(&self) -> &SymbolInfo {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.is_type() == other.is_type() && self.display_name == other.display_name
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_type().hash(state);
        self.display_name.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.display_name)
    }
}

/// One place where a symbol is referenced (declarations excluded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceLocation {
    pub file: PathBuf,
    #[serde(skip)]
    pub span: Range<usize>,
    /// 1-based
    pub line: usize,
    /// 1-based
    pub column: usize,
    pub line_text: String,
    /// Argument list of the invocation or object creation this reference calls
    #[serde(skip)]
    pub call_arguments: Option<Range<usize>>,
}

/// Text of every document in the workspace at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceState {
    pub documents: BTreeMap<PathBuf, String>,
}

impl WorkspaceState {
    /// Documents whose text differs in `next`, as (path, before, after)
    pub fn changed_documents(&self, next: &WorkspaceState) -> Vec<(PathBuf, String, String)> {
        next.documents
            .iter()
            .filter_map(|(path, after)| {
                let before = self.documents.get(path)?;
                (before != after).then(|| (path.clone(), before.clone(), after.clone()))
            })
            .collect()
    }
}

/// Using directives and namespace layout of one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileContext {
    /// Full directive text, e.g. `using System.Linq;`
    pub usings: Vec<String>,
    pub namespace: Option<String>,
    pub file_scoped_namespace: bool,
    /// Top-level (non-nested) type declarations in the file
    pub type_count: usize,
}

/// A type declaration as seen through a compiled view
#[derive(Debug, Clone)]
pub struct TypeDeclaration {
    pub kind: TypeKind,
    pub symbol: Option<Symbol>,
    pub base_type: Option<Symbol>,
    pub interfaces: Vec<Symbol>,
    pub members: Vec<MemberDeclaration>,
}

/// A member declaration with the facts the graph builder needs
#[derive(Debug, Clone)]
pub struct MemberDeclaration {
    pub symbol: Option<Symbol>,
    /// Resolved invocation targets in body order, duplicates included
    pub invocations: Vec<Symbol>,
    /// Resolved object-creation types in body order, duplicates included
    pub created_types: Vec<Symbol>,
    pub overridden: Option<Symbol>,
}

/// Semantic view over one project's compilation
pub trait CompiledView: Send + Sync {
    fn project(&self) -> &Project;

    /// Type declarations (classes, interfaces, structs, records, enums) of a document
    fn type_declarations(&self, document: &Document) -> Vec<TypeDeclaration>;
}

/// The compiler integration consumed by indexing and refactoring
pub trait CompilerService: Send + Sync {
    fn solution(&self) -> anyhow::Result<Arc<Solution>>;

    /// `None` when the project cannot be compiled
    fn compiled_view(&self, project: &Project) -> Option<Arc<dyn CompiledView>>;

    /// Every named type declared in the solution, one symbol per type
    fn all_types(&self) -> anyhow::Result<Vec<Symbol>>;

    /// Members declared by a type across all its partial declarations
    fn members(&self, type_symbol: &Symbol) -> anyhow::Result<Vec<Symbol>>;

    /// Type and member declarations inside one file
    fn declarations_in_file(&self, path: &Path) -> anyhow::Result<Vec<Symbol>>;

    /// Every source declaration of a symbol (several for partial types)
    fn declarations_of(&self, symbol: &Symbol) -> anyhow::Result<Vec<Symbol>>;

    fn find_references(&self, symbol: &Symbol) -> anyhow::Result<Vec<ReferenceLocation>>;

    /// New workspace state with the symbol and all its references renamed
    fn rename_across_workspace(
        &self,
        symbol: &Symbol,
        new_name: &str,
    ) -> anyhow::Result<WorkspaceState>;

    fn workspace_state(&self) -> anyhow::Result<WorkspaceState>;

    fn file_context(&self, path: &Path) -> anyhow::Result<FileContext>;

    /// Drop cached compiled views so the next call sees current sources
    fn invalidate(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: usize, dir: &str) -> Project {
        Project {
            id: ProjectId(id),
            name: format!("P{}", id),
            file_path: PathBuf::from(format!("{}/P{}.csproj", dir, id)),
            directory: PathBuf::from(dir),
            root_namespace: format!("P{}", id),
            documents: Vec::new(),
            project_references: Vec::new(),
        }
    }

    #[test]
    fn test_owning_project_prefers_longest_prefix() {
        let solution = Solution {
            name: "S".to_string(),
            path: PathBuf::from("/repo"),
            root: PathBuf::from("/repo"),
            projects: vec![project(0, "/repo/src"), project(1, "/repo/src/App")],
        };

        let owner = solution.owning_project(Path::new("/repo/src/App/Models")).unwrap();
        assert_eq!(owner.id, ProjectId(1));

        let owner = solution.owning_project(Path::new("/repo/src/Lib")).unwrap();
        assert_eq!(owner.id, ProjectId(0));

        assert!(solution.owning_project(Path::new("/repo/src/Application")).map(|p| p.id) == Some(ProjectId(0)));
        assert!(solution.owning_project(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn test_symbol_identity_by_display_name() {
        let a = Symbol::external(SymbolKind::Method, "System.Console.WriteLine");
        let b = Symbol::external(SymbolKind::Method, "System.Console.WriteLine");
        let c = Symbol::external(SymbolKind::Type(TypeKind::Class), "System.Console.WriteLine");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.name, "WriteLine");
        assert_eq!(a.containing_type.as_deref(), Some("System.Console"));
        assert!(a.is_external());
    }

    #[test]
    fn test_universal_root() {
        assert!(Symbol::external(SymbolKind::Type(TypeKind::Class), "System.Object").is_universal_root());
        assert!(!Symbol::external(SymbolKind::Type(TypeKind::Class), "System.Exception").is_universal_root());
    }

    #[test]
    fn test_type_kind_keywords() {
        assert_eq!(TypeKind::from_keyword("record_struct"), Some(TypeKind::RecordStruct));
        assert_eq!(TypeKind::from_keyword("Interface"), Some(TypeKind::Interface));
        assert_eq!(TypeKind::from_keyword("delegate"), None);
        assert_eq!(TypeKind::RecordStruct.keyword(), "record struct");
    }
}
