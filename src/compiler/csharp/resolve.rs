// Name resolution over method bodies: locals, members, receivers and types

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use tree_sitter::Node;

use super::model::{SemanticModel, TypeRef};
use super::syntax::{self, bare_type_name, descendants, name_node, named_children, text};
use crate::compiler::{ReferenceLocation, Symbol, SymbolKind, WorkspaceState};

const MAX_INFERENCE_DEPTH: usize = 8;

/// Node kinds whose `name` child declares rather than references
const DECLARING_KINDS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "interface_declaration",
    "record_declaration",
    "record_struct_declaration",
    "enum_declaration",
    "method_declaration",
    "constructor_declaration",
    "destructor_declaration",
    "property_declaration",
    "event_declaration",
    "variable_declarator",
    "parameter",
    "enum_member_declaration",
    "local_function_statement",
    "delegate_declaration",
    "catch_declaration",
    "declaration_expression",
    "tuple_element",
];

/// Fields whose child node sits in a type position
const TYPE_FIELDS: &[&str] = &["type", "returns"];

/// Parents whose direct children are types
const TYPE_CONTAINERS: &[&str] = &[
    "base_list",
    "type_argument_list",
    "type_parameter_constraint",
    "type_constraint",
    "typeof_expression",
    "default_expression",
    "sizeof_expression",
    "primary_constructor_base_type",
];

#[derive(Debug, Clone)]
enum LocalType {
    Written(String),
    Initializer(Range<usize>),
    Unknown,
}

fn same(a: Option<Node<'_>>, b: Node<'_>) -> bool {
    a.map(|n| n.id() == b.id()).unwrap_or(false)
}

fn argument_count(list: Node<'_>) -> usize {
    named_children(list)
        .into_iter()
        .filter(|c| c.kind() == "argument")
        .count()
}

/// Resolves occurrences inside one document
pub struct DocumentResolver<'m> {
    model: &'m SemanticModel,
    doc: usize,
    scopes: HashMap<usize, HashMap<String, LocalType>>,
}

impl<'m> DocumentResolver<'m> {
    pub fn new(model: &'m SemanticModel, doc: usize) -> Self {
        Self {
            model,
            doc,
            scopes: HashMap::new(),
        }
    }

    fn source(&self) -> &'m str {
        &self.model.documents[self.doc].source
    }

    fn text(&self, node: Node<'_>) -> &'m str {
        text(node, self.source())
    }

    /// Innermost type declaration containing `node`
    pub fn enclosing_type(&self, node: Node<'_>) -> Option<usize> {
        let mut current = node.parent();
        while let Some(n) = current {
            if syntax::is_type_declaration(n) {
                return self.model.type_at(self.doc, n.start_byte());
            }
            current = n.parent();
        }
        None
    }

    fn enclosing_member(node: Node<'m>) -> Option<Node<'m>> {
        let mut current = node.parent();
        while let Some(n) = current {
            if syntax::is_member_declaration(n) {
                return Some(n);
            }
            if syntax::is_type_declaration(n) {
                return None;
            }
            current = n.parent();
        }
        None
    }

    fn collect_scope(&self, member: Node<'m>) -> HashMap<String, LocalType> {
        let mut locals = HashMap::new();
        if matches!(member.kind(), "property_declaration" | "indexer_declaration") {
            let written = member
                .child_by_field_name("type")
                .map(|t| self.text(t).to_string());
            locals.insert(
                "value".to_string(),
                written.map(LocalType::Written).unwrap_or(LocalType::Unknown),
            );
        }

        for node in descendants(member) {
            match node.kind() {
                "parameter" => {
                    if let Some(name) = name_node(node) {
                        let ty = node
                            .child_by_field_name("type")
                            .map(|t| LocalType::Written(self.text(t).to_string()))
                            .unwrap_or(LocalType::Unknown);
                        locals.insert(self.text(name).to_string(), ty);
                    }
                }
                "variable_declaration" => {
                    let in_field = node
                        .parent()
                        .map(|p| matches!(p.kind(), "field_declaration" | "event_field_declaration"))
                        .unwrap_or(false);
                    if in_field {
                        continue;
                    }
                    let written = node
                        .child_by_field_name("type")
                        .map(|t| self.text(t).trim().to_string())
                        .unwrap_or_default();
                    for declarator in named_children(node)
                        .into_iter()
                        .filter(|c| c.kind() == "variable_declarator")
                    {
                        let Some(name) = name_node(declarator) else {
                            continue;
                        };
                        let ty = if written == "var" || written.is_empty() {
                            named_children(declarator)
                                .into_iter()
                                .filter(|c| c.id() != name.id())
                                .last()
                                .map(|init| LocalType::Initializer(init.byte_range()))
                                .unwrap_or(LocalType::Unknown)
                        } else {
                            LocalType::Written(written.clone())
                        };
                        locals.insert(self.text(name).to_string(), ty);
                    }
                }
                "foreach_statement" => {
                    if let Some(left) = node.child_by_field_name("left") {
                        let ty = node
                            .child_by_field_name("type")
                            .map(|t| self.text(t).trim().to_string())
                            .filter(|t| t != "var")
                            .map(LocalType::Written)
                            .unwrap_or(LocalType::Unknown);
                        locals.insert(self.text(left).to_string(), ty);
                    }
                }
                "catch_declaration" | "declaration_expression" | "declaration_pattern" => {
                    let ty = node
                        .child_by_field_name("type")
                        .map(|t| self.text(t).trim().to_string())
                        .filter(|t| t != "var")
                        .map(LocalType::Written)
                        .unwrap_or(LocalType::Unknown);
                    let name = node.child_by_field_name("name").or_else(|| {
                        syntax::child_of_kind(node, &["single_variable_designation"])
                            .and_then(|d| syntax::child_of_kind(d, &["identifier"]))
                    });
                    if let Some(name) = name {
                        locals.insert(self.text(name).to_string(), ty);
                    }
                }
                "single_variable_designation" => {
                    if let Some(id) = syntax::child_of_kind(node, &["identifier"]) {
                        locals
                            .entry(self.text(id).to_string())
                            .or_insert(LocalType::Unknown);
                    }
                }
                "lambda_expression" => {
                    if let Some(param) = node.child_by_field_name("parameters") {
                        if param.kind() == "identifier" {
                            locals.insert(self.text(param).to_string(), LocalType::Unknown);
                        }
                    }
                }
                "local_function_statement" => {
                    if let Some(name) = name_node(node) {
                        locals.insert(self.text(name).to_string(), LocalType::Unknown);
                    }
                }
                _ => {}
            }
        }
        locals
    }

    fn local(&mut self, node: Node<'m>, name: &str) -> Option<LocalType> {
        let member = Self::enclosing_member(node)?;
        if !self.scopes.contains_key(&member.id()) {
            let scope = self.collect_scope(member);
            self.scopes.insert(member.id(), scope);
        }
        self.scopes.get(&member.id())?.get(name).cloned()
    }

    fn is_declaration_name(node: Node<'_>, parent: Node<'_>) -> bool {
        match parent.kind() {
            "type_parameter" | "single_variable_designation" | "name_colon" | "name_equals" => true,
            "foreach_statement" => same(parent.child_by_field_name("left"), node),
            kind if DECLARING_KINDS.contains(&kind) => same(name_node(parent), node),
            _ => false,
        }
    }

    fn in_namespace_or_using(node: Node<'_>) -> bool {
        let mut current = node.parent();
        while let Some(n) = current {
            match n.kind() {
                "qualified_name" | "alias_qualified_name" | "name_equals" => current = n.parent(),
                "using_directive" | "namespace_declaration" | "file_scoped_namespace_declaration" => {
                    return true
                }
                _ => return false,
            }
        }
        false
    }

    fn is_type_position(node: Node<'_>) -> bool {
        let mut current = node;
        while let Some(parent) = current.parent() {
            match parent.kind() {
                "nullable_type" | "array_type" | "pointer_type" | "ref_type" | "generic_name" => {
                    current = parent;
                }
                "qualified_name" if same(parent.child_by_field_name("name"), current) => {
                    current = parent;
                }
                kind if TYPE_CONTAINERS.contains(&kind) => return true,
                _ => {
                    return TYPE_FIELDS
                        .iter()
                        .any(|field| same(parent.child_by_field_name(*field), current));
                }
            }
        }
        false
    }

    fn invocation_of(node: Node<'m>) -> Option<Node<'m>> {
        let parent = node.parent()?;
        (parent.kind() == "invocation_expression"
            && same(parent.child_by_field_name("function"), node))
        .then_some(parent)
    }

    /// Argument list of the call an identifier names, if any
    pub fn call_arguments(node: Node<'m>) -> Option<Range<usize>> {
        let mut target = node;
        if let Some(parent) = node.parent() {
            if parent.kind() == "generic_name" {
                target = parent;
            }
        }
        if let Some(parent) = target.parent() {
            if parent.kind() == "member_access_expression"
                && same(parent.child_by_field_name("name"), target)
            {
                target = parent;
            }
        }
        Self::invocation_of(target)
            .and_then(|inv| inv.child_by_field_name("arguments"))
            .map(|args| args.byte_range())
    }

    /// The symbol an identifier occurrence refers to; `None` for declarations
    pub fn resolve_identifier(&mut self, node: Node<'m>) -> Option<Symbol> {
        let parent = node.parent()?;
        if Self::is_declaration_name(node, parent) || Self::in_namespace_or_using(node) {
            return None;
        }
        let name = self.text(node);

        // `x.Name`, `x.Name<T>`, `Name<T>(...)`
        let mut unit = node;
        if parent.kind() == "generic_name" {
            unit = parent;
        }
        if let Some(up) = unit.parent() {
            if up.kind() == "member_access_expression" && same(up.child_by_field_name("name"), unit) {
                return match Self::invocation_of(up) {
                    Some(inv) => self.resolve_invocation(inv),
                    None => self.resolve_member_access(up, name, None),
                };
            }
        }
        if let Some(inv) = Self::invocation_of(unit) {
            return self.resolve_invocation(inv);
        }

        if parent.kind() == "qualified_name" {
            return self.resolve_qualified(node, parent);
        }
        if parent.kind() == "attribute" {
            let enclosing = self.enclosing_type(node);
            return self
                .model
                .lookup_source_type(&format!("{}Attribute", name), self.doc, enclosing)
                .or_else(|| self.model.lookup_source_type(name, self.doc, enclosing))
                .map(|t| self.model.type_symbol(t).clone());
        }
        if let Some(symbol) = self.initializer_member(node, parent, name) {
            return Some(symbol);
        }

        if Self::is_type_position(node) {
            let enclosing = self.enclosing_type(node);
            let written = if unit.kind() == "generic_name" {
                self.text(unit)
            } else {
                name
            };
            return self
                .model
                .lookup_type(written, self.doc, enclosing)
                .map(|r| self.model.ref_symbol(&r));
        }

        if self.local(node, name).is_some() {
            return None;
        }
        let enclosing = self.enclosing_type(node);
        if let Some(t) = enclosing {
            let found = self.model.find_members(t, name);
            if !found.is_empty() {
                return Some(self.model.members[self.pick_overload(&found, None)].symbol.clone());
            }
        }
        if let Some(t) = self.model.lookup_source_type(name, self.doc, enclosing) {
            return Some(self.model.type_symbol(t).clone());
        }
        let receiver_of_access = parent.kind() == "member_access_expression"
            && same(parent.child_by_field_name("expression"), node);
        if receiver_of_access && name.chars().next().map(char::is_uppercase).unwrap_or(false) {
            return Some(self.model.ref_symbol(&TypeRef::External(name.to_string())));
        }
        None
    }

    /// Identifiers inside qualified names: `Outer.Inner`, `Billing.Order`
    fn resolve_qualified(&mut self, node: Node<'m>, parent: Node<'m>) -> Option<Symbol> {
        let enclosing = self.enclosing_type(node);
        if same(parent.child_by_field_name("name"), node) {
            let whole = self.text(parent);
            let outer_is_qualified = parent
                .parent()
                .map(|p| p.kind() == "qualified_name" && !same(p.child_by_field_name("name"), parent))
                .unwrap_or(false);
            if outer_is_qualified {
                return self
                    .model
                    .lookup_source_type(whole, self.doc, enclosing)
                    .map(|t| self.model.type_symbol(t).clone());
            }
            return self
                .model
                .lookup_type(whole, self.doc, enclosing)
                .map(|r| self.model.ref_symbol(&r));
        }
        // Leftmost segment: a type only when one is declared under that name
        let name = self.text(node);
        self.model
            .lookup_source_type(name, self.doc, enclosing)
            .filter(|&t| self.model.types[t].qualified_name.ends_with(name))
            .map(|t| self.model.type_symbol(t).clone())
    }

    /// `new Order { Total = 5 }`: the left side names a member of the created type
    fn initializer_member(&mut self, node: Node<'m>, parent: Node<'m>, name: &str) -> Option<Symbol> {
        if parent.kind() != "assignment_expression" || !same(parent.child_by_field_name("left"), node) {
            return None;
        }
        let initializer = parent.parent().filter(|p| p.kind() == "initializer_expression")?;
        let creation = initializer
            .parent()
            .filter(|p| p.kind() == "object_creation_expression")?;
        let TypeRef::Source(t) = self.infer_type(creation, 0)? else {
            return None;
        };
        let found = self.model.find_members(t, name);
        found
            .first()
            .map(|&m| self.model.members[m].symbol.clone())
    }

    /// Choose among overloads by argument count
    fn pick_overload(&self, candidates: &[usize], count: Option<usize>) -> usize {
        let fits = |m: &usize, count: usize| {
            let symbol = &self.model.members[*m].symbol;
            if !matches!(symbol.kind, SymbolKind::Method | SymbolKind::Constructor) {
                return false;
            }
            let variadic = symbol
                .parameters
                .last()
                .map(|p| p.text.starts_with("params "))
                .unwrap_or(false);
            let required = symbol
                .parameters
                .iter()
                .filter(|p| p.default_value.is_none() && !p.text.starts_with("params "))
                .count();
            count >= required && (variadic || count <= symbol.parameters.len())
        };
        if let Some(count) = count {
            if let Some(found) = candidates.iter().find(|m| fits(*m, count)) {
                return *found;
            }
        }
        candidates[0]
    }

    fn resolve_member_access(
        &mut self,
        access: Node<'m>,
        name: &str,
        arguments: Option<Node<'m>>,
    ) -> Option<Symbol> {
        let receiver = access.child_by_field_name("expression")?;
        let name = bare_type_name(name);
        match self.infer_type(receiver, 0)? {
            TypeRef::Source(t) => {
                let found = self.model.find_members(t, &name);
                if found.is_empty() {
                    return None;
                }
                let count = arguments.map(argument_count);
                Some(self.model.members[self.pick_overload(&found, count)].symbol.clone())
            }
            TypeRef::External(type_name) => {
                let kind = if arguments.is_some() {
                    SymbolKind::Method
                } else {
                    SymbolKind::Property
                };
                Some(Symbol::external(kind, &format!("{}.{}", type_name, name)))
            }
        }
    }

    /// Target of an invocation expression
    pub fn resolve_invocation(&mut self, invocation: Node<'m>) -> Option<Symbol> {
        let function = invocation.child_by_field_name("function")?;
        let arguments = invocation.child_by_field_name("arguments");
        match function.kind() {
            "identifier" | "generic_name" => {
                let name = match function.kind() {
                    "generic_name" => syntax::child_of_kind(function, &["identifier"])
                        .map(|n| self.text(n))?,
                    _ => self.text(function),
                };
                if self.local(function, name).is_some() {
                    return None;
                }
                let t = self.enclosing_type(function)?;
                let found = self.model.find_members(t, name);
                if found.is_empty() {
                    return None;
                }
                let count = arguments.map(argument_count).unwrap_or(0);
                Some(self.model.members[self.pick_overload(&found, Some(count))].symbol.clone())
            }
            "member_access_expression" => {
                let name_node = function.child_by_field_name("name")?;
                let name = self.text(name_node);
                let arguments = arguments.or_else(|| syntax::child_of_kind(invocation, &["argument_list"]));
                self.resolve_member_access(function, name, arguments)
            }
            _ => None,
        }
    }

    /// Type instantiated by an object creation expression
    pub fn resolve_creation(&mut self, creation: Node<'m>) -> Option<Symbol> {
        let ty = creation.child_by_field_name("type")?;
        let enclosing = self.enclosing_type(creation);
        self.model
            .lookup_type(self.text(ty), self.doc, enclosing)
            .map(|r| self.model.ref_symbol(&r))
    }

    /// Constructor overload an object creation binds to
    pub fn resolve_constructor(&mut self, creation: Node<'m>) -> Option<Symbol> {
        let ty = creation.child_by_field_name("type")?;
        let enclosing = self.enclosing_type(creation);
        let t = self.model.lookup_source_type(self.text(ty), self.doc, enclosing)?;
        let count = creation
            .child_by_field_name("arguments")
            .map(argument_count)
            .unwrap_or(0);
        self.constructor_of(t, count)
    }

    /// Target of a `: this(...)` or `: base(...)` constructor initializer
    pub fn resolve_chained_constructor(&mut self, initializer: Node<'m>) -> Option<Symbol> {
        let enclosing = self.enclosing_type(initializer)?;
        let keyword = self.text(initializer).trim_start_matches(':').trim_start();
        let t = if keyword.starts_with("base") {
            match self.model.types[enclosing].base_type.clone()? {
                TypeRef::Source(base) => base,
                TypeRef::External(_) => return None,
            }
        } else {
            enclosing
        };
        let count = syntax::child_of_kind(initializer, &["argument_list"])
            .map(argument_count)
            .unwrap_or(0);
        self.constructor_of(t, count)
    }

    fn constructor_of(&self, t: usize, count: usize) -> Option<Symbol> {
        let constructors: Vec<usize> = self.model.types[t]
            .members
            .iter()
            .copied()
            .filter(|&m| self.model.members[m].symbol.kind == SymbolKind::Constructor)
            .collect();
        if constructors.is_empty() {
            return None;
        }
        let chosen = self.pick_overload(&constructors, Some(count));
        let symbol = &self.model.members[chosen].symbol;
        let required = symbol
            .parameters
            .iter()
            .filter(|p| p.default_value.is_none())
            .count();
        (count >= required).then(|| symbol.clone())
    }

    fn infer_type(&mut self, expr: Node<'m>, depth: usize) -> Option<TypeRef> {
        if depth > MAX_INFERENCE_DEPTH {
            return None;
        }
        let raw = self.text(expr).trim();
        let enclosing = self.enclosing_type(expr);
        if raw == "this" {
            return enclosing.map(TypeRef::Source);
        }
        if raw == "base" {
            return enclosing.and_then(|t| self.model.types[t].base_type.clone());
        }

        match expr.kind() {
            "identifier" => {
                if let Some(local) = self.local(expr, raw) {
                    return match local {
                        LocalType::Written(written) => {
                            self.model.lookup_type(&written, self.doc, enclosing)
                        }
                        LocalType::Initializer(span) => {
                            let init = self.model.node_at(self.doc, &span)?;
                            self.infer_type(init, depth + 1)
                        }
                        LocalType::Unknown => None,
                    };
                }
                if let Some(t) = enclosing {
                    let found = self.model.find_members(t, raw);
                    if let Some(&m) = found
                        .iter()
                        .find(|&&m| self.model.members[m].symbol.kind != SymbolKind::Method)
                    {
                        return self.model.member_type(m);
                    }
                }
                if let Some(t) = self.model.lookup_source_type(raw, self.doc, enclosing) {
                    return Some(TypeRef::Source(t));
                }
                raw.chars()
                    .next()
                    .filter(|c| c.is_uppercase())
                    .map(|_| TypeRef::External(raw.to_string()))
            }
            "generic_name" | "qualified_name" | "predefined_type" => {
                self.model.lookup_type(raw, self.doc, enclosing)
            }
            "member_access_expression" => {
                let receiver = expr.child_by_field_name("expression")?;
                let name = expr
                    .child_by_field_name("name")
                    .map(|n| bare_type_name(self.text(n)))?;
                match self.infer_type(receiver, depth + 1) {
                    Some(TypeRef::Source(t)) => {
                        let found = self.model.find_members(t, &name);
                        found.first().and_then(|&m| self.model.member_type(m))
                    }
                    Some(TypeRef::External(_)) => None,
                    // `Namespace.Type` used as a receiver
                    None => self
                        .model
                        .lookup_source_type(raw, self.doc, enclosing)
                        .map(TypeRef::Source),
                }
            }
            "invocation_expression" => {
                let target = self.resolve_invocation(expr)?;
                let member = self.model.member_index_of(&target)?;
                self.model.member_type(member)
            }
            "object_creation_expression" | "cast_expression" => {
                let ty = expr.child_by_field_name("type")?;
                self.model.lookup_type(self.text(ty), self.doc, enclosing)
            }
            "parenthesized_expression" | "equals_value_clause" => {
                let inner = named_children(expr).into_iter().next()?;
                self.infer_type(inner, depth + 1)
            }
            _ => None,
        }
    }
}

fn line_text(source: &str, byte: usize) -> String {
    let span = syntax::line_span(source, &(byte..byte));
    source[span].trim().to_string()
}

/// Every reference to `target` across the model, declarations excluded
pub fn find_references(model: &SemanticModel, target: &Symbol) -> Vec<ReferenceLocation> {
    let mut out = Vec::new();
    let constructor = target.kind == SymbolKind::Constructor;
    for (doc, document) in model.documents.iter().enumerate() {
        let chains = constructor && document.source.contains("base");
        if !document.source.contains(target.name.as_str()) && !chains {
            continue;
        }
        let mut resolver = DocumentResolver::new(model, doc);
        for node in descendants(document.tree.root_node()) {
            let (anchor, call_arguments) = if constructor && node.kind() == "constructor_initializer" {
                match resolver.resolve_chained_constructor(node) {
                    Some(symbol) if symbol == *target => {}
                    _ => continue,
                }
                let anchor = syntax::all_children(node)
                    .into_iter()
                    .find(|n| matches!(n.kind(), "this" | "base"))
                    .unwrap_or(node);
                let arguments = syntax::child_of_kind(node, &["argument_list"]).map(|a| a.byte_range());
                (anchor, arguments)
            } else if constructor {
                if node.kind() != "object_creation_expression" {
                    continue;
                }
                match resolver.resolve_constructor(node) {
                    Some(symbol) if symbol == *target => {}
                    _ => continue,
                }
                let Some(ty) = node.child_by_field_name("type") else {
                    continue;
                };
                let anchor = descendants(ty)
                    .into_iter()
                    .find(|n| n.kind() == "identifier" && text(*n, &document.source) == target.name)
                    .unwrap_or(ty);
                let arguments = node.child_by_field_name("arguments").map(|a| a.byte_range());
                (anchor, arguments)
            } else {
                if node.kind() != "identifier" || text(node, &document.source) != target.name {
                    continue;
                }
                match resolver.resolve_identifier(node) {
                    Some(symbol) if symbol == *target => {}
                    _ => continue,
                }
                (node, DocumentResolver::call_arguments(node))
            };

            let start = anchor.start_position();
            out.push(ReferenceLocation {
                file: document.path.clone(),
                span: anchor.byte_range(),
                line: start.row + 1,
                column: start.column + 1,
                line_text: line_text(&document.source, anchor.start_byte()),
                call_arguments,
            });
        }
    }
    out
}

/// Source declarations of a symbol (one per partial declaration)
pub fn declarations_of(model: &SemanticModel, symbol: &Symbol) -> Vec<Symbol> {
    if let Some(t) = model.type_index_of(symbol) {
        return model.types[t].declarations.clone();
    }
    model
        .member_index_of(symbol)
        .map(|m| vec![model.members[m].symbol.clone()])
        .unwrap_or_default()
}

/// Rename the symbol's declarations and references, returning the full workspace text
pub fn rename(model: &SemanticModel, symbol: &Symbol, new_name: &str) -> WorkspaceState {
    let mut edits: BTreeMap<usize, Vec<Range<usize>>> = BTreeMap::new();
    let mut add = |path: &std::path::Path, span: Range<usize>| {
        if let Some(doc) = model.document_index(path) {
            edits.entry(doc).or_default().push(span);
        }
    };

    for reference in find_references(model, symbol) {
        // `this(...)` and `base(...)` chains keep their keyword
        let keyword = model
            .document_index(&reference.file)
            .and_then(|d| model.documents[d].source.get(reference.span.clone()))
            .map(|t| t == "this" || t == "base")
            .unwrap_or(false);
        if !keyword {
            add(&reference.file, reference.span);
        }
    }
    for declaration in declarations_of(model, symbol) {
        if let (Some(file), Some(syntax)) = (declaration.file(), declaration.syntax.as_ref()) {
            add(file, syntax.name_span.clone());
        }
    }
    // Constructors carry the type's name
    if let Some(t) = model.type_index_of(symbol) {
        for &m in &model.types[t].members {
            let member = &model.members[m].symbol;
            if member.kind == SymbolKind::Constructor {
                if let (Some(file), Some(syntax)) = (member.file(), member.syntax.as_ref()) {
                    add(file, syntax.name_span.clone());
                }
            }
        }
    }

    let mut state = WorkspaceState::default();
    for (doc, document) in model.documents.iter().enumerate() {
        let mut text = document.source.clone();
        if let Some(spans) = edits.get_mut(&doc) {
            spans.sort_by(|a, b| b.start.cmp(&a.start));
            spans.dedup();
            for span in spans.iter() {
                if span.end <= text.len() {
                    text.replace_range(span.clone(), new_name);
                }
            }
        }
        state.documents.insert(document.path.clone(), text);
    }
    state
}
