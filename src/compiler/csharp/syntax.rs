// C# declaration extraction from tree-sitter syntax trees

use std::ops::Range;

use anyhow::{anyhow, Result};
use tree_sitter::{Node, Parser, Tree};

use crate::compiler::{Accessors, DeclarationSyntax, FileContext, Parameter, SymbolKind, TypeKind};

/// Parse C# source into a syntax tree
pub fn parse(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_c_sharp::LANGUAGE.into())?;
    parser
        .parse(source, None)
        .ok_or_else(|| anyhow!("tree-sitter returned no tree"))
}

/// A type declaration as written, before name resolution
#[derive(Debug, Clone)]
pub struct RawType {
    pub kind: TypeKind,
    pub name: String,
    pub type_parameters: Option<String>,
    pub namespace: Option<String>,
    /// Names of the enclosing types, outermost first
    pub outer: Vec<String>,
    pub modifiers: Vec<String>,
    pub base_types: Vec<String>,
    pub syntax: DeclarationSyntax,
    pub line: usize,
    pub column: usize,
    pub members: Vec<RawMember>,
}

impl RawType {
    pub fn qualified_name(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(ns) = &self.namespace {
            parts.push(ns);
        }
        parts.extend(self.outer.iter().map(String::as_str));
        parts.push(&self.name);
        parts.join(".")
    }
}

#[derive(Debug, Clone)]
pub struct RawMember {
    pub kind: SymbolKind,
    pub name: String,
    pub modifiers: Vec<String>,
    pub return_type: Option<String>,
    pub parameters: Vec<Parameter>,
    pub type_parameters: Option<String>,
    pub accessors: Option<Accessors>,
    pub signature: String,
    pub is_implicit: bool,
    pub syntax: DeclarationSyntax,
    pub line: usize,
    pub column: usize,
}

/// Everything declared by one source file
#[derive(Debug, Clone, Default)]
pub struct RawFile {
    /// Flattened; nested types carry their `outer` chain
    pub types: Vec<RawType>,
    pub context: FileContext,
    /// Namespaces imported by plain using directives
    pub imports: Vec<String>,
    /// `using Alias = Target;`
    pub aliases: Vec<(String, String)>,
    /// Namespaces imported by `global using` directives
    pub global_imports: Vec<String>,
}

pub fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Collapse runs of whitespace into single spaces
pub fn squash(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn line_column(node: Node<'_>) -> (usize, usize) {
    let start = node.start_position();
    (start.row + 1, start.column + 1)
}

/// Leading whitespace of the line containing `byte`
pub fn line_indent(source: &str, byte: usize) -> String {
    let line_start = source[..byte.min(source.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    source[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}

pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub fn all_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Every named node below `root` in document order, `root` included
pub fn descendants<'t>(root: Node<'t>) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        out.push(node);
        let children = named_children(node);
        stack.extend(children.into_iter().rev());
    }
    out
}

pub fn child_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    named_children(node)
        .into_iter()
        .find(|c| kinds.contains(&c.kind()))
}

/// Field lookup with a fallback on child kinds (grammar versions differ)
pub fn field_or_kind<'t>(node: Node<'t>, field: &str, kinds: &[&str]) -> Option<Node<'t>> {
    node.child_by_field_name(field)
        .or_else(|| child_of_kind(node, kinds))
}

/// The identifier naming a declaration
pub fn name_node(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("name")
        .or_else(|| child_of_kind(node, &["identifier"]))
}

pub fn modifiers(node: Node<'_>, source: &str) -> Vec<String> {
    named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "modifier")
        .map(|c| text(c, source).trim().to_string())
        .collect()
}

pub fn type_kind_of(node: Node<'_>) -> Option<TypeKind> {
    match node.kind() {
        "class_declaration" => Some(TypeKind::Class),
        "interface_declaration" => Some(TypeKind::Interface),
        "struct_declaration" => Some(TypeKind::Struct),
        "enum_declaration" => Some(TypeKind::Enum),
        "record_struct_declaration" => Some(TypeKind::RecordStruct),
        "record_declaration" => {
            let is_struct = all_children(node).iter().any(|c| c.kind() == "struct");
            Some(if is_struct {
                TypeKind::RecordStruct
            } else {
                TypeKind::Record
            })
        }
        _ => None,
    }
}

pub fn is_type_declaration(node: Node<'_>) -> bool {
    type_kind_of(node).is_some()
}

pub fn is_member_declaration(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "method_declaration"
            | "constructor_declaration"
            | "destructor_declaration"
            | "property_declaration"
            | "field_declaration"
            | "event_field_declaration"
            | "event_declaration"
            | "indexer_declaration"
            | "operator_declaration"
            | "conversion_operator_declaration"
            | "enum_member_declaration"
    )
}

/// Strip `global::`, nullable marks, array ranks and type arguments
pub fn bare_type_name(written: &str) -> String {
    let mut name = written.trim().trim_start_matches("global::").to_string();
    if let Some(idx) = name.find('<') {
        name.truncate(idx);
    }
    if let Some(idx) = name.find('[') {
        name.truncate(idx);
    }
    name.trim_end_matches('?').trim().to_string()
}

/// Number of top-level type arguments in a written type
pub fn type_arity(written: &str) -> usize {
    let Some(open) = written.find('<') else {
        return 0;
    };
    let mut depth = 0usize;
    let mut count = 1;
    for c in written[open..].chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 1 => count += 1,
            _ => {}
        }
    }
    count
}

/// Top-level type arguments of a written type: `Map<K, List<V>>` -> `K`, `List<V>`
pub fn type_arguments(written: &str) -> Vec<String> {
    let (Some(open), Some(close)) = (written.find('<'), written.rfind('>')) else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }
    let mut arguments = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in written[open + 1..close].chars() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                arguments.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    arguments.push(current.trim().to_string());
    arguments.retain(|a| !a.is_empty());
    arguments
}

pub fn parameters(list: Node<'_>, source: &str) -> Vec<Parameter> {
    named_children(list)
        .into_iter()
        .filter(|c| c.kind() == "parameter")
        .filter_map(|param| {
            let name = name_node(param).map(|n| text(n, source).to_string())?;
            let type_name = param
                .child_by_field_name("type")
                .map(|n| squash(text(n, source)))
                .unwrap_or_default();
            Some(Parameter {
                name,
                type_name,
                default_value: default_value(param, source),
                text: squash(text(param, source)),
            })
        })
        .collect()
}

fn default_value(param: Node<'_>, source: &str) -> Option<String> {
    let children = all_children(param);
    let eq = children.iter().position(|c| c.kind() == "=")?;
    children
        .iter()
        .skip(eq + 1)
        .find(|c| c.is_named())
        .map(|n| squash(text(*n, source)))
        .or_else(|| {
            let raw = text(param, source);
            raw.split_once('=').map(|(_, v)| v.trim().to_string())
        })
}

fn accessors(list: Node<'_>, source: &str) -> Accessors {
    let mut result = Accessors {
        auto: true,
        ..Accessors::default()
    };
    for accessor in named_children(list)
        .into_iter()
        .filter(|c| c.kind() == "accessor_declaration")
    {
        let mut keyword = None;
        let mut restricted = false;
        for child in all_children(accessor) {
            match child.kind() {
                "get" | "set" | "init" => keyword = Some(child.kind()),
                "modifier" => restricted = true,
                "block" | "arrow_expression_clause" => result.auto = false,
                _ => {}
            }
        }
        if keyword.is_none() {
            let raw = text(accessor, source);
            keyword = ["get", "set", "init"]
                .into_iter()
                .find(|k| raw.split(|c: char| !c.is_alphanumeric()).any(|w| w == *k));
        }
        match keyword {
            Some("get") => result.get = true,
            Some("set") => {
                result.set = true;
                result.restricted_set = restricted;
            }
            Some("init") => result.init = true,
            _ => {}
        }
    }
    result
}

fn accessor_shape(accessors: &Accessors) -> String {
    let mut parts = Vec::new();
    if accessors.get {
        parts.push("get;");
    }
    if accessors.set {
        parts.push(if accessors.restricted_set {
            "private set;"
        } else {
            "set;"
        });
    }
    if accessors.init {
        parts.push("init;");
    }
    format!("{{ {} }}", parts.join(" "))
}

fn join_signature(parts: &[&str]) -> String {
    squash(&parts.join(" "))
}

/// Walks a compilation unit collecting declarations
pub struct Extractor<'s> {
    source: &'s str,
    file: RawFile,
}

impl<'s> Extractor<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            file: RawFile::default(),
        }
    }

    pub fn extract(mut self, tree: &Tree) -> RawFile {
        let root = tree.root_node();
        let mut namespace: Option<String> = None;
        for child in named_children(root) {
            match child.kind() {
                "file_scoped_namespace_declaration" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| squash(text(n, self.source)));
                    self.note_namespace(name.as_deref(), true);
                    namespace = name;
                    // Newer grammars nest the members under the declaration
                    self.walk_scope(child, namespace.as_deref(), &[]);
                }
                _ => self.walk_item(child, namespace.as_deref(), &[]),
            }
        }
        self.file
    }

    fn note_namespace(&mut self, name: Option<&str>, file_scoped: bool) {
        if self.file.context.namespace.is_none() {
            if let Some(name) = name {
                self.file.context.namespace = Some(name.to_string());
                self.file.context.file_scoped_namespace = file_scoped;
            }
        }
    }

    fn walk_scope(&mut self, node: Node<'_>, namespace: Option<&str>, outer: &[String]) {
        for child in named_children(node) {
            self.walk_item(child, namespace, outer);
        }
    }

    fn walk_item(&mut self, node: Node<'_>, namespace: Option<&str>, outer: &[String]) {
        match node.kind() {
            "using_directive" => self.using_directive(node),
            "namespace_declaration" => {
                let Some(name) = node
                    .child_by_field_name("name")
                    .map(|n| squash(text(n, self.source)))
                else {
                    return;
                };
                let full = match namespace {
                    Some(parent) => format!("{}.{}", parent, name),
                    None => name,
                };
                self.note_namespace(Some(&full), false);
                if let Some(body) = field_or_kind(node, "body", &["declaration_list"]) {
                    self.walk_scope(body, Some(&full), outer);
                }
            }
            "declaration_list" => self.walk_scope(node, namespace, outer),
            _ if is_type_declaration(node) => {
                if outer.is_empty() {
                    self.file.context.type_count += 1;
                }
                self.type_declaration(node, namespace, outer);
            }
            _ => {}
        }
    }

    fn using_directive(&mut self, node: Node<'_>) {
        let raw = squash(text(node, self.source));
        self.file.context.usings.push(raw.clone());

        let is_global = raw.starts_with("global ");
        let body = raw
            .trim_start_matches("global ")
            .trim_start_matches("using ")
            .trim_end_matches(';')
            .trim();
        if body.starts_with("static ") {
            return;
        }
        if let Some((alias, target)) = body.split_once('=') {
            self.file
                .aliases
                .push((alias.trim().to_string(), target.trim().to_string()));
        } else if is_global {
            self.file.global_imports.push(body.to_string());
        } else {
            self.file.imports.push(body.to_string());
        }
    }

    fn type_declaration(&mut self, node: Node<'_>, namespace: Option<&str>, outer: &[String]) {
        let Some(kind) = type_kind_of(node) else {
            return;
        };
        let Some(name_node) = name_node(node) else {
            return;
        };
        let source = self.source;
        let name = text(name_node, source).to_string();
        let type_parameters = child_of_kind(node, &["type_parameter_list"]);
        let parameter_list = child_of_kind(node, &["parameter_list"]);
        let base_list = child_of_kind(node, &["base_list"]);
        let body = field_or_kind(node, "body", &["declaration_list", "enum_member_declaration_list"]);

        let header_end = [Some(name_node), type_parameters, parameter_list]
            .into_iter()
            .flatten()
            .map(|n| n.end_byte())
            .max()
            .unwrap_or_else(|| name_node.end_byte());

        let (line, column) = line_column(node);
        let mut raw = RawType {
            kind,
            name: name.clone(),
            type_parameters: type_parameters.map(|n| squash(text(n, source))),
            namespace: namespace.map(str::to_string),
            outer: outer.to_vec(),
            modifiers: modifiers(node, source),
            base_types: base_list
                .map(|list| base_list_types(list, source))
                .unwrap_or_default(),
            syntax: DeclarationSyntax {
                span: node.byte_range(),
                name_span: name_node.byte_range(),
                parameter_list: parameter_list.map(|n| n.byte_range()),
                body: body.map(|n| n.byte_range()),
                base_list: base_list.map(|n| n.byte_range()),
                header_end,
                indent: line_indent(source, node.start_byte()),
                nested: !outer.is_empty(),
                declarator: None,
                declarator_count: 1,
            },
            line,
            column,
            members: Vec::new(),
        };

        if matches!(kind, TypeKind::Record | TypeKind::RecordStruct) {
            if let Some(list) = parameter_list {
                raw.members.extend(self.record_properties(list));
            }
        }

        let mut nested_outer = outer.to_vec();
        nested_outer.push(name);
        let mut nested = Vec::new();
        if let Some(body) = body {
            for child in named_children(body) {
                if is_type_declaration(child) {
                    nested.push(child);
                } else {
                    raw.members.extend(self.member(child));
                }
            }
        }
        self.file.types.push(raw);
        for child in nested {
            self.type_declaration(child, namespace, &nested_outer);
        }
    }

    /// Positional record parameters become implicit public properties
    fn record_properties(&self, list: Node<'_>) -> Vec<RawMember> {
        let source = self.source;
        named_children(list)
            .into_iter()
            .filter(|c| c.kind() == "parameter")
            .filter_map(|param| {
                let name = name_node(param)?;
                let type_name = param
                    .child_by_field_name("type")
                    .map(|n| squash(text(n, source)))
                    .unwrap_or_default();
                let (line, column) = line_column(param);
                let accessors = Accessors {
                    get: true,
                    init: true,
                    auto: true,
                    ..Accessors::default()
                };
                Some(RawMember {
                    kind: SymbolKind::Property,
                    name: text(name, source).to_string(),
                    modifiers: vec!["public".to_string()],
                    signature: join_signature(&[
                        "public",
                        &type_name,
                        text(name, source),
                        &accessor_shape(&accessors),
                    ]),
                    return_type: Some(type_name),
                    parameters: Vec::new(),
                    type_parameters: None,
                    accessors: Some(accessors),
                    is_implicit: true,
                    syntax: DeclarationSyntax {
                        span: param.byte_range(),
                        name_span: name.byte_range(),
                        header_end: name.end_byte(),
                        indent: line_indent(source, param.start_byte()),
                        nested: true,
                        declarator_count: 1,
                        ..DeclarationSyntax::default()
                    },
                    line,
                    column,
                })
            })
            .collect()
    }

    fn member(&self, node: Node<'_>) -> Vec<RawMember> {
        match node.kind() {
            "method_declaration" | "constructor_declaration" => {
                self.method(node).into_iter().collect()
            }
            "property_declaration" => self.property(node).into_iter().collect(),
            "field_declaration" => self.fields(node, SymbolKind::Field),
            "event_field_declaration" => self.fields(node, SymbolKind::Event),
            "event_declaration" => self.event(node).into_iter().collect(),
            "enum_member_declaration" => self.enum_member(node).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn base_syntax(&self, node: Node<'_>, name: Node<'_>) -> DeclarationSyntax {
        DeclarationSyntax {
            span: node.byte_range(),
            name_span: name.byte_range(),
            header_end: name.end_byte(),
            indent: line_indent(self.source, node.start_byte()),
            nested: true,
            declarator_count: 1,
            ..DeclarationSyntax::default()
        }
    }

    fn method(&self, node: Node<'_>) -> Option<RawMember> {
        let source = self.source;
        let name = name_node(node)?;
        let is_constructor = node.kind() == "constructor_declaration";
        let mods = modifiers(node, source);
        let return_type = if is_constructor {
            None
        } else {
            node.child_by_field_name("returns")
                .or_else(|| node.child_by_field_name("type"))
                .map(|n| squash(text(n, source)))
        };
        let list = field_or_kind(node, "parameters", &["parameter_list"]);
        let type_parameters = child_of_kind(node, &["type_parameter_list"]).map(|n| squash(text(n, source)));
        let body = field_or_kind(node, "body", &["block"]).filter(|b| b.kind() == "block");

        let mut syntax = self.base_syntax(node, name);
        syntax.parameter_list = list.map(|n| n.byte_range());
        syntax.body = body.map(|n| n.byte_range());
        syntax.header_end = list.map(|n| n.end_byte()).unwrap_or(name.end_byte());

        let signature = join_signature(&[
            &mods.join(" "),
            return_type.as_deref().unwrap_or(""),
            &format!(
                "{}{}{}",
                text(name, source),
                type_parameters.as_deref().unwrap_or(""),
                list.map(|n| squash(text(n, source))).unwrap_or_else(|| "()".to_string())
            ),
        ]);
        let (line, column) = line_column(node);
        Some(RawMember {
            kind: if is_constructor {
                SymbolKind::Constructor
            } else {
                SymbolKind::Method
            },
            name: text(name, source).to_string(),
            modifiers: mods,
            return_type,
            parameters: list.map(|l| parameters(l, source)).unwrap_or_default(),
            type_parameters,
            accessors: None,
            signature,
            is_implicit: false,
            syntax,
            line,
            column,
        })
    }

    fn property(&self, node: Node<'_>) -> Option<RawMember> {
        let source = self.source;
        let name = name_node(node)?;
        let mods = modifiers(node, source);
        let type_name = node
            .child_by_field_name("type")
            .map(|n| squash(text(n, source)))
            .unwrap_or_default();
        let accessor_list = field_or_kind(node, "accessors", &["accessor_list"]);
        let accessors = match accessor_list {
            Some(list) => accessors(list, source),
            // Expression-bodied: `public int Total => ...;`
            None => Accessors {
                get: true,
                ..Accessors::default()
            },
        };

        let mut syntax = self.base_syntax(node, name);
        syntax.body = accessor_list.map(|n| n.byte_range());
        let signature = join_signature(&[
            &mods.join(" "),
            &type_name,
            text(name, source),
            &accessor_shape(&accessors),
        ]);
        let (line, column) = line_column(node);
        Some(RawMember {
            kind: SymbolKind::Property,
            name: text(name, source).to_string(),
            modifiers: mods,
            return_type: Some(type_name),
            parameters: Vec::new(),
            type_parameters: None,
            accessors: Some(accessors),
            signature,
            is_implicit: false,
            syntax,
            line,
            column,
        })
    }

    fn fields(&self, node: Node<'_>, kind: SymbolKind) -> Vec<RawMember> {
        let source = self.source;
        let mods = modifiers(node, source);
        let Some(declaration) = child_of_kind(node, &["variable_declaration"]) else {
            return Vec::new();
        };
        let type_name = declaration
            .child_by_field_name("type")
            .or_else(|| named_children(declaration).into_iter().next())
            .map(|n| squash(text(n, source)))
            .unwrap_or_default();
        let declarators: Vec<Node<'_>> = named_children(declaration)
            .into_iter()
            .filter(|c| c.kind() == "variable_declarator")
            .collect();
        let count = declarators.len();

        declarators
            .into_iter()
            .filter_map(|declarator| {
                let name = name_node(declarator)?;
                let mut syntax = self.base_syntax(node, name);
                syntax.declarator = Some(declarator.byte_range());
                syntax.declarator_count = count;
                let keyword = if kind == SymbolKind::Event { "event" } else { "" };
                let (line, column) = line_column(declarator);
                Some(RawMember {
                    kind,
                    name: text(name, source).to_string(),
                    modifiers: mods.clone(),
                    return_type: Some(type_name.clone()),
                    parameters: Vec::new(),
                    type_parameters: None,
                    accessors: None,
                    signature: join_signature(&[
                        &mods.join(" "),
                        keyword,
                        &type_name,
                        text(name, source),
                    ]),
                    is_implicit: false,
                    syntax,
                    line,
                    column,
                })
            })
            .collect()
    }

    fn event(&self, node: Node<'_>) -> Option<RawMember> {
        let source = self.source;
        let name = name_node(node)?;
        let mods = modifiers(node, source);
        let type_name = node
            .child_by_field_name("type")
            .map(|n| squash(text(n, source)))
            .unwrap_or_default();
        let (line, column) = line_column(node);
        Some(RawMember {
            kind: SymbolKind::Event,
            name: text(name, source).to_string(),
            signature: join_signature(&[&mods.join(" "), "event", &type_name, text(name, source)]),
            modifiers: mods,
            return_type: Some(type_name),
            parameters: Vec::new(),
            type_parameters: None,
            accessors: None,
            is_implicit: false,
            syntax: self.base_syntax(node, name),
            line,
            column,
        })
    }

    fn enum_member(&self, node: Node<'_>) -> Option<RawMember> {
        let name = name_node(node)?;
        let (line, column) = line_column(node);
        Some(RawMember {
            kind: SymbolKind::EnumMember,
            name: text(name, self.source).to_string(),
            modifiers: vec!["public".to_string(), "const".to_string()],
            return_type: None,
            parameters: Vec::new(),
            type_parameters: None,
            accessors: None,
            signature: squash(text(node, self.source)),
            is_implicit: false,
            syntax: self.base_syntax(node, name),
            line,
            column,
        })
    }
}

fn base_list_types(node: Node<'_>, source: &str) -> Vec<String> {
    named_children(node)
        .into_iter()
        .filter_map(|child| match child.kind() {
            "argument_list" => None,
            "primary_constructor_base_type" => child
                .child_by_field_name("type")
                .or_else(|| named_children(child).into_iter().next())
                .map(|n| squash(text(n, source))),
            _ => Some(squash(text(child, source))),
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Extract all declarations of a file
pub fn extract(source: &str, tree: &Tree) -> RawFile {
    Extractor::new(source).extract(tree)
}

/// Byte range of the full lines covering `span`, trailing newline included
pub fn line_span(source: &str, span: &Range<usize>) -> Range<usize> {
    let start = source[..span.start.min(source.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = source[span.end.min(source.len())..]
        .find('\n')
        .map(|i| span.end + i + 1)
        .unwrap_or(source.len());
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"using System;
using System.Collections.Generic;
using Alias = Shop.Models.Order;

namespace Shop.Models
{
    public partial class Order : EntityBase, IComparable<Order>
    {
        private readonly int _id, _version;
        public string Name { get; private set; }
        public decimal Total => 0m;
        public event EventHandler Changed;

        public Order(int id) { _id = id; }

        public virtual void Save(string path, bool overwrite = true)
        {
            Console.WriteLine(path);
        }

        public class Line { public int Qty { get; init; } }
    }

    public record Receipt(string Number, decimal Amount);

    public enum Status { Open, Closed }
}
"#;

    #[test]
    fn test_type_arguments() {
        assert_eq!(type_arguments("IRepo<Item>"), vec!["Item"]);
        assert_eq!(type_arguments("Map<K, List<V>>"), vec!["K", "List<V>"]);
        assert_eq!(type_arguments("<in T, (int, string) U>"), vec!["in T", "(int, string) U"]);
        assert!(type_arguments("IRepo").is_empty());
    }

    fn extract_sample() -> RawFile {
        let tree = parse(SOURCE).unwrap();
        extract(SOURCE, &tree)
    }

    #[test]
    fn test_extracts_types_and_namespace() {
        let file = extract_sample();
        let names: Vec<String> = file.types.iter().map(|t| t.qualified_name()).collect();

        assert!(names.contains(&"Shop.Models.Order".to_string()));
        assert!(names.contains(&"Shop.Models.Order.Line".to_string()));
        assert!(names.contains(&"Shop.Models.Receipt".to_string()));
        assert!(names.contains(&"Shop.Models.Status".to_string()));
        assert_eq!(file.context.namespace.as_deref(), Some("Shop.Models"));
        assert!(!file.context.file_scoped_namespace);
        assert_eq!(file.context.type_count, 3);
        assert_eq!(file.imports, vec!["System", "System.Collections.Generic"]);
        assert_eq!(file.aliases[0].0, "Alias");
    }

    #[test]
    fn test_extracts_members() {
        let file = extract_sample();
        let order = file.types.iter().find(|t| t.name == "Order").unwrap();
        assert_eq!(order.base_types, vec!["EntityBase", "IComparable<Order>"]);
        assert!(order.modifiers.contains(&"partial".to_string()));

        let fields: Vec<&RawMember> = order
            .members
            .iter()
            .filter(|m| m.kind == SymbolKind::Field)
            .collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].syntax.declarator_count, 2);
        assert_eq!(fields[0].return_type.as_deref(), Some("int"));

        let name = order.members.iter().find(|m| m.name == "Name").unwrap();
        let accessors = name.accessors.unwrap();
        assert!(accessors.get && accessors.set && accessors.restricted_set && accessors.auto);

        let total = order.members.iter().find(|m| m.name == "Total").unwrap();
        assert!(!total.accessors.unwrap().auto);

        let save = order.members.iter().find(|m| m.name == "Save").unwrap();
        assert_eq!(save.parameters.len(), 2);
        assert_eq!(save.parameters[1].default_value.as_deref(), Some("true"));
        assert_eq!(save.return_type.as_deref(), Some("void"));

        assert!(order
            .members
            .iter()
            .any(|m| m.kind == SymbolKind::Constructor && m.parameters.len() == 1));
        assert!(order.members.iter().any(|m| m.kind == SymbolKind::Event));
    }

    #[test]
    fn test_record_positional_properties_are_implicit() {
        let file = extract_sample();
        let receipt = file.types.iter().find(|t| t.name == "Receipt").unwrap();
        assert_eq!(receipt.kind, TypeKind::Record);
        assert_eq!(receipt.members.len(), 2);
        assert!(receipt.members.iter().all(|m| m.is_implicit));
    }

    #[test]
    fn test_file_scoped_namespace() {
        let source = "namespace Acme.Core;\n\npublic interface IClock { }\n";
        let tree = parse(source).unwrap();
        let file = extract(source, &tree);
        assert_eq!(file.context.namespace.as_deref(), Some("Acme.Core"));
        assert!(file.context.file_scoped_namespace);
        assert_eq!(file.types[0].qualified_name(), "Acme.Core.IClock");
    }

    #[test]
    fn test_type_name_helpers() {
        assert_eq!(bare_type_name("global::System.Collections.Generic.List<int>?"), "System.Collections.Generic.List");
        assert_eq!(bare_type_name("Order[]"), "Order");
        assert_eq!(type_arity("Dictionary<string, List<int>>"), 2);
        assert_eq!(type_arity("Order"), 0);
    }
}
