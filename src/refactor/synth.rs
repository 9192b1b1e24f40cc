// C# source synthesis for generated members and types

use anyhow::Result;

use crate::compiler::{Accessors, Symbol, TypeKind};
use crate::error::RefactorError;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// A plain or `@`-escaped C# identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let (escaped, bare) = match name.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, name),
    };
    let mut chars = bare.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && (escaped || !is_keyword(bare))
}

pub fn escape_identifier(name: &str) -> String {
    if is_keyword(name) {
        format!("@{}", name)
    } else {
        name.to_string()
    }
}

/// `OrderId` -> `orderId`, `_clock` -> `clock`, `URLPath` -> `urlPath`
pub fn camel_case(name: &str) -> String {
    let trimmed = name.trim_start_matches('_');
    let trimmed = trimmed.strip_prefix("m_").unwrap_or(trimmed);
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.is_empty() {
        return name.to_string();
    }

    let mut upper_run = chars.iter().take_while(|c| c.is_uppercase()).count();
    if upper_run > 1 && upper_run < chars.len() && chars[upper_run].is_lowercase() {
        upper_run -= 1;
    }
    let upper_run = upper_run.max(1);

    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < upper_run { c.to_lowercase().next().unwrap_or(*c) } else { *c })
        .collect()
}

/// Expression appended at call sites for a parameter without a default
pub fn default_expression(type_name: &str) -> String {
    format!("default({})", type_name)
}

fn not_implemented(short_exception: bool) -> &'static str {
    if short_exception {
        "throw new NotImplementedException();"
    } else {
        "throw new System.NotImplementedException();"
    }
}

fn parameter_list(symbol: &Symbol) -> String {
    symbol
        .parameters
        .iter()
        .map(|p| p.text.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

/// How an implementing member is written
#[derive(Debug, Clone, Copy)]
pub struct StubStyle<'a> {
    /// `Some(IName)` writes `IName.Member` without an access modifier
    pub explicit_interface: Option<&'a str>,
    /// `using System;` is in scope
    pub short_exception: bool,
}

/// Method body that throws `NotImplementedException`
pub fn method_stub(method: &Symbol, style: StubStyle<'_>) -> String {
    let return_type = method.return_type.as_deref().unwrap_or("void");
    let type_parameters = method.type_parameters.as_deref().unwrap_or("");
    let header = match style.explicit_interface {
        Some(interface) => format!(
            "{} {}.{}{}({})",
            return_type,
            interface,
            method.name,
            type_parameters,
            parameter_list(method)
        ),
        None => format!(
            "public {} {}{}({})",
            return_type,
            method.name,
            type_parameters,
            parameter_list(method)
        ),
    };
    format!("{}\n{{\n    {}\n}}", header, not_implemented(style.short_exception))
}

/// Property with throwing accessors matching the interface's shape
pub fn property_stub(property: &Symbol, style: StubStyle<'_>) -> String {
    let type_name = property.return_type.as_deref().unwrap_or("object");
    let accessors = property.accessors.unwrap_or(Accessors {
        get: true,
        ..Accessors::default()
    });
    let header = match style.explicit_interface {
        Some(interface) => format!("{} {}.{}", type_name, interface, property.name),
        None => format!("public {} {}", type_name, property.name),
    };

    let throw = not_implemented(style.short_exception).trim_end_matches(';');
    let mut lines = Vec::new();
    if accessors.get {
        lines.push(format!("    get => {};", throw));
    }
    if accessors.set {
        lines.push(format!("    set => {};", throw));
    } else if accessors.init {
        lines.push(format!("    init => {};", throw));
    }
    format!("{}\n{{\n{}\n}}", header, lines.join("\n"))
}

/// Interface member signature mirroring a class method
pub fn interface_method(method: &Symbol) -> String {
    format!(
        "{} {}{}({});",
        method.return_type.as_deref().unwrap_or("void"),
        method.name,
        method.type_parameters.as_deref().unwrap_or(""),
        parameter_list(method)
    )
}

/// Interface property exposing the class property's public accessors
pub fn interface_property(property: &Symbol) -> String {
    let accessors = property.accessors.unwrap_or_default();
    let mut shape = Vec::new();
    if accessors.get {
        shape.push("get;");
    }
    if accessors.set && !accessors.restricted_set {
        shape.push("set;");
    } else if accessors.init && !accessors.restricted_set {
        shape.push("init;");
    }
    if shape.is_empty() {
        shape.push("get;");
    }
    format!(
        "{} {} {{ {} }}",
        property.return_type.as_deref().unwrap_or("object"),
        property.name,
        shape.join(" ")
    )
}

/// Everything a new type declaration may carry
#[derive(Debug, Clone, Default)]
pub struct TypeShape {
    pub name: String,
    pub modifiers: Vec<String>,
    pub type_parameters: Vec<String>,
    pub base_type: Option<String>,
    pub interfaces: Vec<String>,
    pub attributes: Vec<String>,
    pub members: Vec<String>,
}

/// Declaration text for a new type; enums are not synthesized
pub fn type_declaration(kind: TypeKind, shape: &TypeShape) -> Result<String> {
    let keyword = match kind {
        TypeKind::Class => "class",
        TypeKind::Interface => "interface",
        TypeKind::Struct => "struct",
        TypeKind::Record => "record",
        TypeKind::RecordStruct => "record struct",
        TypeKind::Enum => {
            return Err(RefactorError::InvalidRequest(
                "creating enum types is not supported".to_string(),
            )
            .into())
        }
    };
    // Only classes and records can have a base class
    if shape.base_type.is_some() && !matches!(kind, TypeKind::Class | TypeKind::Record) {
        return Err(RefactorError::InvalidRequest(format!(
            "a {} cannot derive from a base type; use interfaces instead",
            kind.keyword()
        ))
        .into());
    }

    let mut out = String::new();
    for attribute in &shape.attributes {
        let attribute = attribute.trim().trim_start_matches('[').trim_end_matches(']');
        out.push_str(&format!("[{}]\n", attribute));
    }

    let modifiers = if shape.modifiers.is_empty() {
        vec!["public".to_string()]
    } else {
        shape.modifiers.clone()
    };
    out.push_str(&modifiers.join(" "));
    out.push(' ');
    out.push_str(keyword);
    out.push(' ');
    out.push_str(&shape.name);
    if !shape.type_parameters.is_empty() {
        out.push_str(&format!("<{}>", shape.type_parameters.join(", ")));
    }

    let bases: Vec<&str> = shape
        .base_type
        .iter()
        .chain(shape.interfaces.iter())
        .map(String::as_str)
        .collect();
    if !bases.is_empty() {
        out.push_str(" : ");
        out.push_str(&bases.join(", "));
    }

    out.push_str("\n{\n");
    let body: Vec<String> = shape
        .members
        .iter()
        .map(|m| {
            m.lines()
                .map(|l| if l.trim().is_empty() { String::new() } else { format!("    {}", l) })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect();
    if !body.is_empty() {
        out.push_str(&body.join("\n\n"));
        out.push('\n');
    }
    out.push('}');
    Ok(out)
}

/// A whole file: usings, an optional namespace and one declaration
pub fn compilation_unit(usings: &[String], namespace: Option<&str>, file_scoped: bool, declaration: &str) -> String {
    let mut out = String::new();
    for using in usings {
        out.push_str(using.trim());
        out.push('\n');
    }
    if !usings.is_empty() {
        out.push('\n');
    }

    match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) if file_scoped => {
            out.push_str(&format!("namespace {};\n\n{}\n", ns, declaration));
        }
        Some(ns) => {
            out.push_str(&format!("namespace {}\n{{\n", ns));
            for line in declaration.lines() {
                if line.trim().is_empty() {
                    out.push('\n');
                } else {
                    out.push_str(&format!("    {}\n", line));
                }
            }
            out.push_str("}\n");
        }
        None => {
            out.push_str(declaration);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Parameter, SymbolInfo, SymbolKind};

    fn member(kind: SymbolKind, name: &str, return_type: &str, accessors: Option<Accessors>) -> Symbol {
        let mut info = Symbol::external(kind, &format!("IStore.{}", name)).info().clone();
        info.return_type = Some(return_type.to_string());
        info.accessors = accessors;
        info.parameters = vec![Parameter {
            name: "id".to_string(),
            type_name: "int".to_string(),
            default_value: None,
            text: "int id".to_string(),
        }];
        Symbol::new(SymbolInfo { ..info })
    }

    #[test]
    fn test_identifiers() {
        assert!(is_valid_identifier("Basket"));
        assert!(is_valid_identifier("@class"));
        assert!(!is_valid_identifier("class"));
        assert!(!is_valid_identifier("1st"));
        assert!(!is_valid_identifier("a-b"));
        assert_eq!(escape_identifier("event"), "@event");
        assert_eq!(escape_identifier("total"), "total");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("OrderId"), "orderId");
        assert_eq!(camel_case("_clock"), "clock");
        assert_eq!(camel_case("m_count"), "count");
        assert_eq!(camel_case("URLPath"), "urlPath");
        assert_eq!(camel_case("ID"), "id");
    }

    #[test]
    fn test_stubs() {
        let method = member(SymbolKind::Method, "Load", "string", None);
        let implicit = method_stub(&method, StubStyle { explicit_interface: None, short_exception: true });
        assert_eq!(implicit, "public string Load(int id)\n{\n    throw new NotImplementedException();\n}");

        let explicit = method_stub(
            &method,
            StubStyle {
                explicit_interface: Some("IStore"),
                short_exception: false,
            },
        );
        assert!(explicit.starts_with("string IStore.Load(int id)"));
        assert!(explicit.contains("System.NotImplementedException"));

        let property = member(
            SymbolKind::Property,
            "Name",
            "string",
            Some(Accessors { get: true, set: true, ..Accessors::default() }),
        );
        let stub = property_stub(&property, StubStyle { explicit_interface: None, short_exception: true });
        assert_eq!(
            stub,
            "public string Name\n{\n    get => throw new NotImplementedException();\n    set => throw new NotImplementedException();\n}"
        );
        assert_eq!(interface_property(&property), "string Name { get; set; }");
        assert_eq!(interface_method(&method), "string Load(int id);");
    }

    #[test]
    fn test_type_declaration_kinds() {
        let shape = TypeShape {
            name: "Repository".to_string(),
            type_parameters: vec!["T".to_string()],
            base_type: Some("RepositoryBase".to_string()),
            interfaces: vec!["IDisposable".to_string()],
            attributes: vec!["[Serializable]".to_string()],
            ..TypeShape::default()
        };
        assert_eq!(
            type_declaration(TypeKind::Class, &shape).unwrap(),
            "[Serializable]\npublic class Repository<T> : RepositoryBase, IDisposable\n{\n}"
        );
        assert!(type_declaration(TypeKind::Struct, &shape).is_err());
        assert!(type_declaration(TypeKind::Enum, &TypeShape::default()).is_err());

        let point = TypeShape {
            name: "Point".to_string(),
            modifiers: vec!["public".to_string(), "readonly".to_string()],
            ..TypeShape::default()
        };
        assert_eq!(
            type_declaration(TypeKind::RecordStruct, &point).unwrap(),
            "public readonly record struct Point\n{\n}"
        );
    }

    #[test]
    fn test_compilation_unit_layouts() {
        let usings = vec!["using System;".to_string()];
        let block = compilation_unit(&usings, Some("Shop"), false, "public class A\n{\n}");
        assert_eq!(block, "using System;\n\nnamespace Shop\n{\n    public class A\n    {\n    }\n}\n");

        let scoped = compilation_unit(&[], Some("Shop"), true, "public class A\n{\n}");
        assert_eq!(scoped, "namespace Shop;\n\npublic class A\n{\n}\n");
    }
}
