// Code graph model and storage

pub mod db;
pub mod schema;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::compiler::{SymbolKind, TypeKind};

pub const MAX_NAME_LEN: usize = 500;
pub const MAX_FULL_NAME_LEN: usize = 2000;
pub const MAX_FILE_PATH_LEN: usize = 1000;
pub const MAX_SIGNATURE_LEN: usize = 2000;

/// Node kinds in the code graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Solution,
    Project,
    File,
    Namespace,
    Class,
    Interface,
    Struct,
    Record,
    Enum,
    Constructor,
    Method,
    Property,
    Field,
    Event,
}

impl NodeType {
    pub const ALL: [NodeType; 14] = [
        NodeType::Solution,
        NodeType::Project,
        NodeType::File,
        NodeType::Namespace,
        NodeType::Class,
        NodeType::Interface,
        NodeType::Struct,
        NodeType::Record,
        NodeType::Enum,
        NodeType::Constructor,
        NodeType::Method,
        NodeType::Property,
        NodeType::Field,
        NodeType::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Solution => "solution",
            NodeType::Project => "project",
            NodeType::File => "file",
            NodeType::Namespace => "namespace",
            NodeType::Class => "class",
            NodeType::Interface => "interface",
            NodeType::Struct => "struct",
            NodeType::Record => "record",
            NodeType::Enum => "enum",
            NodeType::Constructor => "constructor",
            NodeType::Method => "method",
            NodeType::Property => "property",
            NodeType::Field => "field",
            NodeType::Event => "event",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Unknown node type: {}", s))
    }

    /// Node type for a type-declaration kind; record structs are stored as structs
    pub fn for_type(kind: TypeKind) -> Self {
        match kind {
            TypeKind::Class => NodeType::Class,
            TypeKind::Interface => NodeType::Interface,
            TypeKind::Struct | TypeKind::RecordStruct => NodeType::Struct,
            TypeKind::Record => NodeType::Record,
            TypeKind::Enum => NodeType::Enum,
        }
    }

    /// Node type for any symbol kind that becomes a node
    pub fn for_symbol(kind: SymbolKind) -> Option<Self> {
        match kind {
            SymbolKind::Namespace => Some(NodeType::Namespace),
            SymbolKind::Type(kind) => Some(Self::for_type(kind)),
            SymbolKind::Constructor => Some(NodeType::Constructor),
            SymbolKind::Method => Some(NodeType::Method),
            SymbolKind::Property => Some(NodeType::Property),
            SymbolKind::Field => Some(NodeType::Field),
            SymbolKind::Event => Some(NodeType::Event),
            SymbolKind::EnumMember => None,
        }
    }

    pub fn is_type(&self) -> bool {
        matches!(
            self,
            NodeType::Class | NodeType::Interface | NodeType::Struct | NodeType::Record | NodeType::Enum
        )
    }
}

/// Edge kinds in the code graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Contains,
    Declares,
    Inherits,
    Implements,
    Overrides,
    Calls,
    Uses,
    References,
}

impl EdgeType {
    pub const ALL: [EdgeType; 8] = [
        EdgeType::Contains,
        EdgeType::Declares,
        EdgeType::Inherits,
        EdgeType::Implements,
        EdgeType::Overrides,
        EdgeType::Calls,
        EdgeType::Uses,
        EdgeType::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Contains => "contains",
            EdgeType::Declares => "declares",
            EdgeType::Inherits => "inherits",
            EdgeType::Implements => "implements",
            EdgeType::Overrides => "overrides",
            EdgeType::Calls => "calls",
            EdgeType::Uses => "uses",
            EdgeType::References => "references",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        EdgeType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Unknown edge type: {}", s))
    }
}

/// A node of the persisted code graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeNode {
    pub id: String,
    pub node_type: NodeType,
    pub name: String,
    pub full_name: String,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub signature: Option<String>,
    pub modifiers: String,
    pub workspace_path: String,
}

impl CodeNode {
    /// Build a node, truncating every bounded field
    pub fn new(
        id: String,
        node_type: NodeType,
        name: &str,
        full_name: &str,
        workspace_path: &str,
    ) -> Self {
        Self {
            id,
            node_type,
            name: truncate(name, MAX_NAME_LEN),
            full_name: truncate(full_name, MAX_FULL_NAME_LEN),
            file_path: None,
            line_number: None,
            signature: None,
            modifiers: String::new(),
            workspace_path: normalize_workspace_path(workspace_path),
        }
    }

    pub fn with_file(mut self, file_path: &str, line_number: Option<u32>) -> Self {
        self.file_path = Some(truncate(file_path, MAX_FILE_PATH_LEN));
        self.line_number = line_number;
        self
    }

    pub fn with_signature(mut self, signature: Option<&str>) -> Self {
        self.signature = signature.map(|s| truncate(s, MAX_SIGNATURE_LEN));
        self
    }

    pub fn with_modifiers(mut self, modifiers: &[&str]) -> Self {
        self.modifiers = modifiers.join(" ");
        self
    }
}

/// A directed edge between two nodes of the same indexing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEdge {
    pub id: String,
    pub edge_type: EdgeType,
    pub source_id: String,
    pub target_id: String,
    pub workspace_path: String,
}

/// Truncate to at most `max` characters, ending in `...` when shortened
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = value.chars().take(keep).collect();
    out.push_str(&"..."[..max.min(3)]);
    out
}

/// Lowercase, forward-slash form used to key a workspace's graph
pub fn normalize_workspace_path(path: &str) -> String {
    path.replace('\\', "/").trim_end_matches('/').to_lowercase()
}

/// Persistence for code graphs. Nodes must be added before the edges that
/// reference them; nothing is durable until `save_changes`.
pub trait GraphStore {
    fn add_node(&mut self, node: CodeNode) -> Result<()>;

    fn add_edge(&mut self, edge: CodeEdge) -> Result<()>;

    /// Delete every stored node and edge of a workspace
    fn clear_workspace_graph(&mut self, workspace_path: &str) -> Result<()>;

    /// Commit pending nodes and edges in one transaction; returns rows written
    fn save_changes(&mut self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_long_full_name() {
        let long = "A".repeat(2500);
        let truncated = truncate(&long, MAX_FULL_NAME_LEN);
        assert_eq!(truncated.chars().count(), 2000);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_counts_characters() {
        let value = "é".repeat(600);
        let truncated = truncate(&value, MAX_NAME_LEN);
        assert_eq!(truncated.chars().count(), 500);
        assert_eq!(truncate("short", MAX_NAME_LEN), "short");
    }

    #[test]
    fn test_node_builder_truncates_fields() {
        let node = CodeNode::new(
            "id".to_string(),
            NodeType::Method,
            &"n".repeat(800),
            &"f".repeat(3000),
            "C:\\Repo\\Shop\\",
        )
        .with_file(&"p".repeat(1200), Some(3))
        .with_signature(Some(&"s".repeat(2100)))
        .with_modifiers(&["public", "static"]);

        assert_eq!(node.name.chars().count(), MAX_NAME_LEN);
        assert_eq!(node.full_name.chars().count(), MAX_FULL_NAME_LEN);
        assert_eq!(node.file_path.as_ref().unwrap().chars().count(), MAX_FILE_PATH_LEN);
        assert_eq!(node.signature.as_ref().unwrap().chars().count(), MAX_SIGNATURE_LEN);
        assert_eq!(node.modifiers, "public static");
        assert_eq!(node.workspace_path, "c:/repo/shop");
    }

    #[test]
    fn test_type_round_trip_names() {
        assert_eq!(NodeType::from_str("Interface").unwrap(), NodeType::Interface);
        assert_eq!(EdgeType::from_str("calls").unwrap(), EdgeType::Calls);
        assert!(EdgeType::from_str("extends").is_err());
        assert_eq!(NodeType::for_type(TypeKind::RecordStruct), NodeType::Struct);
    }
}
