// Query execution engine over the persisted code graph

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::index::db::{GraphDatabase, GraphStats};
use crate::index::{normalize_workspace_path, CodeNode, EdgeType, NodeType};

/// Query result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub node_id: String,
    pub name: String,
    pub full_name: String,
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl From<CodeNode> for QueryResult {
    fn from(node: CodeNode) -> Self {
        Self {
            node_id: node.id,
            name: node.name,
            full_name: node.full_name,
            node_type: node.node_type.as_str().to_string(),
            file: node.file_path,
            line: node.line_number,
        }
    }
}

/// Relationship queries over one symbol name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Callers,
    Callees,
    Implementations,
    DerivedTypes,
    Members,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Callers => "callers",
            QueryKind::Callees => "callees",
            QueryKind::Implementations => "implementations",
            QueryKind::DerivedTypes => "derived_types",
            QueryKind::Members => "members",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "callers" => Ok(QueryKind::Callers),
            "callees" => Ok(QueryKind::Callees),
            "implementations" => Ok(QueryKind::Implementations),
            "derived" | "derived_types" => Ok(QueryKind::DerivedTypes),
            "members" => Ok(QueryKind::Members),
            _ => Err(anyhow::anyhow!("Unknown query type: {}", s)),
        }
    }
}

/// Which way an edge is followed
#[derive(Debug, Clone, Copy)]
enum Direction {
    /// From the matched node to the edge's target
    Outgoing,
    /// From the edge's source to the matched node
    Incoming,
}

/// Query engine scoped to one workspace
pub struct QueryEngine {
    db: GraphDatabase,
    workspace_path: String,
}

impl QueryEngine {
    pub fn new(db: GraphDatabase, workspace_path: &str) -> Self {
        Self {
            db,
            workspace_path: normalize_workspace_path(workspace_path),
        }
    }

    pub fn run(&self, kind: QueryKind, target: &str) -> Result<Vec<QueryResult>> {
        match kind {
            QueryKind::Callers => self.find_callers(target),
            QueryKind::Callees => self.find_callees(target),
            QueryKind::Implementations => self.find_implementations(target),
            QueryKind::DerivedTypes => self.find_derived_types(target),
            QueryKind::Members => self.find_members(target),
        }
    }

    /// Methods and constructors calling a symbol
    pub fn find_callers(&self, name: &str) -> Result<Vec<QueryResult>> {
        self.follow(name, EdgeType::Calls, Direction::Incoming, |_| true)
    }

    /// Symbols called by a method
    pub fn find_callees(&self, name: &str) -> Result<Vec<QueryResult>> {
        self.follow(name, EdgeType::Calls, Direction::Outgoing, |_| true)
    }

    /// Types implementing an interface
    pub fn find_implementations(&self, interface: &str) -> Result<Vec<QueryResult>> {
        self.follow(interface, EdgeType::Implements, Direction::Incoming, |n| n.node_type.is_type())
    }

    /// Types deriving directly from a base type
    pub fn find_derived_types(&self, base: &str) -> Result<Vec<QueryResult>> {
        self.follow(base, EdgeType::Inherits, Direction::Incoming, |n| n.node_type.is_type())
    }

    /// Members contained in a type
    pub fn find_members(&self, type_name: &str) -> Result<Vec<QueryResult>> {
        self.follow(type_name, EdgeType::Contains, Direction::Outgoing, |n| {
            !n.node_type.is_type() && n.node_type != NodeType::File
        })
    }

    /// Substring search over node names
    pub fn search(&self, pattern: &str, node_type: Option<NodeType>, limit: usize) -> Result<Vec<QueryResult>> {
        Ok(self
            .db
            .search_nodes(&self.workspace_path, pattern, node_type, limit)?
            .into_iter()
            .map(QueryResult::from)
            .collect())
    }

    pub fn stats(&self) -> Result<GraphStats> {
        self.db.get_stats(&self.workspace_path)
    }

    fn follow(
        &self,
        name: &str,
        edge_type: EdgeType,
        direction: Direction,
        keep: impl Fn(&CodeNode) -> bool,
    ) -> Result<Vec<QueryResult>> {
        let targets = self.db.find_nodes_by_name(&self.workspace_path, name)?;

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for target in targets {
            let edges = match direction {
                Direction::Outgoing => self.db.find_edges_from(&target.id, Some(edge_type))?,
                Direction::Incoming => self.db.find_edges_to(&target.id, Some(edge_type))?,
            };
            for edge in edges {
                let other = match direction {
                    Direction::Outgoing => &edge.target_id,
                    Direction::Incoming => &edge.source_id,
                };
                if !seen.insert(other.clone()) {
                    continue;
                }
                if let Some(node) = self.db.get_node(other)? {
                    if keep(&node) {
                        results.push(QueryResult::from(node));
                    }
                }
            }
        }

        Ok(results)
    }
}
