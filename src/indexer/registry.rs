// Canonical key registry: one node per entity within a single indexing run

use std::collections::HashMap;
use std::path::Path;

use crate::compiler::{path_key, Symbol};
use crate::index::{normalize_workspace_path, CodeNode};

/// Index of a node in the registry arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

pub fn solution_key(path: &Path) -> String {
    format!("solution:{}", path_key(path))
}

pub fn project_key(name: &str) -> String {
    format!("project:{}", name)
}

pub fn file_key(path: &Path) -> String {
    format!("file:{}", path_key(path))
}

pub fn namespace_key(qualified_name: &str) -> String {
    format!("namespace:{}", qualified_name)
}

/// `type:` for type symbols, `member:` for everything else
pub fn symbol_key(symbol: &Symbol) -> String {
    if symbol.is_type() {
        format!("type:{}", symbol.display_name)
    } else {
        format!("member:{}", symbol.display_name)
    }
}

/// Stable opaque id for a canonical key within a workspace
pub fn node_id(workspace_path: &str, key: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(workspace_path.as_bytes());
    hasher.update(b"\0");
    hasher.update(key.as_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}

/// Call-scoped arena of nodes keyed by canonical key
pub struct NodeRegistry {
    workspace_path: String,
    nodes: Vec<CodeNode>,
    index: HashMap<String, NodeHandle>,
}

impl NodeRegistry {
    pub fn new(workspace_path: &str) -> Self {
        Self {
            workspace_path: normalize_workspace_path(workspace_path),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn workspace_path(&self) -> &str {
        &self.workspace_path
    }

    pub fn get(&self, key: &str) -> Option<NodeHandle> {
        self.index.get(key).copied()
    }

    pub fn node(&self, handle: NodeHandle) -> &CodeNode {
        &self.nodes[handle.0]
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Return the node for `key`, creating it with `make` on first use.
    /// The boolean is true when the node was created by this call.
    pub fn get_or_create(&mut self, key: &str, make: impl FnOnce(String) -> CodeNode) -> (NodeHandle, bool) {
        if let Some(handle) = self.get(key) {
            return (handle, false);
        }
        let handle = NodeHandle(self.nodes.len());
        self.nodes.push(make(node_id(&self.workspace_path, key)));
        self.index.insert(key.to_string(), handle);
        (handle, true)
    }

    /// Create the node for a visited declaration, or fill in a placeholder
    /// created earlier under the same key. The id is kept.
    pub fn define(&mut self, key: &str, make: impl FnOnce(String) -> CodeNode) -> NodeHandle {
        match self.get(key) {
            Some(handle) => {
                let id = self.nodes[handle.0].id.clone();
                self.nodes[handle.0] = make(id);
                handle
            }
            None => self.get_or_create(key, make).0,
        }
    }

    pub fn into_nodes(self) -> Vec<CodeNode> {
        self.nodes
    }
}
