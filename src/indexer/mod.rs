// Graph building: Solution -> Project -> File -> Type -> Member

pub mod registry;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use self::registry::{
    file_key, namespace_key, project_key, solution_key, symbol_key, NodeHandle, NodeRegistry,
};
use crate::compiler::{path_key, CompilerService, Document, Project, Symbol, TypeDeclaration};
use crate::config::Config;
use crate::error::RefactorError;
use crate::index::{normalize_workspace_path, CodeEdge, CodeNode, EdgeType, GraphStore, NodeType};

/// Modifiers recorded on graph nodes
const NODE_MODIFIERS: &[&str] = &[
    "public",
    "protected",
    "internal",
    "private",
    "static",
    "abstract",
    "virtual",
    "override",
    "sealed",
];

/// Counters accumulated during one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub projects: usize,
    pub skipped_projects: usize,
    pub files: usize,
    pub skipped_files: usize,
    pub types: usize,
    pub members: usize,
    pub placeholders: usize,
    pub nodes: usize,
    pub edges: usize,
}

/// Result of one indexing run; edges only reference nodes of the same batch
#[derive(Debug, Clone, Serialize)]
pub struct GraphBatch {
    pub workspace_path: String,
    pub nodes: Vec<CodeNode>,
    pub edges: Vec<CodeEdge>,
    pub warnings: Vec<String>,
    pub stats: BuildStats,
    pub cancelled: bool,
}

/// Builds the code graph of a workspace through a compiler service
pub struct GraphBuilder {
    compiler: Arc<dyn CompilerService>,
    config: Arc<Config>,
}

impl GraphBuilder {
    pub fn new(compiler: Arc<dyn CompilerService>, config: Arc<Config>) -> Self {
        Self { compiler, config }
    }

    /// Walk the solution and produce nodes and edges without persisting them
    pub fn build(&self, workspace_path: &str, cancel: &CancellationToken) -> Result<GraphBatch> {
        let solution = self.compiler.solution().context("Failed to load solution")?;
        info!(
            "Building code graph for '{}' ({} project(s))",
            solution.name,
            solution.projects.len()
        );

        let mut run = BuildRun::new(workspace_path);
        let solution_node = run.registry.define(&solution_key(&solution.path), |id| {
            let path = solution.path.display().to_string();
            CodeNode::new(id, NodeType::Solution, &solution.name, &path, workspace_path)
                .with_file(&path, None)
        });

        let mut cancelled = false;
        for project in &solution.projects {
            if cancel.is_cancelled() {
                info!("Indexing cancelled before project '{}'", project.name);
                cancelled = true;
                break;
            }
            if !self.build_project(&mut run, solution_node, project, cancel) {
                cancelled = true;
                break;
            }
        }

        if !cancelled {
            let by_file: HashMap<String, &Project> = solution
                .projects
                .iter()
                .map(|p| (path_key(&p.file_path), p))
                .collect();
            for project in &solution.projects {
                let Some(source) = run.registry.get(&project_key(&project.name)) else {
                    continue;
                };
                for reference in &project.project_references {
                    let target = by_file
                        .get(&path_key(reference))
                        .and_then(|p| run.registry.get(&project_key(&p.name)));
                    match target {
                        Some(target) => run.edge(EdgeType::References, source, target),
                        None => debug!(
                            "Project reference {} of '{}' has no node",
                            reference.display(),
                            project.name
                        ),
                    }
                }
            }
        }

        let batch = run.finish(cancelled);
        info!(
            "Graph built: {} node(s), {} edge(s), {} warning(s){}",
            batch.stats.nodes,
            batch.stats.edges,
            batch.warnings.len(),
            if batch.cancelled { " (cancelled)" } else { "" }
        );
        Ok(batch)
    }

    /// Returns false when cancellation interrupted the project
    fn build_project(
        &self,
        run: &mut BuildRun,
        solution_node: NodeHandle,
        project: &Project,
        cancel: &CancellationToken,
    ) -> bool {
        let workspace = run.registry.workspace_path().to_string();
        let project_node = run.registry.define(&project_key(&project.name), |id| {
            CodeNode::new(id, NodeType::Project, &project.name, &project.name, &workspace)
                .with_file(&project.file_path.display().to_string(), None)
        });
        run.edge(EdgeType::Contains, solution_node, project_node);
        run.stats.projects += 1;

        let Some(view) = self.compiler.compiled_view(project) else {
            let warning = RefactorError::CompilationUnavailable {
                project: project.name.clone(),
            };
            warn!("{}; skipping its documents", warning);
            run.warnings.push(warning.to_string());
            run.stats.skipped_projects += 1;
            return true;
        };

        debug!("Indexing project '{}' ({} document(s))", project.name, project.documents.len());
        for document in &project.documents {
            if cancel.is_cancelled() {
                info!("Indexing cancelled inside project '{}'", project.name);
                return false;
            }
            let path = document.path.display().to_string();
            if self.config.is_generated(&path) {
                debug!("Skipping generated file {}", path);
                run.stats.skipped_files += 1;
                continue;
            }

            let file_node = Self::file_node(run, document);
            run.edge(EdgeType::Contains, project_node, file_node);
            run.stats.files += 1;

            for declaration in view.type_declarations(document) {
                Self::build_type(run, file_node, &declaration);
            }
        }
        true
    }

    fn file_node(run: &mut BuildRun, document: &Document) -> NodeHandle {
        let workspace = run.registry.workspace_path().to_string();
        let path = document.path.display().to_string();
        let name = document
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone());
        run.registry.define(&file_key(&document.path), |id| {
            CodeNode::new(id, NodeType::File, &name, &path, &workspace).with_file(&path, None)
        })
    }

    fn build_type(run: &mut BuildRun, file_node: NodeHandle, declaration: &TypeDeclaration) {
        // Unresolved declarations are skipped
        let Some(symbol) = declaration.symbol.as_ref() else {
            return;
        };

        let type_node = run.define_symbol(symbol, NodeType::for_type(declaration.kind));
        run.edge(EdgeType::Contains, file_node, type_node);
        run.stats.types += 1;

        if let Some(namespace) = symbol.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            let workspace = run.registry.workspace_path().to_string();
            let short = namespace.rsplit('.').next().unwrap_or(namespace);
            let (namespace_node, _) = run.registry.get_or_create(&namespace_key(namespace), |id| {
                CodeNode::new(id, NodeType::Namespace, short, namespace, &workspace)
            });
            run.edge(EdgeType::Declares, namespace_node, type_node);
        }

        if let Some(base) = declaration.base_type.as_ref().filter(|b| !b.is_universal_root()) {
            if let Some(base_node) = run.reference_symbol(base) {
                run.edge(EdgeType::Inherits, type_node, base_node);
            }
        }

        for interface in &declaration.interfaces {
            if let Some(interface_node) = run.reference_symbol(interface) {
                run.edge(EdgeType::Implements, type_node, interface_node);
            }
        }

        for member in &declaration.members {
            let Some(member_symbol) = member.symbol.as_ref() else {
                continue;
            };
            if member_symbol.is_implicit {
                continue;
            }
            let Some(node_type) = NodeType::for_symbol(member_symbol.kind) else {
                continue;
            };

            let member_node = run.define_symbol(member_symbol, node_type);
            run.edge(EdgeType::Contains, type_node, member_node);
            run.stats.members += 1;

            for callee in &member.invocations {
                if let Some(callee_node) = run.reference_symbol(callee) {
                    run.edge(EdgeType::Calls, member_node, callee_node);
                }
            }

            // Uses edges never create placeholders
            for created in &member.created_types {
                if let Some(type_node) = run.registry.get(&symbol_key(created)) {
                    run.edge(EdgeType::Uses, member_node, type_node);
                }
            }

            if let Some(overridden) = member.overridden.as_ref() {
                if let Some(base_node) = run.registry.get(&symbol_key(overridden)) {
                    run.edge(EdgeType::Overrides, member_node, base_node);
                }
            }
        }
    }

    /// Build and persist in one commit
    pub fn index(
        &self,
        store: &mut dyn GraphStore,
        workspace_path: &str,
        cancel: &CancellationToken,
    ) -> Result<GraphBatch> {
        let batch = self.build(workspace_path, cancel)?;
        persist(store, &batch)?;
        Ok(batch)
    }

    /// Clear the workspace's stored graph, then index it again
    pub fn rebuild(
        &self,
        store: &mut dyn GraphStore,
        workspace_path: &str,
        cancel: &CancellationToken,
    ) -> Result<GraphBatch> {
        let workspace = normalize_workspace_path(workspace_path);
        store.clear_workspace_graph(&workspace).map_err(|e| {
            error!("Failed to clear graph of {}: {:#}", workspace, e);
            RefactorError::Persistence {
                workspace: workspace.clone(),
                source: e,
            }
        })?;
        self.index(store, workspace_path, cancel)
    }
}

fn persist(store: &mut dyn GraphStore, batch: &GraphBatch) -> Result<usize> {
    let write = |store: &mut dyn GraphStore| -> Result<usize> {
        for node in &batch.nodes {
            store.add_node(node.clone())?;
        }
        for edge in &batch.edges {
            store.add_edge(edge.clone())?;
        }
        store.save_changes()
    };

    match write(store) {
        Ok(written) => {
            debug!("Persisted {} row(s) for {}", written, batch.workspace_path);
            Ok(written)
        }
        Err(e) => {
            error!("Failed to persist graph of {}: {:#}", batch.workspace_path, e);
            Err(RefactorError::Persistence {
                workspace: batch.workspace_path.clone(),
                source: e,
            }
            .into())
        }
    }
}

/// Mutable state of one build; dropped when the batch is produced
struct BuildRun {
    registry: NodeRegistry,
    edges: Vec<(EdgeType, NodeHandle, NodeHandle)>,
    seen_edges: HashSet<(EdgeType, NodeHandle, NodeHandle)>,
    placeholders: HashSet<NodeHandle>,
    warnings: Vec<String>,
    stats: BuildStats,
}

impl BuildRun {
    fn new(workspace_path: &str) -> Self {
        Self {
            registry: NodeRegistry::new(workspace_path),
            edges: Vec::new(),
            seen_edges: HashSet::new(),
            placeholders: HashSet::new(),
            warnings: Vec::new(),
            stats: BuildStats::default(),
        }
    }

    fn edge(&mut self, edge_type: EdgeType, source: NodeHandle, target: NodeHandle) {
        if self.seen_edges.insert((edge_type, source, target)) {
            self.edges.push((edge_type, source, target));
        }
    }

    fn symbol_node(&self, id: String, symbol: &Symbol, node_type: NodeType) -> CodeNode {
        let modifiers: Vec<&str> = NODE_MODIFIERS
            .iter()
            .copied()
            .filter(|m| symbol.has_modifier(m))
            .collect();
        let mut node = CodeNode::new(
            id,
            node_type,
            &symbol.name,
            &symbol.display_name,
            self.registry.workspace_path(),
        )
        .with_signature(symbol.signature.as_deref())
        .with_modifiers(&modifiers);
        if let Some(location) = symbol.location.as_ref() {
            node = node.with_file(&location.file.display().to_string(), Some(location.line as u32));
        }
        node
    }

    /// Node for a visited declaration
    fn define_symbol(&mut self, symbol: &Symbol, node_type: NodeType) -> NodeHandle {
        let node = self.symbol_node(String::new(), symbol, node_type);
        let handle = self.registry.define(&symbol_key(symbol), |id| CodeNode { id, ..node });
        self.placeholders.remove(&handle);
        handle
    }

    /// Existing node for a referenced symbol, or a new placeholder
    fn reference_symbol(&mut self, symbol: &Symbol) -> Option<NodeHandle> {
        let node_type = NodeType::for_symbol(symbol.kind)?;
        let node = self.symbol_node(String::new(), symbol, node_type);
        let (handle, created) = self
            .registry
            .get_or_create(&symbol_key(symbol), |id| CodeNode { id, ..node });
        if created {
            self.placeholders.insert(handle);
        }
        Some(handle)
    }

    fn finish(self, cancelled: bool) -> GraphBatch {
        let workspace_path = self.registry.workspace_path().to_string();
        let mut stats = self.stats;
        stats.placeholders = self.placeholders.len();

        let edges: Vec<CodeEdge> = self
            .edges
            .iter()
            .enumerate()
            .map(|(ordinal, &(edge_type, source, target))| {
                let source_id = self.registry.node(source).id.clone();
                let target_id = self.registry.node(target).id.clone();
                CodeEdge {
                    id: edge_id(&workspace_path, ordinal, edge_type, &source_id, &target_id),
                    edge_type,
                    source_id,
                    target_id,
                    workspace_path: workspace_path.clone(),
                }
            })
            .collect();
        let nodes = self.registry.into_nodes();
        stats.nodes = nodes.len();
        stats.edges = edges.len();

        GraphBatch {
            workspace_path,
            nodes,
            edges,
            warnings: self.warnings,
            stats,
            cancelled,
        }
    }
}

fn edge_id(workspace: &str, ordinal: usize, edge_type: EdgeType, source: &str, target: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(workspace.as_bytes());
    hasher.update(b"\0");
    hasher.update(&(ordinal as u64).to_le_bytes());
    hasher.update(edge_type.as_str().as_bytes());
    hasher.update(source.as_bytes());
    hasher.update(b"\0");
    hasher.update(target.as_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}
