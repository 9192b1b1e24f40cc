use anyhow::{Context, Result};
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::schema::init_schema;
use super::{normalize_workspace_path, CodeEdge, CodeNode, EdgeType, GraphStore, NodeType};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

const NODE_COLUMNS: &str =
    "id, node_type, name, full_name, file_path, line_number, signature, modifiers, workspace_path";

const EDGE_COLUMNS: &str = "id, edge_type, source_id, target_id, workspace_path";

/// Pooled access to the graph database
#[derive(Clone)]
pub struct GraphDatabase {
    pool: ConnectionPool,
    db_path: PathBuf,
}

impl GraphDatabase {
    /// Create or open a database
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .context("Failed to create connection pool")?;

        {
            let conn = pool.get().context("Failed to get connection")?;
            init_schema(&conn).context("Failed to initialize schema")?;
        }

        Ok(Self { pool, db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("Failed to get connection from pool")
    }

    /// Get node by ID
    pub fn get_node(&self, id: &str) -> Result<Option<CodeNode>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM code_nodes WHERE id = ?1", NODE_COLUMNS))?;
        let node = stmt.query_row([id], row_to_node).optional()?;
        Ok(node)
    }

    /// Nodes whose simple name or full name equals `name`
    pub fn find_nodes_by_name(&self, workspace_path: &str, name: &str) -> Result<Vec<CodeNode>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM code_nodes
             WHERE workspace_path = ?1 AND (name = ?2 OR full_name = ?2)
             ORDER BY full_name",
            NODE_COLUMNS
        ))?;

        let nodes = stmt
            .query_map(params![normalize_workspace_path(workspace_path), name], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(nodes)
    }

    /// Substring search over names, optionally restricted to one node type
    pub fn search_nodes(
        &self,
        workspace_path: &str,
        pattern: &str,
        node_type: Option<NodeType>,
        limit: usize,
    ) -> Result<Vec<CodeNode>> {
        let conn = self.get_conn()?;
        let like = format!("%{}%", pattern.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM code_nodes
             WHERE workspace_path = ?1
               AND (name LIKE ?2 ESCAPE '\\' OR full_name LIKE ?2 ESCAPE '\\')
               AND (?3 IS NULL OR node_type = ?3)
             ORDER BY length(name), full_name
             LIMIT ?4",
            NODE_COLUMNS
        ))?;

        let nodes = stmt
            .query_map(
                params![
                    normalize_workspace_path(workspace_path),
                    like,
                    node_type.map(|t| t.as_str()),
                    limit as i64
                ],
                row_to_node,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(nodes)
    }

    /// Find edges leaving a node
    pub fn find_edges_from(&self, source_id: &str, edge_type: Option<EdgeType>) -> Result<Vec<CodeEdge>> {
        self.find_edges("source_id", source_id, edge_type)
    }

    /// Find edges arriving at a node
    pub fn find_edges_to(&self, target_id: &str, edge_type: Option<EdgeType>) -> Result<Vec<CodeEdge>> {
        self.find_edges("target_id", target_id, edge_type)
    }

    fn find_edges(&self, column: &str, id: &str, edge_type: Option<EdgeType>) -> Result<Vec<CodeEdge>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM code_edges
             WHERE {} = ?1 AND (?2 IS NULL OR edge_type = ?2)
             ORDER BY rowid",
            EDGE_COLUMNS, column
        ))?;

        let edges = stmt
            .query_map(params![id, edge_type.map(|t| t.as_str())], row_to_edge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(edges)
    }

    /// All nodes of a workspace
    pub fn workspace_nodes(&self, workspace_path: &str) -> Result<Vec<CodeNode>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM code_nodes WHERE workspace_path = ?1 ORDER BY rowid",
            NODE_COLUMNS
        ))?;
        let nodes = stmt
            .query_map([normalize_workspace_path(workspace_path)], row_to_node)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    /// All edges of a workspace
    pub fn workspace_edges(&self, workspace_path: &str) -> Result<Vec<CodeEdge>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM code_edges WHERE workspace_path = ?1 ORDER BY rowid",
            EDGE_COLUMNS
        ))?;
        let edges = stmt
            .query_map([normalize_workspace_path(workspace_path)], row_to_edge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    /// Get graph statistics for one workspace
    pub fn get_stats(&self, workspace_path: &str) -> Result<GraphStats> {
        let conn = self.get_conn()?;
        let workspace = normalize_workspace_path(workspace_path);

        let mut nodes_by_type = BTreeMap::new();
        let mut stmt = conn.prepare(
            "SELECT node_type, COUNT(*) FROM code_nodes WHERE workspace_path = ?1 GROUP BY node_type",
        )?;
        for row in stmt.query_map([&workspace], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (kind, count) = row?;
            nodes_by_type.insert(kind, count as usize);
        }

        let mut edges_by_type = BTreeMap::new();
        let mut stmt = conn.prepare(
            "SELECT edge_type, COUNT(*) FROM code_edges WHERE workspace_path = ?1 GROUP BY edge_type",
        )?;
        for row in stmt.query_map([&workspace], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (kind, count) = row?;
            edges_by_type.insert(kind, count as usize);
        }

        let last_indexed: Option<String> = conn.query_row(
            "SELECT MAX(indexed_at) FROM code_nodes WHERE workspace_path = ?1",
            [&workspace],
            |row| row.get(0),
        )?;

        Ok(GraphStats {
            workspace_path: workspace,
            total_nodes: nodes_by_type.values().sum(),
            total_edges: edges_by_type.values().sum(),
            nodes_by_type,
            edges_by_type,
            last_indexed,
        })
    }
}

/// Graph statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub workspace_path: String,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
    pub last_indexed: Option<String>,
}

/// Buffered graph writer; everything lands in one transaction on `save_changes`
pub struct SqliteGraphStore {
    db: GraphDatabase,
    clears: Vec<String>,
    nodes: Vec<CodeNode>,
    edges: Vec<CodeEdge>,
    node_ids: HashSet<String>,
}

impl SqliteGraphStore {
    pub fn new(db: GraphDatabase) -> Self {
        Self {
            db,
            clears: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            node_ids: HashSet::new(),
        }
    }

    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(GraphDatabase::new(db_path)?))
    }

    pub fn database(&self) -> &GraphDatabase {
        &self.db
    }

    #[cfg(test)]
    pub fn pending(&self) -> (usize, usize) {
        (self.nodes.len(), self.edges.len())
    }

    fn reset(&mut self) {
        self.clears.clear();
        self.nodes.clear();
        self.edges.clear();
        self.node_ids.clear();
    }
}

impl GraphStore for SqliteGraphStore {
    fn add_node(&mut self, node: CodeNode) -> Result<()> {
        if !self.node_ids.insert(node.id.clone()) {
            anyhow::bail!("Duplicate node id {} ({})", node.id, node.full_name);
        }
        self.nodes.push(node);
        Ok(())
    }

    fn add_edge(&mut self, edge: CodeEdge) -> Result<()> {
        for endpoint in [&edge.source_id, &edge.target_id] {
            if !self.node_ids.contains(endpoint) {
                anyhow::bail!(
                    "Edge {} ({}) references node {} that was not added first",
                    edge.id,
                    edge.edge_type.as_str(),
                    endpoint
                );
            }
        }
        self.edges.push(edge);
        Ok(())
    }

    fn clear_workspace_graph(&mut self, workspace_path: &str) -> Result<()> {
        self.clears.push(normalize_workspace_path(workspace_path));
        Ok(())
    }

    fn save_changes(&mut self) -> Result<usize> {
        let mut conn = self.db.get_conn()?;
        let indexed_at = now();

        let tx = conn.transaction().context("Failed to begin transaction")?;
        for workspace in &self.clears {
            let removed = tx.execute("DELETE FROM code_edges WHERE workspace_path = ?1", [workspace])?;
            let removed_nodes = tx.execute("DELETE FROM code_nodes WHERE workspace_path = ?1", [workspace])?;
            debug!("Cleared {} node(s), {} edge(s) of {}", removed_nodes, removed, workspace);
        }

        {
            let mut insert_node = tx.prepare(
                "INSERT INTO code_nodes (
                    id, node_type, name, full_name, file_path, line_number, signature,
                    modifiers, workspace_path, indexed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    node_type = excluded.node_type,
                    name = excluded.name,
                    full_name = excluded.full_name,
                    file_path = excluded.file_path,
                    line_number = excluded.line_number,
                    signature = excluded.signature,
                    modifiers = excluded.modifiers,
                    indexed_at = excluded.indexed_at",
            )?;
            for node in &self.nodes {
                insert_node.execute(params![
                    node.id,
                    node.node_type.as_str(),
                    node.name,
                    node.full_name,
                    node.file_path,
                    node.line_number.map(i64::from),
                    node.signature,
                    node.modifiers,
                    node.workspace_path,
                    indexed_at,
                ])?;
            }

            let mut insert_edge = tx.prepare(
                "INSERT INTO code_edges (id, edge_type, source_id, target_id, workspace_path, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO NOTHING",
            )?;
            for edge in &self.edges {
                insert_edge.execute(params![
                    edge.id,
                    edge.edge_type.as_str(),
                    edge.source_id,
                    edge.target_id,
                    edge.workspace_path,
                    indexed_at,
                ])?;
            }
        }
        tx.commit().context("Failed to commit graph")?;

        let written = self.nodes.len() + self.edges.len();
        info!("Saved {} node(s) and {} edge(s)", self.nodes.len(), self.edges.len());
        self.reset();
        Ok(written)
    }
}

/// Convert database row to CodeNode
fn row_to_node(row: &Row) -> rusqlite::Result<CodeNode> {
    let type_str: String = row.get(1)?;
    let node_type = NodeType::from_str(&type_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(CodeNode {
        id: row.get(0)?,
        node_type,
        name: row.get(2)?,
        full_name: row.get(3)?,
        file_path: row.get(4)?,
        line_number: row.get::<_, Option<i64>>(5)?.map(|n| n as u32),
        signature: row.get(6)?,
        modifiers: row.get(7)?,
        workspace_path: row.get(8)?,
    })
}

/// Convert database row to CodeEdge
fn row_to_edge(row: &Row) -> rusqlite::Result<CodeEdge> {
    let type_str: String = row.get(1)?;
    let edge_type = EdgeType::from_str(&type_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(CodeEdge {
        id: row.get(0)?,
        edge_type,
        source_id: row.get(2)?,
        target_id: row.get(3)?,
        workspace_path: row.get(4)?,
    })
}

/// Current timestamp, RFC 3339
pub fn now() -> String {
    Utc::now().to_rfc3339()
}
