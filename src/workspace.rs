// One workspace: config, compiler adapter, graph database and refactoring context

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::compiler::csharp::loader::normalize_path;
use crate::compiler::csharp::CSharpCompiler;
use crate::compiler::CompilerService;
use crate::config::Config;
use crate::index::db::{GraphDatabase, GraphStats, SqliteGraphStore};
use crate::indexer::{GraphBatch, GraphBuilder};
use crate::query::engine::QueryEngine;
use crate::refactor::RefactorContext;

pub struct Workspace {
    root: PathBuf,
    config: Arc<Config>,
    compiler: Arc<dyn CompilerService>,
    context: RefactorContext,
    database: OnceCell<GraphDatabase>,
}

impl Workspace {
    /// Open a workspace directory, loading `.semgraph.toml` when present
    pub fn open(project: impl AsRef<Path>) -> Result<Self> {
        let project = project.as_ref();
        let root = std::fs::canonicalize(project)
            .with_context(|| format!("Workspace directory not found: {}", project.display()))?;
        let config = Config::from_project_dir(&root);
        config.validate().context("Invalid workspace configuration")?;
        Ok(Self::with_config(root, config))
    }

    pub fn with_config(root: impl Into<PathBuf>, config: Config) -> Self {
        let root = normalize_path(&root.into());
        let config = Arc::new(config);
        let compiler: Arc<dyn CompilerService> = Arc::new(CSharpCompiler::new(&root, config.clone()));
        let context = RefactorContext::new(compiler.clone(), config.clone(), &root);
        debug!("Workspace ready at {}", root.display());
        Self {
            root,
            config,
            compiler,
            context,
            database: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn context(&self) -> &RefactorContext {
        &self.context
    }

    pub fn workspace_path(&self) -> String {
        self.root.display().to_string()
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(&self.config.indexing.database)
    }

    /// Opened on first use so refactoring never creates a database file
    pub fn database(&self) -> Result<&GraphDatabase> {
        self.database.get_or_try_init(|| {
            let path = self.database_path();
            GraphDatabase::new(&path).with_context(|| format!("Failed to open graph database {}", path.display()))
        })
    }

    /// Rebuild the workspace graph from the current files on disk
    pub fn index(&self, cancel: &CancellationToken) -> Result<GraphBatch> {
        self.compiler.invalidate();
        let mut store = SqliteGraphStore::new(self.database()?.clone());
        let batch = GraphBuilder::new(self.compiler.clone(), self.config.clone()).rebuild(
            &mut store,
            &self.workspace_path(),
            cancel,
        )?;
        info!(
            "Indexed {}: {} nodes, {} edges",
            self.root.display(),
            batch.nodes.len(),
            batch.edges.len()
        );
        Ok(batch)
    }

    pub fn query(&self) -> Result<QueryEngine> {
        Ok(QueryEngine::new(self.database()?.clone(), &self.workspace_path()))
    }

    pub fn stats(&self) -> Result<GraphStats> {
        self.query()?.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE_NAME;
    use tempfile::tempdir;

    const ACCOUNTS: &str = r#"namespace Bank
{
    public interface IAccount { void Deposit(decimal amount); }

    public class Savings : IAccount
    {
        public void Deposit(decimal amount) { Audit(); }
        private void Audit() { }
    }
}
"#;

    #[test]
    fn test_refactoring_does_not_create_database() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Accounts.cs"), ACCOUNTS).unwrap();

        let workspace = Workspace::open(dir.path()).unwrap();
        assert!(workspace.context().compiler.all_types().unwrap().len() >= 2);
        assert!(!workspace.database_path().exists());
    }

    #[test]
    fn test_reindex_replaces_graph() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Accounts.cs"), ACCOUNTS).unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();

        let first = workspace.index(&CancellationToken::new()).unwrap();
        let stats = workspace.stats().unwrap();
        assert_eq!(stats.total_nodes, first.nodes.len());

        workspace.index(&CancellationToken::new()).unwrap();
        let again = workspace.stats().unwrap();
        assert_eq!(again.total_nodes, stats.total_nodes);
        assert_eq!(again.total_edges, stats.total_edges);

        // Every stored edge points at stored nodes
        let db = workspace.database().unwrap();
        let path = workspace.workspace_path();
        let ids: std::collections::HashSet<String> =
            db.workspace_nodes(&path).unwrap().into_iter().map(|n| n.id).collect();
        let edges = db.workspace_edges(&path).unwrap();
        assert_eq!(edges.len(), again.total_edges);
        assert!(edges.iter().all(|e| ids.contains(&e.source_id) && ids.contains(&e.target_id)));

        let callers = workspace.query().unwrap().find_callers("Audit").unwrap();
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].name, "Deposit");
    }

    #[test]
    fn test_workspace_config_is_applied() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[indexing]\ndatabase = \"graph.sqlite\"\n",
        )
        .unwrap();

        let workspace = Workspace::open(dir.path()).unwrap();
        assert!(workspace.database_path().ends_with("graph.sqlite"));
        assert!(Workspace::open(dir.path().join("missing")).is_err());
    }
}
