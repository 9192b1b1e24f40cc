use anyhow::Result;
use tracing::{info, warn};

use crate::mcp::server::McpServer;
use crate::workspace::Workspace;

/// Start MCP server with stdio transport
pub async fn serve_stdio(project: String) -> Result<()> {
    let workspace = Workspace::open(&project)?;
    info!("MCP server (stdio) for project: {}", workspace.root().display());

    if !workspace.database_path().exists() {
        warn!(
            "No graph indexed yet; call semgraph_index or run 'semgraph index --project {}' first",
            project
        );
    }

    let server = McpServer::new(workspace);
    server.run().await?;

    Ok(())
}
