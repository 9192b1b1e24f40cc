use rusqlite::{Connection, Result};
use tracing::{debug, info};

/// SQLite schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    info!("Initializing semgraph schema v{}", SCHEMA_VERSION);

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    // Create schema version table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Check current version
    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    debug!("Current schema version: {}", current_version);

    if current_version < SCHEMA_VERSION {
        info!("Upgrading schema from v{} to v{}", current_version, SCHEMA_VERSION);
        apply_migrations(conn, current_version)?;
    }

    Ok(())
}

/// Apply migrations from current version to latest
fn apply_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration v{}", version);
        match version {
            1 => create_v1_schema(conn)?,
            2 => create_v2_indexes(conn)?,
            _ => unreachable!("Unknown schema version: {}", version),
        }

        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }

    Ok(())
}

/// Create v1 schema: graph nodes and edges
fn create_v1_schema(conn: &Connection) -> Result<()> {
    info!("Creating v1 schema tables");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS code_nodes (
            id TEXT PRIMARY KEY,
            workspace_path TEXT NOT NULL,
            node_type TEXT NOT NULL,
            name TEXT NOT NULL,
            full_name TEXT NOT NULL,
            file_path TEXT,
            line_number INTEGER,
            signature TEXT,
            modifiers TEXT NOT NULL DEFAULT '',
            indexed_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS code_edges (
            id TEXT PRIMARY KEY,
            workspace_path TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            indexed_at TEXT NOT NULL,
            FOREIGN KEY (source_id) REFERENCES code_nodes(id) ON DELETE CASCADE,
            FOREIGN KEY (target_id) REFERENCES code_nodes(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_code_nodes_workspace
         ON code_nodes(workspace_path)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_code_edges_source
         ON code_edges(source_id, edge_type)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_code_edges_target
         ON code_edges(target_id, edge_type)",
        [],
    )?;

    info!("v1 schema created successfully");

    Ok(())
}

/// v2: lookups by name and per-workspace edge cleanup
fn create_v2_indexes(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_code_nodes_name
         ON code_nodes(workspace_path, name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_code_nodes_type
         ON code_nodes(workspace_path, node_type)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_code_edges_workspace
         ON code_edges(workspace_path)",
        [],
    )?;

    Ok(())
}

/// Drop all tables (for testing/rebuilding)
pub fn drop_schema(conn: &Connection) -> Result<()> {
    info!("Dropping all schema tables");

    conn.execute("DROP TABLE IF EXISTS code_edges", [])?;
    conn.execute("DROP TABLE IF EXISTS code_nodes", [])?;
    conn.execute("DROP TABLE IF EXISTS schema_version", [])?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert!(tables.contains(&"code_nodes".to_string()));
        assert!(tables.contains(&"code_edges".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_drop_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        drop_schema(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 0);
    }

    #[test]
    fn test_idempotent_init() {
        let conn = Connection::open_in_memory().unwrap();

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let versions: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();

        assert_eq!(versions, SCHEMA_VERSION);
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO code_edges (id, workspace_path, edge_type, source_id, target_id, indexed_at)
             VALUES ('e', 'w', 'calls', 'missing', 'also-missing', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
