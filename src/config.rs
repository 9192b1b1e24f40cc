// Configuration management for semgraph

use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name looked up in the workspace root
pub const CONFIG_FILE_NAME: &str = ".semgraph.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub indexing: IndexingConfig,
    pub refactor: RefactorConfig,
    pub logging: LoggingConfig,
    pub mcp: McpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Directories and files never loaded into a solution
    pub exclude: Vec<String>,
    /// File-name suffixes treated as generated code by the graph builder
    pub generated_patterns: Vec<String>,
    /// Graph database file, relative to the workspace root
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefactorConfig {
    /// Build command run by `validate`; empty disables the build step
    pub build_command: String,
    pub build_args: Vec<String>,
    pub build_timeout_secs: u64,
    /// Build output is truncated to this many characters
    pub max_build_output: usize,
    /// Extensions scanned for residual occurrences after a rename
    pub residual_extensions: Vec<String>,
    pub max_residuals: usize,
    /// Cap on related symbols collected by blast-radius analysis
    pub max_related_symbols: usize,
    /// Reference locations reported when safe delete refuses
    pub max_reported_references: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub transport: String,
    pub port: u16,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
            root: ".".to_string(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude: vec![
                "bin/".to_string(),
                "obj/".to_string(),
                ".git/".to_string(),
                ".vs/".to_string(),
                "node_modules/".to_string(),
            ],
            generated_patterns: vec![
                ".g.cs".to_string(),
                ".g.i.cs".to_string(),
                ".designer.cs".to_string(),
                ".generated.cs".to_string(),
                "assemblyinfo.cs".to_string(),
            ],
            database: ".semgraph.db".to_string(),
        }
    }
}

impl Default for RefactorConfig {
    fn default() -> Self {
        Self {
            build_command: "dotnet".to_string(),
            build_args: vec!["build".to_string(), "--nologo".to_string()],
            build_timeout_secs: 300,
            max_build_output: 4000,
            residual_extensions: vec!["cs".to_string()],
            max_residuals: 100,
            max_related_symbols: 50,
            max_reported_references: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            port: 3000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            indexing: IndexingConfig::default(),
            refactor: RefactorConfig::default(),
            logging: LoggingConfig::default(),
            mcp: McpConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory
    /// Looks for .semgraph.toml in the project root
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(CONFIG_FILE_NAME);

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::debug!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Check if a path is excluded from solution loading
    pub fn is_excluded(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        self.indexing
            .exclude
            .iter()
            .any(|pattern| matches_pattern(&normalized, pattern))
    }

    /// Check if a document looks like generated code or a build artifact
    pub fn is_generated(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/").to_lowercase();
        if normalized
            .split('/')
            .any(|segment| segment == "bin" || segment == "obj")
        {
            return true;
        }

        let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);
        self.indexing
            .generated_patterns
            .iter()
            .any(|pattern| file_name.ends_with(&pattern.to_lowercase()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.name.is_empty() {
            return Err(anyhow::anyhow!("Project name cannot be empty"));
        }

        if self.indexing.database.is_empty() {
            return Err(anyhow::anyhow!("Database file name cannot be empty"));
        }

        if self.refactor.build_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Build timeout must be greater than 0"));
        }
        if self.refactor.max_related_symbols == 0 {
            return Err(anyhow::anyhow!("Related symbol cap must be greater than 0"));
        }
        if self.refactor.max_reported_references == 0 {
            return Err(anyhow::anyhow!("Reported reference cap must be greater than 0"));
        }
        if self.refactor.residual_extensions.is_empty() {
            return Err(anyhow::anyhow!("At least one residual scan extension is required"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }

        let valid_transports = ["stdio"];
        if !valid_transports.contains(&self.mcp.transport.as_str()) {
            return Err(anyhow::anyhow!("Invalid MCP transport: {}", self.mcp.transport));
        }
        if self.mcp.port == 0 {
            return Err(anyhow::anyhow!("MCP port must be greater than 0"));
        }

        Ok(())
    }
}

/// Simple pattern matching (directory prefixes, `*.ext` and plain substrings)
fn matches_pattern(path: &str, pattern: &str) -> bool {
    if pattern.ends_with('/') {
        let dir = pattern.trim_end_matches('/');
        path.starts_with(pattern) || path.contains(&format!("/{}/", dir))
    } else if let Some(ext) = pattern.strip_prefix("*.") {
        path.ends_with(&format!(".{}", ext))
    } else {
        path.contains(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.name, "unnamed-project");
        assert_eq!(config.refactor.max_related_symbols, 50);
        assert_eq!(config.refactor.max_reported_references, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_exclusion_patterns() {
        let config = Config::default();

        assert!(config.is_excluded("src/App/bin/Debug/App.dll"));
        assert!(config.is_excluded("obj/project.assets.json"));
        assert!(config.is_excluded("C:\\repo\\.git\\config"));
        assert!(!config.is_excluded("src/App/Orders/Order.cs"));
    }

    #[test]
    fn test_generated_heuristic() {
        let config = Config::default();

        assert!(config.is_generated("/repo/App/obj/Debug/net8.0/App.AssemblyInfo.cs"));
        assert!(config.is_generated("/repo/App/Forms/Main.Designer.cs"));
        assert!(config.is_generated("/repo/App/Views/Index.g.cs"));
        assert!(!config.is_generated("/repo/App/Orders/Order.cs"));
        assert!(!config.is_generated("/repo/App/Binary/Reader.cs"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[refactor]\nbuild_command = \"\"\nmax_related_symbols = 5\n",
        )
        .unwrap();

        let config = Config::from_project_dir(dir.path());
        assert_eq!(config.refactor.build_command, "");
        assert_eq!(config.refactor.max_related_symbols, 5);
        assert_eq!(config.indexing.database, ".semgraph.db");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.project.name = "".to_string();
        assert!(config.validate().is_err());
        config.project.name = "test".to_string();

        config.refactor.max_related_symbols = 0;
        assert!(config.validate().is_err());
        config.refactor.max_related_symbols = 50;

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "info".to_string();

        config.mcp.transport = "http".to_string();
        assert!(config.validate().is_err());
        config.mcp.transport = "stdio".to_string();

        assert!(config.validate().is_ok());
    }
}
