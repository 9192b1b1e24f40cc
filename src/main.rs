use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};

use semgraph::cli::{self, ApplyArgs, SymbolArgs};
use semgraph::config::{Config, LoggingConfig};
use semgraph::refactor::blast_radius::AnalyzeRenameRequest;
use semgraph::refactor::constructor::GenerateConstructorRequest;
use semgraph::refactor::extract_interface::ExtractInterfaceRequest;
use semgraph::refactor::implement_interface::ImplementInterfaceRequest;
use semgraph::refactor::rename::RenameRequest;
use semgraph::refactor::safe_delete::SafeDeleteRequest;
use semgraph::refactor::signature::{ChangeSignatureRequest, NewParameter};
use semgraph::refactor::types::{CreateTypeRequest, MoveTypeRequest};

#[derive(Parser)]
#[command(name = "semgraph")]
#[command(author = "Intent Project Team")]
#[command(version)]
#[command(about = "Semantic code graph and reference-aware refactoring for C# via MCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the code graph of a workspace
    Index {
        /// Workspace directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Show graph statistics
    Stats {
        /// Workspace directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Query the graph
    Query {
        /// Query type: callers, callees, implementations, derived, members, search
        query_type: String,

        /// Target symbol (or pattern for search)
        target: String,

        /// Workspace directory
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format: json, text
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Node type filter for search
        #[arg(long)]
        node_type: Option<String>,

        /// Maximum results for search
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Report what a rename would touch without changing anything
    AnalyzeRename {
        #[command(flatten)]
        symbol: SymbolArgs,

        /// Proposed name
        new_name: String,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Rename a symbol and every reference to it
    Rename {
        #[command(flatten)]
        symbol: SymbolArgs,

        /// New name
        new_name: String,

        #[command(flatten)]
        apply: ApplyArgs,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Add or remove method parameters
    ChangeSignature {
        #[command(flatten)]
        method: SymbolArgs,

        /// Parameter to append, as "<type> <name>[=<default>]"
        #[arg(long = "add", value_parser = cli::refactor::parse_parameter)]
        add_parameters: Vec<NewParameter>,

        /// Parameter to remove, by name
        #[arg(long = "remove")]
        remove_parameters: Vec<String>,

        #[command(flatten)]
        apply: ApplyArgs,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Stub the members of an interface a class does not implement yet
    ImplementInterface {
        class_name: String,

        interface_name: String,

        /// File declaring the class
        #[arg(long)]
        file: Option<PathBuf>,

        /// Use explicit interface implementations
        #[arg(long)]
        explicit: bool,

        #[command(flatten)]
        apply: ApplyArgs,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Generate a constructor for read-only state
    GenerateConstructor {
        class_name: String,

        /// File declaring the class
        #[arg(long)]
        file: Option<PathBuf>,

        /// Only initialize these members
        #[arg(long = "member")]
        members: Vec<String>,

        #[command(flatten)]
        apply: ApplyArgs,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Extract an interface from a class's public instance members
    ExtractInterface {
        class_name: String,

        /// Interface name (default: I<ClassName>)
        #[arg(long = "name")]
        interface_name: Option<String>,

        /// File declaring the class
        #[arg(long)]
        file: Option<PathBuf>,

        /// Only extract these members
        #[arg(long = "member")]
        members: Vec<String>,

        /// File for the interface (default: next to the class)
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        apply: ApplyArgs,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Delete a symbol that nothing references
    SafeDelete {
        #[command(flatten)]
        symbol: SymbolArgs,

        #[command(flatten)]
        apply: ApplyArgs,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Create a type in a new file
    CreateType {
        name: String,

        /// class, interface, struct, record or "record struct"
        #[arg(short, long, default_value = "class")]
        kind: String,

        /// Directory relative to the workspace root
        #[arg(long)]
        directory: Option<PathBuf>,

        /// Namespace (default: derived from the directory)
        #[arg(long)]
        namespace: Option<String>,

        #[arg(long = "modifier")]
        modifiers: Vec<String>,

        #[arg(long)]
        base_type: Option<String>,

        #[arg(long = "interface")]
        interfaces: Vec<String>,

        #[arg(long = "attribute")]
        attributes: Vec<String>,

        #[arg(long = "type-parameter")]
        type_parameters: Vec<String>,

        #[arg(long = "using")]
        usings: Vec<String>,

        #[command(flatten)]
        apply: ApplyArgs,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Move a type into a file of its own
    MoveType {
        #[command(flatten)]
        symbol: SymbolArgs,

        /// Target file (default: <TypeName>.cs next to the current file)
        #[arg(long)]
        target: Option<PathBuf>,

        #[command(flatten)]
        apply: ApplyArgs,

        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Start the MCP server on stdio
    Serve {
        /// Workspace directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },
}

impl Commands {
    fn project(&self) -> &str {
        match self {
            Commands::Index { project }
            | Commands::Stats { project }
            | Commands::Query { project, .. }
            | Commands::AnalyzeRename { project, .. }
            | Commands::Rename { project, .. }
            | Commands::ChangeSignature { project, .. }
            | Commands::ImplementInterface { project, .. }
            | Commands::GenerateConstructor { project, .. }
            | Commands::ExtractInterface { project, .. }
            | Commands::SafeDelete { project, .. }
            | Commands::CreateType { project, .. }
            | Commands::MoveType { project, .. }
            | Commands::Serve { project } => project,
        }
    }
}

/// Flags win over the workspace config; output always goes to stderr
fn init_logging(debug: bool, verbose: bool, logging: &LoggingConfig) {
    let level = if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        logging.level.parse().unwrap_or(Level::WARN)
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_project_dir(cli.command.project());
    init_logging(cli.debug, cli.verbose, &config.logging);

    info!("semgraph v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Index { project } => {
            cli::index::index_project(project).await?;
        }

        Commands::Stats { project } => {
            cli::stats::show_stats(project).await?;
        }

        Commands::Query {
            query_type,
            target,
            project,
            format,
            node_type,
            limit,
        } => {
            cli::query::query_index(query_type, target, project, format, node_type, limit).await?;
        }

        Commands::AnalyzeRename {
            symbol,
            new_name,
            project,
        } => {
            let request = AnalyzeRenameRequest {
                symbol: symbol.into(),
                new_name,
            };
            cli::refactor::analyze_rename(project, request).await?;
        }

        Commands::Rename {
            symbol,
            new_name,
            apply,
            project,
        } => {
            let request = RenameRequest {
                symbol: symbol.into(),
                new_name,
                preview: apply.preview,
                validate: apply.validate,
            };
            cli::refactor::rename(project, request).await?;
        }

        Commands::ChangeSignature {
            method,
            add_parameters,
            remove_parameters,
            apply,
            project,
        } => {
            let request = ChangeSignatureRequest {
                method: method.into(),
                add_parameters,
                remove_parameters,
                preview: apply.preview,
                validate: apply.validate,
            };
            cli::refactor::change_signature(project, request).await?;
        }

        Commands::ImplementInterface {
            class_name,
            interface_name,
            file,
            explicit,
            apply,
            project,
        } => {
            let request = ImplementInterfaceRequest {
                class_name,
                interface_name,
                file_path: file,
                explicit,
                preview: apply.preview,
                validate: apply.validate,
            };
            cli::refactor::implement_interface(project, request).await?;
        }

        Commands::GenerateConstructor {
            class_name,
            file,
            members,
            apply,
            project,
        } => {
            let request = GenerateConstructorRequest {
                class_name,
                file_path: file,
                members: non_empty(members),
                preview: apply.preview,
                validate: apply.validate,
            };
            cli::refactor::generate_constructor(project, request).await?;
        }

        Commands::ExtractInterface {
            class_name,
            interface_name,
            file,
            members,
            output,
            apply,
            project,
        } => {
            let request = ExtractInterfaceRequest {
                class_name,
                file_path: file,
                interface_name,
                members: non_empty(members),
                output_path: output,
                preview: apply.preview,
                validate: apply.validate,
            };
            cli::refactor::extract_interface(project, request).await?;
        }

        Commands::SafeDelete {
            symbol,
            apply,
            project,
        } => {
            let request = SafeDeleteRequest {
                symbol: symbol.into(),
                preview: apply.preview,
                validate: apply.validate,
            };
            cli::refactor::safe_delete(project, request).await?;
        }

        Commands::CreateType {
            name,
            kind,
            directory,
            namespace,
            modifiers,
            base_type,
            interfaces,
            attributes,
            type_parameters,
            usings,
            apply,
            project,
        } => {
            let request = CreateTypeRequest {
                name,
                kind,
                directory,
                namespace,
                modifiers,
                base_type,
                interfaces,
                attributes,
                type_parameters,
                usings,
                preview: apply.preview,
                validate: apply.validate,
            };
            cli::refactor::create_type(project, request).await?;
        }

        Commands::MoveType {
            symbol,
            target,
            apply,
            project,
        } => {
            let request = MoveTypeRequest {
                symbol: symbol.into(),
                target_file: target,
                preview: apply.preview,
                validate: apply.validate,
            };
            cli::refactor::move_type(project, request).await?;
        }

        Commands::Serve { project } => {
            info!("Starting MCP server for project: {}", project);
            cli::serve::serve_stdio(project).await?;
        }
    }

    Ok(())
}
