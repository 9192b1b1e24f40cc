// CLI command implementations

pub mod index;
pub mod query;
pub mod refactor;
pub mod serve;
pub mod stats;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::resolver::SymbolQuery;

/// A symbol name plus optional disambiguation hints
#[derive(Debug, Clone, Args)]
pub struct SymbolArgs {
    /// Symbol name
    pub name: String,

    /// Name of the declaring type
    #[arg(long = "in")]
    pub containing_type: Option<String>,

    /// File declaring the symbol
    #[arg(long)]
    pub file: Option<std::path::PathBuf>,
}

impl From<SymbolArgs> for SymbolQuery {
    fn from(args: SymbolArgs) -> Self {
        SymbolQuery {
            name: args.name,
            containing_type: args.containing_type,
            file_path: args.file,
        }
    }
}

/// Flags shared by every mutating command
#[derive(Debug, Clone, Copy, Args)]
pub struct ApplyArgs {
    /// Show diffs without writing anything
    #[arg(long)]
    pub preview: bool,

    /// Build and scan for residual occurrences after applying
    #[arg(long)]
    pub validate: bool,
}

/// Results go to stdout as pretty JSON; logs stay on stderr
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
