//! Semantic code graph and reference-aware refactoring for C# workspaces.
//!
//! The graph builder walks a solution through a [`compiler::CompilerService`]
//! and persists nodes and edges into SQLite; the refactoring operations in
//! [`refactor`] resolve symbols, compute text edits, preview or apply them
//! through the per-path write coordinator and optionally validate the result.

pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod mcp;
pub mod query;
pub mod refactor;
pub mod resolver;
pub mod workspace;
