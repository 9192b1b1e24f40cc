// Refactoring operations and their shared preview/apply/validate plumbing

pub mod blast_radius;
pub mod constructor;
pub mod edits;
pub mod extract_interface;
pub mod implement_interface;
pub mod rename;
pub mod safe_delete;
pub mod signature;
pub mod synth;
pub mod types;
pub mod validate;
pub mod write;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use self::edits::unified_diff;
use self::validate::ValidationReport;
use self::write::FileWriteCoordinator;
use crate::compiler::{path_key, CompilerService, ReferenceLocation, Symbol};
use crate::config::Config;
use crate::error::RefactorError;
use crate::resolver::{SymbolQuery, SymbolResolver};

/// Everything an operation needs: compiler, resolver, config and the write lock table
pub struct RefactorContext {
    pub compiler: Arc<dyn CompilerService>,
    pub resolver: SymbolResolver,
    pub config: Arc<Config>,
    pub writer: Arc<FileWriteCoordinator>,
    pub root: PathBuf,
}

impl RefactorContext {
    pub fn new(compiler: Arc<dyn CompilerService>, config: Arc<Config>, root: impl Into<PathBuf>) -> Self {
        Self::with_writer(compiler, config, root, FileWriteCoordinator::global())
    }

    pub fn with_writer(
        compiler: Arc<dyn CompilerService>,
        config: Arc<Config>,
        root: impl Into<PathBuf>,
        writer: Arc<FileWriteCoordinator>,
    ) -> Self {
        Self {
            resolver: SymbolResolver::new(compiler.clone()),
            compiler,
            config,
            writer,
            root: root.into(),
        }
    }

    /// Resolve or fail with NotFound; ambiguity propagates
    pub fn require(&self, query: &SymbolQuery, what: &'static str) -> Result<Symbol> {
        self.resolver
            .resolve_required(query)?
            .ok_or_else(|| RefactorError::not_found(what, query.name.clone()).into())
    }

    /// Current text of a workspace document as the compiler sees it
    pub fn document_text(&self, path: &Path) -> Result<String> {
        let state = self.compiler.workspace_state()?;
        if let Some(text) = state.documents.get(path) {
            return Ok(text.clone());
        }
        let wanted = path_key(path);
        state
            .documents
            .into_iter()
            .find(|(p, _)| path_key(p) == wanted)
            .map(|(_, text)| text)
            .ok_or_else(|| RefactorError::not_found("document", path.display().to_string()).into())
    }

    pub fn relative<'p>(&self, path: &'p Path) -> std::borrow::Cow<'p, str> {
        path.strip_prefix(&self.root).unwrap_or(path).to_string_lossy()
    }

    /// Preview or apply a change set, then optionally validate
    pub async fn finish(&self, message: impl Into<String>, changes: ChangeSet, options: &ApplyOptions) -> RefactorResult {
        let mut result = RefactorResult {
            success: true,
            message: message.into(),
            ..RefactorResult::default()
        };

        if options.preview {
            result.preview_diffs = changes
                .changes
                .iter()
                .map(|change| change.preview(&self.root))
                .collect();
            return result;
        }

        // Refuse the whole change set when any file it was computed from has moved on
        let mut stale = Vec::new();
        for change in &changes.changes {
            if let FileChange::Modify { path, before, .. } | FileChange::Delete { path, before } = change {
                match tokio::fs::read_to_string(path).await {
                    Ok(current) if current == *before => {}
                    _ => stale.push(RefactorError::StaleDocument { path: path.clone() }.to_string()),
                }
            }
        }
        if !stale.is_empty() {
            self.compiler.invalidate();
            warn!("Refusing to apply over external edits: {}", stale.join("; "));
            result.success = false;
            result.message = format!("{} (nothing was written)", stale.join("; "));
            result.error = Some(stale.join("; "));
            return result;
        }

        let writes = changes.changes.iter().map(|change| async move {
            let outcome = match change {
                FileChange::Modify { path, before, after } => self.writer.replace(path, before, after).await,
                FileChange::Create { path, after } => self.writer.create(path, after).await,
                FileChange::Delete { path, before } => self.writer.remove(path, before).await,
                FileChange::Move { from, to } => self.writer.rename(from, to).await,
            };
            (change, outcome)
        });

        let mut failures = Vec::new();
        for (change, outcome) in join_all(writes).await {
            match outcome {
                Ok(()) => match change {
                    FileChange::Modify { path, .. } => result.modified_files.push(path.display().to_string()),
                    FileChange::Create { path, .. } => result.created_files.push(path.display().to_string()),
                    FileChange::Delete { path, .. } => result.deleted_files.push(path.display().to_string()),
                    FileChange::Move { from, to } => {
                        result.deleted_files.push(from.display().to_string());
                        result.created_files.push(to.display().to_string());
                    }
                },
                Err(e) => {
                    warn!("Failed to apply change to {}: {}", change.path().display(), e);
                    failures.push(e.to_string());
                }
            }
        }

        // Some files may already be on disk either way
        self.compiler.invalidate();

        if !failures.is_empty() {
            result.success = false;
            result.error = Some(failures.join("; "));
            result.message = format!(
                "{} ({} of {} file change(s) failed; the rest were written)",
                result.message,
                failures.len(),
                changes.changes.len()
            );
            return result;
        }

        info!(
            "Applied {} file change(s): {}",
            changes.changes.len(),
            result.message
        );

        if options.validate {
            let report = validate::validate(&self.config, &self.root, options.residual_name.as_deref()).await;
            result.warnings.extend(report.warnings.iter().cloned());
            result.validation = Some(report);
        }
        result
    }
}

/// How `finish` treats a change set
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub preview: bool,
    pub validate: bool,
    /// Name the residual scan looks for after apply
    pub residual_name: Option<String>,
}

impl ApplyOptions {
    pub fn new(preview: bool, validate: bool) -> Self {
        Self {
            preview,
            validate,
            residual_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modify { path: PathBuf, before: String, after: String },
    Create { path: PathBuf, after: String },
    Delete { path: PathBuf, before: String },
    Move { from: PathBuf, to: PathBuf },
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modify { path, .. } | FileChange::Create { path, .. } | FileChange::Delete { path, .. } => path,
            FileChange::Move { from, .. } => from,
        }
    }

    fn preview(&self, root: &Path) -> PreviewDiff {
        let relative = |p: &Path| p.strip_prefix(root).unwrap_or(p).to_string_lossy().replace('\\', "/");
        match self {
            FileChange::Modify { path, before, after } => PreviewDiff {
                file: path.display().to_string(),
                change: "modify".to_string(),
                before: Some(before.clone()),
                after: Some(after.clone()),
                new_path: None,
                diff: Some(unified_diff(&relative(path), before, after)),
            },
            FileChange::Create { path, after } => PreviewDiff {
                file: path.display().to_string(),
                change: "create".to_string(),
                before: None,
                after: Some(after.clone()),
                new_path: None,
                diff: Some(unified_diff(&relative(path), "", after)),
            },
            FileChange::Delete { path, before } => PreviewDiff {
                file: path.display().to_string(),
                change: "delete".to_string(),
                before: Some(before.clone()),
                after: None,
                new_path: None,
                diff: Some(unified_diff(&relative(path), before, "")),
            },
            FileChange::Move { from, to } => PreviewDiff {
                file: from.display().to_string(),
                change: "move".to_string(),
                before: None,
                after: None,
                new_path: Some(to.display().to_string()),
                diff: None,
            },
        }
    }
}

/// Ordered file changes produced by one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changes: Vec<FileChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a modification unless the text is unchanged
    pub fn modify(&mut self, path: impl Into<PathBuf>, before: impl Into<String>, after: impl Into<String>) {
        let (before, after) = (before.into(), after.into());
        if before != after {
            self.changes.push(FileChange::Modify {
                path: path.into(),
                before,
                after,
            });
        }
    }

    pub fn create(&mut self, path: impl Into<PathBuf>, after: impl Into<String>) {
        self.changes.push(FileChange::Create {
            path: path.into(),
            after: after.into(),
        });
    }

    pub fn delete(&mut self, path: impl Into<PathBuf>, before: impl Into<String>) {
        self.changes.push(FileChange::Delete {
            path: path.into(),
            before: before.into(),
        });
    }

    pub fn relocate(&mut self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) {
        self.changes.push(FileChange::Move {
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewDiff {
    pub file: String,
    pub change: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// A reference that blocks a deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSummary {
    pub file: String,
    pub line: usize,
    pub text: String,
}

impl From<&ReferenceLocation> for ReferenceSummary {
    fn from(reference: &ReferenceLocation) -> Self {
        Self {
            file: reference.file.display().to_string(),
            line: reference.line,
            text: reference.line_text.clone(),
        }
    }
}

/// Outcome of a mutating operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefactorResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modified_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preview_diffs: Vec<PreviewDiff>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remaining_references: Vec<ReferenceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RefactorResult {
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            error: Some(message.clone()),
            message,
            ..Self::default()
        }
    }

    /// Successful result that touched nothing
    pub fn unchanged(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Fold recoverable errors into a failed result; ambiguity and persistence propagate
pub fn settle(outcome: Result<RefactorResult>) -> Result<RefactorResult> {
    match outcome {
        Ok(result) => Ok(result),
        Err(e) => match e.downcast_ref::<RefactorError>() {
            Some(RefactorError::Ambiguous { .. }) | Some(RefactorError::Persistence { .. }) => Err(e),
            _ => {
                warn!("Refactoring failed: {:#}", e);
                Ok(RefactorResult::failure(format!("{:#}", e)))
            }
        },
    }
}

/// Bail with InvalidRequest
pub(crate) fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(RefactorError::InvalidRequest(message.into()).into())
}

/// Source text of the file declaring `symbol`
pub(crate) fn declaring_source(ctx: &RefactorContext, symbol: &Symbol) -> Result<(PathBuf, String)> {
    let file = symbol
        .file()
        .ok_or_else(|| RefactorError::InvalidRequest(format!("{} is not declared in source", symbol.display_name)))?
        .to_path_buf();
    let text = ctx
        .document_text(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok((file, text))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::compiler::csharp::CSharpCompiler;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    /// A temp workspace with files, a C# compiler and a private lock table
    pub fn workspace(files: &[(&str, &str)]) -> (TempDir, RefactorContext) {
        let dir = tempdir().unwrap();
        for (name, text) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, text).unwrap();
        }
        let mut config = Config::default();
        config.refactor.build_command = String::new();
        let config = Arc::new(config);
        let compiler = Arc::new(CSharpCompiler::new(dir.path(), config.clone()));
        let ctx = RefactorContext::with_writer(compiler, config, dir.path(), Arc::new(FileWriteCoordinator::new()));
        (dir, ctx)
    }

    pub fn read(dir: &TempDir, name: &str) -> String {
        fs::read_to_string(dir.path().join(name)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_settle_propagates_only_ambiguity_and_persistence() {
        let not_found = settle(Err(RefactorError::not_found("symbol", "X").into())).unwrap();
        assert!(!not_found.success);
        assert_eq!(not_found.error.as_deref(), Some("symbol not found: X"));

        let ambiguous = settle(Err(RefactorError::Ambiguous {
            name: "X".to_string(),
            candidates: Vec::new(),
        }
        .into()));
        assert!(ambiguous.is_err());
    }

    #[test]
    fn test_change_set_skips_identical_text() {
        let mut changes = ChangeSet::new();
        changes.modify("A.cs", "same", "same");
        assert!(changes.is_empty());
        changes.modify("A.cs", "before", "after");
        assert_eq!(changes.len(), 1);
    }

    #[tokio::test]
    async fn test_preview_touches_nothing() {
        let (dir, ctx) = workspace(&[("A.cs", "class A { }\n")]);
        let mut changes = ChangeSet::new();
        changes.modify(dir.path().join("A.cs"), "class A { }\n", "class B { }\n");
        changes.create(dir.path().join("C.cs"), "class C { }\n");

        let result = ctx.finish("Preview", changes, &ApplyOptions::new(true, false)).await;
        assert!(result.success);
        assert_eq!(result.preview_diffs.len(), 2);
        assert!(result.preview_diffs[0].diff.as_ref().unwrap().contains("+class B { }"));
        assert_eq!(read(&dir, "A.cs"), "class A { }\n");
        assert!(!dir.path().join("C.cs").exists());

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("modified_files").is_none());
    }

    #[tokio::test]
    async fn test_apply_reports_partial_failure() {
        let (dir, ctx) = workspace(&[("A.cs", "class A { }\n"), ("B.cs", "class B { }\n")]);
        let mut changes = ChangeSet::new();
        changes.modify(dir.path().join("A.cs"), "class A { }\n", "class A2 { }\n");
        changes.create(dir.path().join("B.cs"), "class B { }\n");

        let result = ctx.finish("Apply", changes, &ApplyOptions::default()).await;
        assert!(!result.success);
        assert_eq!(result.modified_files.len(), 1);
        assert!(result.error.as_ref().unwrap().contains("already exists"));
        assert_eq!(read(&dir, "A.cs"), "class A2 { }\n");
    }

    #[tokio::test]
    async fn test_apply_refuses_files_edited_since_read() {
        let (dir, ctx) = workspace(&[("A.cs", "class A { }\n// local edit\n"), ("B.cs", "class B { }\n")]);
        let mut changes = ChangeSet::new();
        changes.modify(dir.path().join("A.cs"), "class A { }\n", "class A2 { }\n");
        changes.modify(dir.path().join("B.cs"), "class B { }\n", "class B2 { }\n");

        let result = ctx.finish("Apply", changes, &ApplyOptions::default()).await;
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("changed on disk"));
        assert!(result.modified_files.is_empty());
        assert_eq!(read(&dir, "A.cs"), "class A { }\n// local edit\n");
        assert_eq!(read(&dir, "B.cs"), "class B { }\n");
    }
}
