// Read-only impact analysis that precedes a rename

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::synth::is_valid_identifier;
use super::{invalid, RefactorContext};
use crate::compiler::{Symbol, TypeKind};
use crate::error::{Candidate, RefactorError};
use crate::resolver::SymbolQuery;

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRenameRequest {
    #[serde(flatten)]
    pub symbol: SymbolQuery,
    pub new_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// `WorkflowStep` for `Workflow`
    NamePrefix,
    /// `IWorkflow`, `IWorkflowService` for `Workflow`
    InterfacePrefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedSymbol {
    pub kind: String,
    pub name: String,
    pub qualified_name: String,
    pub file: Option<String>,
    pub relation: Relation,
    /// Never measured for related symbols; always `null`
    pub reference_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanStep {
    RenameSymbol {
        qualified_name: String,
        from: String,
        to: String,
    },
    RenameFile {
        from: String,
        to: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BlastRadius {
    pub symbol: Candidate,
    pub new_name: String,
    pub total_references: usize,
    pub files_affected: Vec<String>,
    pub related_symbols: Vec<RelatedSymbol>,
    pub suggested_plan: Vec<PlanStep>,
    pub awaits_confirmation: bool,
}

/// Outcome of `analyze_rename`: the blast radius, or why there is none
#[derive(Debug, Clone, Serialize)]
pub struct RenameAnalysis {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub blast_radius: Option<BlastRadius>,
}

fn relation(candidate: &Symbol, primary: &str) -> Option<Relation> {
    if candidate.name.starts_with(primary) {
        return Some(Relation::NamePrefix);
    }
    let is_interface = candidate.type_kind() == Some(TypeKind::Interface);
    match candidate.name.strip_prefix('I') {
        Some(rest) if is_interface && rest.starts_with(primary) => Some(Relation::InterfacePrefix),
        _ => None,
    }
}

/// New name for a related symbol: the primary fragment replaced once
pub fn derived_name(name: &str, primary: &str, new_name: &str, relation: Relation) -> String {
    match relation {
        Relation::InterfacePrefix => match name.strip_prefix('I') {
            Some(rest) => format!("I{}", rest.replacen(primary, new_name, 1)),
            None => name.replacen(primary, new_name, 1),
        },
        Relation::NamePrefix => name.replacen(primary, new_name, 1),
    }
}

/// A file-rename step when the file stem equals the symbol name, ignoring case
fn file_step(file: Option<&Path>, name: &str, new_name: &str) -> Option<PlanStep> {
    let file = file?;
    let stem = file.file_stem()?.to_str()?;
    if !stem.eq_ignore_ascii_case(name) {
        return None;
    }
    let extension = file.extension().and_then(|e| e.to_str()).unwrap_or("cs");
    Some(PlanStep::RenameFile {
        from: file.display().to_string(),
        to: file.with_file_name(format!("{}.{}", new_name, extension)).display().to_string(),
    })
}

/// Read-only impact report for a proposed rename.
///
/// A missing symbol or an invalid name comes back as an unsuccessful
/// analysis; ambiguity is raised as `RefactorError::Ambiguous`.
pub fn analyze_rename(ctx: &RefactorContext, request: &AnalyzeRenameRequest) -> Result<RenameAnalysis> {
    match measure(ctx, request) {
        Ok(radius) => Ok(RenameAnalysis {
            success: true,
            error: None,
            blast_radius: Some(radius),
        }),
        Err(e) => match e.downcast_ref::<RefactorError>() {
            Some(RefactorError::Ambiguous { .. }) | Some(RefactorError::Persistence { .. }) => Err(e),
            _ => {
                warn!("Rename analysis failed: {:#}", e);
                Ok(RenameAnalysis {
                    success: false,
                    error: Some(format!("{:#}", e)),
                    blast_radius: None,
                })
            }
        },
    }
}

fn measure(ctx: &RefactorContext, request: &AnalyzeRenameRequest) -> Result<BlastRadius> {
    let new_name = request.new_name.trim();
    if !is_valid_identifier(new_name) {
        return invalid(format!("'{}' is not a valid identifier", new_name));
    }
    let symbol = ctx.require(&request.symbol, "symbol")?;
    let primary = symbol.name.as_str();

    // The only reference count taken
    let references = ctx.compiler.find_references(&symbol)?;
    let mut files: BTreeSet<String> = references.iter().map(|r| r.file.display().to_string()).collect();
    if let Some(file) = symbol.file() {
        files.insert(file.display().to_string());
    }

    let limit = ctx.config.refactor.max_related_symbols;
    let mut related: Vec<(Symbol, Relation)> = Vec::new();
    for candidate in ctx.compiler.all_types()? {
        if related.len() >= limit {
            debug!("Related-symbol scan capped at {}", limit);
            break;
        }
        if candidate == symbol {
            continue;
        }
        if let Some(rel) = relation(&candidate, primary) {
            related.push((candidate, rel));
        }
    }

    let mut plan = vec![PlanStep::RenameSymbol {
        qualified_name: symbol.display_name.clone(),
        from: symbol.name.clone(),
        to: new_name.to_string(),
    }];
    for (candidate, rel) in &related {
        plan.push(PlanStep::RenameSymbol {
            qualified_name: candidate.display_name.clone(),
            from: candidate.name.clone(),
            to: derived_name(&candidate.name, primary, new_name, *rel),
        });
    }
    plan.extend(file_step(symbol.file(), &symbol.name, new_name));
    for (candidate, rel) in &related {
        let to = derived_name(&candidate.name, primary, new_name, *rel);
        plan.extend(file_step(candidate.file(), &candidate.name, &to));
    }

    info!(
        "Blast radius for {}: {} reference(s), {} related symbol(s)",
        symbol,
        references.len(),
        related.len()
    );

    Ok(BlastRadius {
        symbol: Candidate {
            kind: symbol.kind.as_str().to_string(),
            qualified_name: symbol.display_name.clone(),
            file: symbol.file().map(|f| f.display().to_string()),
        },
        new_name: new_name.to_string(),
        total_references: references.len(),
        files_affected: files.into_iter().collect(),
        related_symbols: related
            .iter()
            .map(|(candidate, rel)| RelatedSymbol {
                kind: candidate.kind.as_str().to_string(),
                name: candidate.name.clone(),
                qualified_name: candidate.display_name.clone(),
                file: candidate.file().map(|f| f.display().to_string()),
                relation: *rel,
                reference_count: None,
            })
            .collect(),
        suggested_plan: plan,
        awaits_confirmation: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refactor::testing::{read, workspace};

    const WORKFLOW: &str = "namespace Flow\n{\n    public class Workflow : IWorkflow { }\n}\n";
    const STEP: &str = "namespace Flow\n{\n    public class WorkflowStep { Workflow owner = new Workflow(); }\n}\n";
    const CONTRACTS: &str = "namespace Flow\n{\n    public interface IWorkflow { }\n    public interface IWorkflowService { }\n    public class OldWorkflow { }\n    public class Invoice { }\n}\n";

    fn request(name: &str, new_name: &str) -> AnalyzeRenameRequest {
        AnalyzeRenameRequest {
            symbol: SymbolQuery::named(name),
            new_name: new_name.to_string(),
        }
    }

    fn measured(ctx: &RefactorContext, request: &AnalyzeRenameRequest) -> BlastRadius {
        let analysis = analyze_rename(ctx, request).unwrap();
        assert!(analysis.success, "{:?}", analysis.error);
        analysis.blast_radius.unwrap()
    }

    #[test]
    fn test_related_symbols_by_naming_convention() {
        let (dir, ctx) = workspace(&[
            ("Workflow.cs", WORKFLOW),
            ("WorkflowStep.cs", STEP),
            ("Contracts.cs", CONTRACTS),
        ]);
        let radius = measured(&ctx, &request("Workflow", "Story"));

        assert!(radius.awaits_confirmation);
        assert_eq!(radius.total_references, 2);
        assert_eq!(radius.files_affected.len(), 2);

        let mut names: Vec<&str> = radius.related_symbols.iter().map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["IWorkflow", "IWorkflowService", "WorkflowStep"]);
        assert!(radius.related_symbols.iter().all(|r| r.reference_count.is_none()));

        let renames: Vec<(String, String)> = radius
            .suggested_plan
            .iter()
            .filter_map(|s| match s {
                PlanStep::RenameSymbol { from, to, .. } => Some((from.clone(), to.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(renames[0], ("Workflow".to_string(), "Story".to_string()));
        assert!(renames.contains(&("IWorkflow".to_string(), "IStory".to_string())));
        assert!(renames.contains(&("IWorkflowService".to_string(), "IStoryService".to_string())));
        assert!(renames.contains(&("WorkflowStep".to_string(), "StoryStep".to_string())));

        let file_steps: Vec<&PlanStep> = radius
            .suggested_plan
            .iter()
            .filter(|s| matches!(s, PlanStep::RenameFile { .. }))
            .collect();
        assert_eq!(file_steps.len(), 2);

        // Read-only
        assert_eq!(read(&dir, "Workflow.cs"), WORKFLOW);
    }

    #[test]
    fn test_related_scan_is_capped() {
        let (_dir, mut ctx) = workspace(&[("Workflow.cs", WORKFLOW), ("Contracts.cs", CONTRACTS)]);
        let mut config = (*ctx.config).clone();
        config.refactor.max_related_symbols = 1;
        ctx.config = std::sync::Arc::new(config);

        let radius = measured(&ctx, &request("Workflow", "Story"));
        assert_eq!(radius.related_symbols.len(), 1);
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(derived_name("IWorkflow", "Workflow", "Story", Relation::InterfacePrefix), "IStory");
        assert_eq!(derived_name("WorkflowWorkflow", "Workflow", "Story", Relation::NamePrefix), "StoryWorkflow");
    }

    #[test]
    fn test_unknown_symbol_is_a_failed_analysis() {
        let (_dir, ctx) = workspace(&[("Workflow.cs", WORKFLOW)]);
        let missing = analyze_rename(&ctx, &request("Pipeline", "Story")).unwrap();
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("symbol not found: Pipeline"));
        assert!(missing.blast_radius.is_none());

        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("suggested_plan").is_none());

        let bad_name = analyze_rename(&ctx, &request("Workflow", "2nd")).unwrap();
        assert!(!bad_name.success);
        assert!(bad_name.error.unwrap().contains("not a valid identifier"));
    }

    #[test]
    fn test_ambiguous_symbol_is_raised() {
        let (_dir, ctx) = workspace(&[
            ("A.cs", "namespace Billing { public class Invoice { } }"),
            ("B.cs", "namespace Legacy { public class Invoice { } }"),
        ]);
        let err = analyze_rename(&ctx, &request("Invoice", "Bill")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RefactorError>(),
            Some(RefactorError::Ambiguous { .. })
        ));
    }
}
