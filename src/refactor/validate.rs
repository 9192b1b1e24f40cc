// Post-apply validation: external build plus residual text scan

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub command: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub output: String,
}

/// A literal occurrence of an old name left behind by a rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Residual {
    pub file: String,
    pub line: usize,
    pub text: String,
}

/// Advisory findings attached to an otherwise successful result
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub residuals: Vec<Residual>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn truncate_output(output: &str, max: usize) -> String {
    let count = output.chars().count();
    if count <= max {
        return output.to_string();
    }
    // Build errors cluster at the end
    let tail: String = output.chars().skip(count - max).collect();
    format!("...[{} chars truncated]\n{}", count - max, tail)
}

/// Run the configured build command in `dir`
pub async fn run_build(config: &Config, dir: &Path) -> Option<BuildOutcome> {
    let refactor = &config.refactor;
    if refactor.build_command.is_empty() {
        debug!("No build command configured; skipping build validation");
        return None;
    }

    let command_display = std::iter::once(refactor.build_command.as_str())
        .chain(refactor.build_args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    info!("Running build: {} (in {})", command_display, dir.display());

    let mut cmd = Command::new(&refactor.build_command);
    cmd.args(&refactor.build_args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let timeout = Duration::from_secs(refactor.build_timeout_secs);
    let outcome = match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => BuildOutcome {
            command: command_display,
            success: false,
            exit_code: None,
            timed_out: true,
            duration_ms: start.elapsed().as_millis() as u64,
            output: format!("Build timed out after {}s", refactor.build_timeout_secs),
        },
        Ok(Err(e)) => BuildOutcome {
            command: command_display,
            success: false,
            exit_code: None,
            timed_out: false,
            duration_ms: start.elapsed().as_millis() as u64,
            output: format!("Failed to start build: {}", e),
        },
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                combined.push('\n');
                combined.push_str(&stderr);
            }
            BuildOutcome {
                command: command_display,
                success: output.status.success(),
                exit_code: output.status.code(),
                timed_out: false,
                duration_ms: start.elapsed().as_millis() as u64,
                output: truncate_output(combined.trim(), refactor.max_build_output),
            }
        }
    };

    if !outcome.success {
        warn!("Build validation failed: {}", outcome.command);
    }
    Some(outcome)
}

/// Whole-word occurrences of `name` in source files under `root`
pub fn scan_residuals(config: &Config, root: &Path, name: &str) -> Vec<Residual> {
    let pattern = match Regex::new(&format!(r"\b{}\b", regex::escape(name))) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!("Cannot scan for '{}': {}", name, e);
            return Vec::new();
        }
    };
    let limit = config.refactor.max_residuals;

    let mut residuals = Vec::new();
    let files = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let relative = e.path().strip_prefix(root).unwrap_or(e.path());
            let mut text = relative.to_string_lossy().replace('\\', "/");
            if e.file_type().is_dir() {
                text.push('/');
            }
            text == "/" || !config.is_excluded(&text)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|x| {
                    config
                        .refactor
                        .residual_extensions
                        .iter()
                        .any(|ext| x.eq_ignore_ascii_case(ext.as_str()))
                })
                .unwrap_or(false)
        });

    for entry in files {
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (index, line) in content.lines().enumerate() {
            if pattern.is_match(line) {
                residuals.push(Residual {
                    file: entry.path().display().to_string(),
                    line: index + 1,
                    text: line.trim().to_string(),
                });
                if residuals.len() >= limit {
                    return residuals;
                }
            }
        }
    }
    residuals
}

/// Build, then optionally scan for a name that should be gone
pub async fn validate(config: &Config, root: &Path, residual_name: Option<&str>) -> ValidationReport {
    let mut report = ValidationReport {
        build: run_build(config, root).await,
        ..ValidationReport::default()
    };

    if let Some(build) = &report.build {
        if !build.success {
            report.warnings.push(if build.timed_out {
                "Build timed out".to_string()
            } else {
                "Build failed after applying changes".to_string()
            });
        }
    }

    if let Some(name) = residual_name {
        report.residuals = scan_residuals(config, root, name);
        if !report.residuals.is_empty() {
            report.warnings.push(format!(
                "{} textual occurrence(s) of '{}' remain (comments and strings are not renamed)",
                report.residuals.len(),
                name
            ));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_scan_residuals_whole_words() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("A.cs"),
            "// Basket is gone\nclass Cart { }\nclass BasketItem { }\nvar s = \"Basket\";\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("obj")).unwrap();
        fs::write(dir.path().join("obj").join("B.cs"), "Basket").unwrap();
        fs::write(dir.path().join("notes.md"), "Basket").unwrap();

        let residuals = scan_residuals(&Config::default(), dir.path(), "Basket");
        assert_eq!(residuals.len(), 2);
        assert_eq!(residuals[0].line, 1);
        assert_eq!(residuals[1].text, "var s = \"Basket\";");
    }

    #[test]
    fn test_truncate_output_keeps_tail() {
        let text = format!("{}error CS0103", "x".repeat(100));
        let truncated = truncate_output(&text, 12);
        assert!(truncated.ends_with("error CS0103"));
        assert!(truncated.starts_with("...[100 chars truncated]"));
    }

    #[tokio::test]
    async fn test_build_skipped_without_command() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.refactor.build_command = String::new();

        let report = validate(&config, dir.path(), None).await;
        assert!(report.build.is_none());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_build_tool_is_advisory() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.refactor.build_command = "semgraph-no-such-build-tool".to_string();
        config.refactor.build_args = Vec::new();

        let report = validate(&config, dir.path(), None).await;
        let build = report.build.unwrap();
        assert!(!build.success);
        assert!(build.output.starts_with("Failed to start build"));
        assert_eq!(report.warnings.len(), 1);
    }
}
