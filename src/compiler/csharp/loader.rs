// Solution discovery: .sln files, .csproj files or a bare directory

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::compiler::{path_key, Document, Project, ProjectId, Solution};
use crate::config::Config;

static SLN_PROJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"Project\("\{[^}]+\}"\)\s*=\s*"([^"]+)"\s*,\s*"([^"]+\.csproj)""#)
        .expect("valid solution project pattern")
});

static ROOT_NAMESPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<RootNamespace>\s*([^<]+?)\s*</RootNamespace>").expect("valid root namespace pattern")
});

static PROJECT_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<ProjectReference\s+Include\s*=\s*"([^"]+)""#).expect("valid project reference pattern")
});

/// Resolve `.` and `..` without touching the file system
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn windows_relative(base: &Path, raw: &str) -> PathBuf {
    normalize_path(&base.join(raw.replace('\\', "/")))
}

/// Turn a directory or file stem into a namespace-safe identifier chain
pub fn sanitize_namespace(raw: &str) -> String {
    raw.split(['.', '/', '\\'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut ident: String = part
                .chars()
                .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
                .collect();
            if ident.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                ident.insert(0, '_');
            }
            ident
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Load the solution rooted at `root` (a directory or a `.sln` file)
pub fn load_solution(root: &Path, config: &Config) -> Result<Solution> {
    let (directory, sln) = if root.is_file() {
        let dir = root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        (dir, Some(root.to_path_buf()))
    } else {
        let sln = std::fs::read_dir(root)
            .with_context(|| format!("Failed to list {}", root.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().map(|e| e == "sln").unwrap_or(false))
            .min();
        (root.to_path_buf(), sln)
    };

    let mut project_files: Vec<(Option<String>, PathBuf)> = match &sln {
        Some(sln) => {
            let text = std::fs::read_to_string(sln)
                .with_context(|| format!("Failed to read solution {}", sln.display()))?;
            SLN_PROJECT
                .captures_iter(&text)
                .map(|cap| (Some(cap[1].to_string()), windows_relative(&directory, &cap[2])))
                .filter(|(_, path)| path.exists())
                .collect()
        }
        None => WalkDir::new(&directory)
            .into_iter()
            .filter_entry(|e| !is_excluded(config, &directory, e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map(|x| x == "csproj").unwrap_or(false))
            .map(|e| (None, e.path().to_path_buf()))
            .collect(),
    };
    project_files.sort_by(|a, b| a.1.cmp(&b.1));

    let name = sln
        .as_ref()
        .and_then(|s| s.file_stem())
        .or_else(|| directory.file_name())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "workspace".to_string());

    let mut projects = Vec::new();
    if project_files.is_empty() {
        debug!("No project files under {}; using an implicit project", directory.display());
        projects.push(Project {
            id: ProjectId(0),
            name: name.clone(),
            file_path: directory.clone(),
            directory: directory.clone(),
            root_namespace: sanitize_namespace(&name),
            documents: Vec::new(),
            project_references: Vec::new(),
        });
    } else {
        for (index, (declared_name, file)) in project_files.into_iter().enumerate() {
            projects.push(read_project(ProjectId(index), declared_name, &file)?);
        }
    }

    let directories: Vec<PathBuf> = projects.iter().map(|p| p.directory.clone()).collect();
    for project in &mut projects {
        project.documents = discover_documents(project, &directories, &directory, config);
    }

    info!(
        "Loaded solution '{}' with {} project(s), {} document(s)",
        name,
        projects.len(),
        projects.iter().map(|p| p.documents.len()).sum::<usize>()
    );

    Ok(Solution {
        name,
        path: sln.unwrap_or_else(|| directory.clone()),
        root: directory,
        projects,
    })
}

fn read_project(id: ProjectId, declared_name: Option<String>, file: &Path) -> Result<Project> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read project {}", file.display()))?;
    let directory = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = declared_name.unwrap_or_else(|| stem.clone());
    let root_namespace = ROOT_NAMESPACE
        .captures(&text)
        .map(|cap| cap[1].to_string())
        .unwrap_or_else(|| sanitize_namespace(&stem));
    let project_references = PROJECT_REFERENCE
        .captures_iter(&text)
        .map(|cap| windows_relative(&directory, &cap[1]))
        .collect();

    Ok(Project {
        id,
        name,
        file_path: file.to_path_buf(),
        directory,
        root_namespace,
        documents: Vec::new(),
        project_references,
    })
}

fn is_excluded(config: &Config, root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut text = relative.to_string_lossy().replace('\\', "/");
    if path.is_dir() {
        text.push('/');
    }
    !text.is_empty() && text != "/" && config.is_excluded(&text)
}

/// `.cs` files under the project directory that no nested project claims
fn discover_documents(project: &Project, directories: &[PathBuf], root: &Path, config: &Config) -> Vec<Document> {
    let own = path_key(&project.directory);
    let nested: Vec<String> = directories
        .iter()
        .map(|d| path_key(d))
        .filter(|d| d != &own && d.starts_with(&format!("{}/", own)))
        .collect();

    let mut documents: Vec<Document> = WalkDir::new(&project.directory)
        .into_iter()
        .filter_entry(|e| {
            let key = path_key(e.path());
            !nested.contains(&key) && !is_excluded(config, root, e.path())
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map(|x| x == "cs").unwrap_or(false))
        .map(|e| Document {
            path: e.path().to_path_buf(),
            project: project.id,
        })
        .collect();
    documents.sort_by(|a, b| a.path.cmp(&b.path));
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_loads_projects_from_csproj_files() {
        let dir = tempdir().unwrap();
        let app = dir.path().join("App");
        let core = dir.path().join("Core");
        fs::create_dir_all(app.join("obj")).unwrap();
        fs::create_dir_all(&core).unwrap();
        fs::write(
            app.join("App.csproj"),
            r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup><RootNamespace>Acme.App</RootNamespace></PropertyGroup>
  <ItemGroup><ProjectReference Include="..\Core\Core.csproj" /></ItemGroup>
</Project>"#,
        )
        .unwrap();
        fs::write(core.join("Core.csproj"), "<Project Sdk=\"Microsoft.NET.Sdk\" />").unwrap();
        fs::write(app.join("Program.cs"), "class Program {}").unwrap();
        fs::write(app.join("obj").join("App.AssemblyInfo.cs"), "").unwrap();
        fs::write(core.join("Clock.cs"), "class Clock {}").unwrap();

        let solution = load_solution(dir.path(), &Config::default()).unwrap();
        assert_eq!(solution.projects.len(), 2);

        let app = solution.projects.iter().find(|p| p.name == "App").unwrap();
        assert_eq!(app.root_namespace, "Acme.App");
        assert_eq!(app.documents.len(), 1);
        assert_eq!(app.project_references.len(), 1);
        assert_eq!(
            path_key(&app.project_references[0]),
            path_key(&core.join("Core.csproj"))
        );

        let core_project = solution.projects.iter().find(|p| p.name == "Core").unwrap();
        assert_eq!(core_project.root_namespace, "Core");
        assert_eq!(core_project.documents.len(), 1);
    }

    #[test]
    fn test_solution_file_lists_projects() {
        let dir = tempdir().unwrap();
        let lib = dir.path().join("src").join("Lib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("Lib.csproj"), "<Project />").unwrap();
        fs::write(
            dir.path().join("All.sln"),
            "Project(\"{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}\") = \"Library\", \"src\\Lib\\Lib.csproj\", \"{1}\"\nEndProject\n",
        )
        .unwrap();

        let solution = load_solution(dir.path(), &Config::default()).unwrap();
        assert_eq!(solution.name, "All");
        assert_eq!(solution.projects.len(), 1);
        assert_eq!(solution.projects[0].name, "Library");
    }

    #[test]
    fn test_bare_directory_is_one_project() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("A.cs"), "class A {}").unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin").join("B.cs"), "class B {}").unwrap();

        let solution = load_solution(dir.path(), &Config::default()).unwrap();
        assert_eq!(solution.projects.len(), 1);
        assert_eq!(solution.projects[0].documents.len(), 1);
    }

    #[test]
    fn test_sanitize_namespace() {
        assert_eq!(sanitize_namespace("My-App"), "My_App");
        assert_eq!(sanitize_namespace("Models/2024"), "Models._2024");
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
    }
}
