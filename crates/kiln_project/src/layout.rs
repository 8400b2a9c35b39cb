//! Project layout resolution from `pyproject.toml` and `Cargo.toml`.

use crate::error::ProjectError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

const PYPROJECT: &str = "pyproject.toml";

/// A resolved native extension project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    /// The directory holding `pyproject.toml`.
    pub project_dir: PathBuf,
    /// The Cargo manifest the extension is built from.
    pub manifest_path: PathBuf,
    /// Dotted module name, e.g. `package.sub._native`.
    pub module_full_name: String,
    /// Root of the managed-language sources, or the project directory.
    pub python_dir: PathBuf,
    /// Top-level package directory for mixed projects.
    pub python_module: Option<PathBuf>,
    /// Where the built extension is placed inside the source tree of a mixed
    /// project. `None` for pure native projects.
    pub extension_module_dir: Option<PathBuf>,
    /// Every local path dependency, transitively, sorted and deduplicated.
    pub path_dependencies: Vec<PathBuf>,
}

impl ProjectLayout {
    /// The top-level package name (first segment of the module name).
    pub fn package_name(&self) -> &str {
        self.module_full_name
            .split('.')
            .next()
            .unwrap_or(&self.module_full_name)
    }

    /// The extension module's own name (last segment of the module name).
    pub fn module_name(&self) -> &str {
        self.module_full_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.module_full_name)
    }

    /// True if the project mixes managed-language and native sources.
    pub fn is_mixed(&self) -> bool {
        self.extension_module_dir.is_some()
    }
}

/// Locates the Cargo manifest of the project in `project_dir`.
///
/// Checks `tool.maturin.manifest-path` first, then `Cargo.toml` and
/// `rust/Cargo.toml`.
pub fn find_cargo_manifest(project_dir: &Path) -> Option<PathBuf> {
    let pyproject_path = project_dir.join(PYPROJECT);
    if let Ok(content) = std::fs::read_to_string(&pyproject_path) {
        if content.contains("manifest-path") {
            match parse_toml(&pyproject_path, &content) {
                Ok(pyproject) => {
                    if let Some(rel) = get_str(&pyproject, &["tool", "maturin", "manifest-path"]) {
                        return Some(project_dir.join(rel));
                    }
                }
                Err(e) => tracing::debug!("{e}"),
            }
        }
    }
    ["Cargo.toml", "rust/Cargo.toml"]
        .iter()
        .map(|rel| project_dir.join(rel))
        .find(|p| p.is_file())
}

/// Cheap check that `dir` looks like a project, without validating its contents.
pub fn is_maybe_project(dir: &Path) -> bool {
    dir.join(PYPROJECT).is_file() && find_cargo_manifest(dir).is_some()
}

/// Resolves the project rooted at `project_dir`.
pub fn resolve_project(project_dir: &Path) -> Result<ProjectLayout, ProjectError> {
    let pyproject_path = project_dir.join(PYPROJECT);
    if !pyproject_path.is_file() {
        return Err(ProjectError::NoPyproject {
            dir: project_dir.to_path_buf(),
        });
    }
    let pyproject = load_toml(&pyproject_path)?;
    if get(&pyproject, &["build-system", "requires"])
        .and_then(Value::as_array)
        .is_none()
    {
        return Err(ProjectError::InvalidPyproject {
            path: pyproject_path,
            reason: "build-system.requires is missing".to_string(),
        });
    }

    let manifest_path =
        find_cargo_manifest(project_dir).ok_or_else(|| ProjectError::NoCargoManifest {
            dir: project_dir.to_path_buf(),
        })?;
    let cargo = load_toml(&manifest_path)?;

    let module_full_name =
        resolve_module_name(&pyproject, &cargo).ok_or_else(|| ProjectError::UnresolvedModuleName {
            dir: project_dir.to_path_buf(),
        })?;

    let python_dir = resolve_python_dir(project_dir, &pyproject);
    let (python_module, extension_module_dir) = match module_full_name.rsplit_once('.') {
        Some((parent, _)) => {
            let package = parent.split('.').next().unwrap_or(parent);
            let ext_dir = parent
                .split('.')
                .fold(python_dir.clone(), |dir, part| dir.join(part));
            (python_dir.join(package), ext_dir)
        }
        None => (
            python_dir.join(&module_full_name),
            python_dir.join(&module_full_name),
        ),
    };
    let (python_module, extension_module_dir) = if python_module.exists() {
        (Some(python_module), Some(extension_module_dir))
    } else {
        (None, None)
    };

    let manifest_dir = manifest_path.parent().unwrap_or(project_dir);
    let immediate = immediate_path_dependencies(manifest_dir, &cargo);
    let path_dependencies = all_path_dependencies(immediate)?;

    Ok(ProjectLayout {
        project_dir: project_dir.to_path_buf(),
        manifest_path,
        module_full_name,
        python_dir,
        python_module,
        extension_module_dir,
        path_dependencies,
    })
}

fn resolve_module_name(pyproject: &Table, cargo: &Table) -> Option<String> {
    get_str(pyproject, &["tool", "maturin", "module-name"])
        .or_else(|| get_str(cargo, &["lib", "name"]))
        .or_else(|| get_str(pyproject, &["project", "name"]))
        .or_else(|| get_str(cargo, &["package", "name"]))
        .map(str::to_string)
}

fn resolve_python_dir(project_dir: &Path, pyproject: &Table) -> PathBuf {
    if let Some(root) = get_str(pyproject, &["tool", "maturin", "python-source"]) {
        return project_dir.join(root);
    }
    let Some(project_name) = get_str(pyproject, &["project", "name"]) else {
        return project_dir.to_path_buf();
    };

    let package_name = project_name.replace('-', "_");
    let mut candidates = vec![format!("src/{package_name}")];
    let packages =
        get(pyproject, &["tool", "maturin", "python-packages"]).and_then(Value::as_array);
    if let Some(packages) = packages {
        candidates.extend(packages.iter().filter_map(Value::as_str).map(str::to_string));
    }
    let python_src_found = candidates
        .iter()
        .any(|p| project_dir.join(p).join("__init__.py").is_file());
    if project_dir.join("rust/Cargo.toml").exists() && python_src_found {
        project_dir.join("src")
    } else {
        project_dir.to_path_buf()
    }
}

fn immediate_path_dependencies(manifest_dir: &Path, cargo: &Table) -> Vec<PathBuf> {
    let Some(deps) = cargo.get("dependencies").and_then(Value::as_table) else {
        return Vec::new();
    };
    deps.values()
        .filter_map(|dep| dep.as_table()?.get("path")?.as_str())
        .map(|rel| {
            let joined = manifest_dir.join(rel);
            std::fs::canonicalize(&joined).unwrap_or(joined)
        })
        .collect()
}

fn all_path_dependencies(immediate: Vec<PathBuf>) -> Result<Vec<PathBuf>, ProjectError> {
    let mut seen = BTreeSet::new();
    let mut to_search = immediate;
    while let Some(dir) = to_search.pop() {
        if !seen.insert(dir.clone()) {
            continue;
        }
        let manifest = dir.join("Cargo.toml");
        if manifest.is_file() {
            let cargo = load_toml(&manifest)?;
            to_search.extend(immediate_path_dependencies(&dir, &cargo));
        }
    }
    Ok(seen.into_iter().collect())
}

fn load_toml(path: &Path) -> Result<Table, ProjectError> {
    let content = std::fs::read_to_string(path).map_err(|e| ProjectError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_toml(path, &content)
}

fn parse_toml(path: &Path, content: &str) -> Result<Table, ProjectError> {
    content.parse::<Table>().map_err(|e| ProjectError::Toml {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn get<'a>(table: &'a Table, keys: &[&str]) -> Option<&'a Value> {
    let (last, parents) = keys.split_last()?;
    let mut current = table;
    for key in parents {
        current = current.get(*key)?.as_table()?;
    }
    current.get(*last)
}

fn get_str<'a>(table: &'a Table, keys: &[&str]) -> Option<&'a str> {
    get(table, keys)?.as_str()
}
