//! Mapping import names onto projects and standalone source files.

use crate::layout::{is_maybe_project, ProjectLayout};
use crate::resolver::ProjectResolver;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Suffixes a loadable extension module may end with.
const EXTENSION_SUFFIXES: &[&str] = &[".so", ".pyd", ".dylib", ".dll"];

/// A target located for an import name.
#[derive(Debug, Clone)]
pub enum DiscoveredTarget {
    /// A project whose package name matches the import name.
    Project {
        /// The resolved project.
        layout: Arc<ProjectLayout>,
        /// Whether the project is installed in editable mode.
        editable: bool,
    },
    /// A standalone `<module>.rs` file.
    File {
        /// Last segment of the import name.
        module_name: String,
        /// Absolute path of the source file.
        path: PathBuf,
    },
}

/// A project linked from an installed package's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistInfoLink {
    /// The linked project, if the URL points at one.
    pub project_dir: Option<PathBuf>,
    /// Whether the package was installed in editable mode.
    pub editable: bool,
}

#[derive(Deserialize)]
struct DirectUrl {
    url: Option<String>,
    #[serde(default)]
    dir_info: DirInfo,
}

#[derive(Deserialize, Default)]
struct DirInfo {
    #[serde(default)]
    editable: bool,
}

/// Reads `<dir>/<package>*.dist-info/direct_url.json`.
///
/// Returns `None` when there is no such metadata. The link's `project_dir` is
/// set only for `file://` URLs that point at a project.
pub fn load_dist_info(dir: &Path, package_name: &str) -> Option<DistInfoLink> {
    let dist_info = std::fs::read_dir(dir).ok()?.flatten().find_map(|entry| {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        (name.starts_with(package_name) && name.ends_with(".dist-info")).then(|| entry.path())
    })?;
    let content = std::fs::read_to_string(dist_info.join("direct_url.json")).ok()?;
    let direct: DirectUrl = match serde_json::from_str(&content) {
        Ok(direct) => direct,
        Err(e) => {
            tracing::debug!("ignoring malformed {}/direct_url.json: {e}", dist_info.display());
            return None;
        }
    };
    let editable = direct.dir_info.editable;
    let project_dir = direct
        .url
        .as_deref()
        .and_then(|u| Url::parse(u).ok())
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
        .filter(|p| is_maybe_project(p));
    Some(DistInfoLink {
        project_dir,
        editable,
    })
}

/// Returns the nearest directory at or above `path` that looks like a project.
pub fn find_project_above(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|dir| is_maybe_project(dir))
        .map(Path::to_path_buf)
}

/// Returns `<search_path>/<module_name>.rs` if it exists.
pub fn find_standalone_file(search_path: &Path, module_name: &str) -> Option<PathBuf> {
    let candidate = search_path.join(format!("{module_name}.rs"));
    candidate.is_file().then_some(candidate)
}

/// Finds a built extension module named `module_name` in `dir`.
///
/// Matches `<module>.so` as well as tagged names such as
/// `<module>.cpython-312-x86_64-linux-gnu.so`.
pub fn find_extension_module(dir: &Path, module_name: &str) -> Option<PathBuf> {
    let prefix = format!("{module_name}.");
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(&prefix) && EXTENSION_SUFFIXES.iter().any(|s| name.ends_with(s))
        })
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Finds the installed extension module of a project.
///
/// Mixed projects place it in their extension module directory. Pure projects
/// are installed as a package directory under one of `install_dirs`.
pub fn find_installed_extension(
    layout: &ProjectLayout,
    install_dirs: &[PathBuf],
) -> Option<PathBuf> {
    if let Some(dir) = &layout.extension_module_dir {
        return find_extension_module(dir, layout.module_name());
    }
    install_dirs
        .iter()
        .map(|dir| dir.join(layout.package_name()))
        .find_map(|dir| find_extension_module(&dir, layout.module_name()))
}

/// Locates import targets over a list of search paths.
#[derive(Debug, Default)]
pub struct Discovery {
    resolver: ProjectResolver,
    enable_automatic_installation: bool,
}

impl Discovery {
    /// Creates a discovery pass. Non-editable installs are only considered
    /// when `enable_automatic_installation` is set.
    pub fn new(enable_automatic_installation: bool) -> Self {
        Self {
            resolver: ProjectResolver::new(),
            enable_automatic_installation,
        }
    }

    /// The underlying project resolver.
    pub fn resolver(&self) -> &ProjectResolver {
        &self.resolver
    }

    /// Locates the target for `fullname`.
    ///
    /// Top-level names are looked up as projects first: through installed
    /// package metadata, then as a project at or above each search path. Any
    /// name may then resolve to a standalone file named after its last segment.
    pub fn discover(&self, fullname: &str, search_paths: &[PathBuf]) -> Option<DiscoveredTarget> {
        if !fullname.contains('.') {
            if let Some(found) = self.discover_project(fullname, search_paths) {
                return Some(found);
            }
        }
        self.discover_file(fullname, search_paths)
    }

    /// Looks for a project providing the top-level package `package_name`.
    pub fn discover_project(
        &self,
        package_name: &str,
        search_paths: &[PathBuf],
    ) -> Option<DiscoveredTarget> {
        for search_path in search_paths {
            if let Some(link) = load_dist_info(search_path, package_name) {
                if let Some(dir) = &link.project_dir {
                    tracing::debug!("found project linked by dist-info: {}", dir.display());
                    if !link.editable && !self.enable_automatic_installation {
                        tracing::debug!(
                            "package not installed in editable mode and automatic \
                             installation is off, not rebuilding"
                        );
                    } else if let Some(found) =
                        self.project_if_named(dir, package_name, link.editable)
                    {
                        return Some(found);
                    }
                }
            }

            if let Some(dir) = find_project_above(search_path) {
                tracing::debug!(
                    "found project above the search path: {} ({})",
                    dir.display(),
                    search_path.display()
                );
                if let Some(found) = self.project_if_named(&dir, package_name, false) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Looks for `<last segment>.rs` in the search paths.
    pub fn discover_file(
        &self,
        fullname: &str,
        search_paths: &[PathBuf],
    ) -> Option<DiscoveredTarget> {
        let module_name = fullname.rsplit('.').next().unwrap_or(fullname);
        search_paths.iter().find_map(|search_path| {
            let path = find_standalone_file(search_path, module_name)?;
            let path = std::fs::canonicalize(&path).unwrap_or(path);
            Some(DiscoveredTarget::File {
                module_name: module_name.to_string(),
                path,
            })
        })
    }

    fn project_if_named(
        &self,
        dir: &Path,
        package_name: &str,
        editable: bool,
    ) -> Option<DiscoveredTarget> {
        let layout = self.resolver.resolve(dir)?;
        if layout.package_name() != package_name {
            tracing::debug!(
                "package name {:?} of project does not match {package_name:?}, not importing",
                layout.package_name()
            );
            return None;
        }
        Some(DiscoveredTarget::Project { layout, editable })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_project(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join("pyproject.toml"),
            "[build-system]\nrequires = [\"maturin\"]\n",
        )
        .unwrap();
        fs::write(dir.join("Cargo.toml"), format!("[package]\nname = \"{name}\"\n")).unwrap();
    }

    fn write_direct_url(site: &Path, dist: &str, json: &str) {
        let info = site.join(dist);
        fs::create_dir_all(&info).unwrap();
        fs::write(info.join("direct_url.json"), json).unwrap();
    }

    #[test]
    fn dist_info_links_editable_project() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("proj");
        make_project(&project, "fast");
        let site = root.path().join("site");
        let url = Url::from_file_path(&project).unwrap();
        write_direct_url(
            &site,
            "fast-0.1.0.dist-info",
            &format!(r#"{{"url": "{url}", "dir_info": {{"editable": true}}}}"#),
        );
        let link = load_dist_info(&site, "fast").unwrap();
        assert_eq!(link.project_dir, Some(project));
        assert!(link.editable);
    }

    #[test]
    fn dist_info_ignores_remote_urls() {
        let site = tempfile::tempdir().unwrap();
        write_direct_url(
            site.path(),
            "fast-0.1.0.dist-info",
            r#"{"url": "https://example.com/fast.tar.gz"}"#,
        );
        let link = load_dist_info(site.path(), "fast").unwrap();
        assert_eq!(link.project_dir, None);
        assert!(!link.editable);
        assert!(load_dist_info(site.path(), "other").is_none());
    }

    #[test]
    fn project_found_above_search_path() {
        let root = tempfile::tempdir().unwrap();
        make_project(root.path(), "pkg");
        let nested = root.path().join("python/pkg");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_project_above(&nested), Some(root.path().to_path_buf()));

        let discovery = Discovery::new(false);
        match discovery.discover("pkg", &[nested.clone()]) {
            Some(DiscoveredTarget::Project { layout, editable }) => {
                assert_eq!(layout.project_dir, root.path());
                assert!(!editable);
            }
            other => panic!("unexpected discovery: {other:?}"),
        }
        assert!(discovery.discover("other", &[nested]).is_none());
    }

    #[test]
    fn non_editable_install_skipped_without_automatic_installation() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("proj");
        make_project(&project, "fast");
        let site = root.path().join("site");
        let url = Url::from_file_path(&project).unwrap();
        write_direct_url(&site, "fast-0.1.0.dist-info", &format!(r#"{{"url": "{url}"}}"#));

        assert!(Discovery::new(false).discover_project("fast", &[site.clone()]).is_none());
        assert!(Discovery::new(true).discover_project("fast", &[site]).is_some());
    }

    #[test]
    fn standalone_file_discovery() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("helper.rs"), "").unwrap();
        let discovery = Discovery::new(false);
        match discovery.discover("pkg.helper", &[dir.path().to_path_buf()]) {
            Some(DiscoveredTarget::File { module_name, path }) => {
                assert_eq!(module_name, "helper");
                assert!(path.ends_with("helper.rs"));
            }
            other => panic!("unexpected discovery: {other:?}"),
        }
        assert!(discovery.discover("missing", &[dir.path().to_path_buf()]).is_none());
    }

    #[test]
    fn extension_module_lookup() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fast.cpython-312-x86_64-linux-gnu.so"), "").unwrap();
        fs::write(dir.path().join("faster.so"), "").unwrap();
        fs::write(dir.path().join("fast.txt"), "").unwrap();
        let found = find_extension_module(dir.path(), "fast").unwrap();
        assert!(found.ends_with("fast.cpython-312-x86_64-linux-gnu.so"));
        assert!(find_extension_module(dir.path(), "slow").is_none());
    }

    #[test]
    fn installed_extension_of_pure_project() {
        let root = tempfile::tempdir().unwrap();
        make_project(&root.path().join("proj"), "fast");
        let layout = crate::layout::resolve_project(&root.path().join("proj")).unwrap();
        let site = root.path().join("site");
        fs::create_dir_all(site.join("fast")).unwrap();
        fs::write(site.join("fast/fast.abi3.so"), "").unwrap();
        let found = find_installed_extension(&layout, &[root.path().join("empty"), site.clone()]);
        assert_eq!(found, Some(site.join("fast/fast.abi3.so")));
    }
}
