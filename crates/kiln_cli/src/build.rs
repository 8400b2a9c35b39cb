//! `kiln build`: bring a target up to date without loading it.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_build::{site_packages_dirs, ToolchainBuilder};
use kiln_common::{EnvSource, ProcessEnv};
use kiln_hook::{DylibLoader, ImportHook};
use kiln_project::{resolve_project, DiscoveredTarget};

use crate::{BuildArgs, GlobalArgs};

/// Runs the `kiln build` command.
///
/// Returns exit code 0 whether or not a build was needed.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let mut config = global.load_config()?;
    config.settings.release |= args.release;
    config.force_rebuild |= args.force;

    let found = discover_path(&args.path)?;
    tracing::debug!("resolved build target: {found:?}");
    let hook = ImportHook::install(
        config,
        &ProcessEnv,
        Arc::new(ToolchainBuilder::new()),
        DylibLoader::new(),
    )?;
    let search_paths = install_search_paths(&found, &ProcessEnv);
    let outcome = hook.build(&found, &search_paths)?;
    if outcome.rebuilt {
        eprintln!("    Built {}", outcome.artifact.display());
    } else {
        eprintln!("    Fresh {}", outcome.artifact.display());
    }
    Ok(0)
}

/// Where a project build's installed library is looked for: the active
/// environment's site-packages. Standalone files need none.
fn install_search_paths(found: &DiscoveredTarget, env: &dyn EnvSource) -> Vec<PathBuf> {
    match found {
        DiscoveredTarget::Project { .. } => {
            let dirs = site_packages_dirs(env);
            tracing::debug!("install search paths: {dirs:?}");
            dirs
        }
        DiscoveredTarget::File { .. } => Vec::new(),
    }
}

/// Treats `path` as a standalone `.rs` file or a project directory.
fn discover_path(path: &Path) -> Result<DiscoveredTarget, Box<dyn Error>> {
    let path: PathBuf = std::fs::canonicalize(path)
        .map_err(|e| format!("cannot access {}: {e}", path.display()))?;
    if path.is_file() {
        if path.extension().and_then(|e| e.to_str()) != Some("rs") {
            return Err(format!("{} is not a .rs file", path.display()).into());
        }
        let module_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| format!("{} has no usable file name", path.display()))?
            .to_string();
        return Ok(DiscoveredTarget::File { module_name, path });
    }
    let layout = resolve_project(&path)?;
    Ok(DiscoveredTarget::Project {
        layout: Arc::new(layout),
        editable: true,
    })
}
