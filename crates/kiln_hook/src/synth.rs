//! Minimal projects generated around a standalone source file.

use crate::error::HookError;
use kiln_config::BuildSettings;
use std::io::Write;
use std::path::{Path, PathBuf};

const PYO3_VERSION: &str = "0.22";

const CARGO_CONFIG: &str = r#"[target.x86_64-apple-darwin]
rustflags = ["-C", "link-arg=-undefined", "-C", "link-arg=dynamic_lookup"]

[target.aarch64-apple-darwin]
rustflags = ["-C", "link-arg=-undefined", "-C", "link-arg=dynamic_lookup"]
"#;

/// Writes a project in `project_dir` that builds `source` as module
/// `module_name`, returning its manifest path.
///
/// Files whose content is already correct are left untouched, so calling this
/// on every load does not disturb their modification times. `src/lib.rs`
/// links to `source` rather than copying it.
pub fn synthesize_project(
    project_dir: &Path,
    module_name: &str,
    source: &Path,
    settings: &BuildSettings,
) -> Result<PathBuf, HookError> {
    let manifest = project_dir.join("Cargo.toml");
    write_if_changed(&manifest, &cargo_manifest(module_name, settings))?;
    write_if_changed(&project_dir.join("pyproject.toml"), &pyproject(module_name))?;
    write_if_changed(&project_dir.join(".cargo").join("config.toml"), CARGO_CONFIG)?;
    link_source(source, &project_dir.join("src").join("lib.rs"))?;
    Ok(manifest)
}

fn cargo_manifest(module_name: &str, settings: &BuildSettings) -> String {
    let mut out = format!(
        r#"[package]
name = "{module_name}"
version = "0.1.0"
edition = "2021"

[lib]
name = "{module_name}"
crate-type = ["cdylib"]
path = "src/lib.rs"

[dependencies]
pyo3 = {{ version = "{PYO3_VERSION}", features = ["extension-module"] }}

[workspace]
"#
    );
    // Features of dependencies (`dep/feature`) cannot be declared here.
    let features: Vec<&str> = settings
        .features
        .iter()
        .map(String::as_str)
        .filter(|f| !f.contains('/'))
        .collect();
    if !features.is_empty() {
        out.push_str("\n[features]\n");
        for feature in features {
            out.push_str(&format!("{feature} = []\n"));
        }
    }
    out
}

fn pyproject(module_name: &str) -> String {
    format!(
        r#"[build-system]
requires = ["maturin>=1.5,<2.0"]
build-backend = "maturin"

[project]
name = "{module_name}"
version = "0.1.0"
"#
    )
}

fn write_if_changed(path: &Path, content: &str) -> Result<(), HookError> {
    if std::fs::read_to_string(path).is_ok_and(|existing| existing == content) {
        return Ok(());
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| HookError::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| HookError::io(dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| HookError::io(path, e))?;
    tmp.persist(path).map_err(|e| HookError::io(path, e.error))?;
    tracing::debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(unix)]
fn link_source(source: &Path, dest: &Path) -> Result<(), HookError> {
    if std::fs::read_link(dest).is_ok_and(|current| current == source) {
        return Ok(());
    }
    let dir = dest.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| HookError::io(dir, e))?;
    match std::fs::remove_file(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(HookError::io(dest, e)),
    }
    match std::os::unix::fs::symlink(source, dest) {
        Ok(()) => Ok(()),
        // Another process linked it first.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(HookError::io(dest, e)),
    }
}

#[cfg(not(unix))]
fn link_source(source: &Path, dest: &Path) -> Result<(), HookError> {
    let content = std::fs::read_to_string(source).map_err(|e| HookError::io(source, e))?;
    write_if_changed(dest, &content)
}
