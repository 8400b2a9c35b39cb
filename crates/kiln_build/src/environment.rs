//! Locating the Python environment a project build installs into.

use crate::error::BuildError;
use kiln_common::EnvSource;
use std::path::{Path, PathBuf};

const VIRTUAL_ENV: &str = "VIRTUAL_ENV";

const INTERPRETERS: &[&str] = &["python3", "python"];

const SITE_DIRS_SCRIPT: &str =
    "import sysconfig\nfor key in ('platlib', 'purelib'):\n    print(sysconfig.get_path(key))";

/// Returns the site-packages directories of the active environment.
///
/// An active virtual environment is read from disk. Otherwise the first
/// interpreter on `PATH` is asked. Returns an empty list if neither works.
pub fn site_packages_dirs(env: &dyn EnvSource) -> Vec<PathBuf> {
    if let Some(venv) = env.var(VIRTUAL_ENV) {
        let dirs = venv_site_packages(Path::new(&venv));
        if !dirs.is_empty() {
            return dirs;
        }
        tracing::debug!("virtual environment {venv} has no site-packages directory");
    }
    match interpreter_site_packages() {
        Ok(dirs) => dirs,
        Err(e) => {
            tracing::debug!("could not ask the interpreter for site-packages: {e}");
            Vec::new()
        }
    }
}

/// The site-packages directories inside the virtual environment at `venv`.
pub fn venv_site_packages(venv: &Path) -> Vec<PathBuf> {
    if cfg!(windows) {
        let dir = venv.join("Lib").join("site-packages");
        return if dir.is_dir() { vec![dir] } else { Vec::new() };
    }
    let Ok(entries) = std::fs::read_dir(venv.join("lib")) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("python"))
        .map(|e| e.path().join("site-packages"))
        .filter(|dir| dir.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn interpreter_site_packages() -> Result<Vec<PathBuf>, BuildError> {
    let python = INTERPRETERS
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| BuildError::ToolNotFound {
            program: INTERPRETERS.join(" or "),
            reason: "not found on PATH".to_string(),
        })?;
    let output = crate::toolchain::run(
        &python,
        &["-c".to_string(), SITE_DIRS_SCRIPT.to_string()],
        None,
    )?;
    Ok(parse_site_dirs(&output))
}

fn parse_site_dirs(output: &str) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let dir = PathBuf::from(line);
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}
