//! Builds targets by running maturin and cargo.

use crate::builder::{BuildKind, BuildProduct, BuildRequest, Builder};
use crate::error::BuildError;
use crate::warnings::output_has_warnings;
use kiln_project::find_extension_module;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Instant;

/// Supported maturin versions as `(inclusive lower, exclusive upper)`.
pub const MATURIN_VERSION_RANGE: ((u32, u32, u32), (u32, u32, u32)) = ((1, 5, 0), (2, 0, 0));

/// Suffix given to copied libraries so the host runtime recognizes them.
const EXTENSION_SUFFIX: &str = if cfg!(windows) { "pyd" } else { "so" };

const DYLIB_SUFFIXES: &[&str] = &[".so", ".dylib", ".dll"];

/// Runs the real build tools found on `PATH`.
#[derive(Debug, Default)]
pub struct ToolchainBuilder {
    maturin: OnceLock<PathBuf>,
}

impl ToolchainBuilder {
    /// Creates a builder that locates its tools lazily.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the maturin binary at `path` without searching or version checks.
    pub fn with_maturin(path: impl Into<PathBuf>) -> Self {
        let maturin = OnceLock::new();
        let _ = maturin.set(path.into());
        Self { maturin }
    }

    /// Returns a maturin binary within [`MATURIN_VERSION_RANGE`].
    ///
    /// The result is cached for the lifetime of this builder.
    pub fn maturin(&self) -> Result<PathBuf, BuildError> {
        if let Some(path) = self.maturin.get() {
            return Ok(path.clone());
        }
        tracing::debug!("searching for maturin");
        let path = which::which("maturin").map_err(|e| BuildError::ToolNotFound {
            program: "maturin".to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!("found maturin at {}", path.display());

        let output = run(&path, &["--version".to_string()], None)?;
        let version = parse_maturin_version(&output).ok_or_else(|| BuildError::UnsupportedVersion {
            program: "maturin".to_string(),
            found: output.trim().to_string(),
            required: describe_range(),
        })?;
        let (lower, upper) = MATURIN_VERSION_RANGE;
        if version < lower || version >= upper {
            return Err(BuildError::UnsupportedVersion {
                program: "maturin".to_string(),
                found: format!("{}.{}.{}", version.0, version.1, version.2),
                required: describe_range(),
            });
        }
        let _ = self.maturin.set(path.clone());
        Ok(path)
    }

    fn build_project(&self, request: &BuildRequest) -> Result<BuildProduct, BuildError> {
        let maturin = self.maturin()?;
        let mut args = vec![
            "develop".to_string(),
            "--manifest-path".to_string(),
            request.manifest_path.display().to_string(),
        ];
        args.extend(request.args());
        let output = run(&maturin, &args, None)?;

        let artifact = request
            .artifact_search_dirs
            .iter()
            .find_map(|dir| find_extension_module(dir, &request.module_name))
            .ok_or_else(|| BuildError::ArtifactMissing {
                module: request.module_name.clone(),
                searched: join_paths(&request.artifact_search_dirs),
            })?;
        Ok(BuildProduct { artifact, output })
    }

    fn build_synthesized(&self, request: &BuildRequest) -> Result<BuildProduct, BuildError> {
        let cargo = which::which("cargo").map_err(|e| BuildError::ToolNotFound {
            program: "cargo".to_string(),
            reason: e.to_string(),
        })?;
        let rustc_flags = &request.settings.rustc_flags;
        let subcommand = if rustc_flags.is_empty() { "build" } else { "rustc" };
        let mut args = vec![
            subcommand.to_string(),
            "--lib".to_string(),
            "--message-format=json-render-diagnostics".to_string(),
            "--manifest-path".to_string(),
            request.manifest_path.display().to_string(),
        ];
        args.extend(request.args());
        if !rustc_flags.is_empty() {
            args.push("--".to_string());
            args.extend(rustc_flags.iter().cloned());
        }

        let (stdout, stderr) = run_split(&cargo, &args, request.manifest_path.parent())?;
        let built = find_cdylib(&stdout).ok_or_else(|| BuildError::ArtifactMissing {
            module: request.module_name.clone(),
            searched: "cargo build messages".to_string(),
        })?;
        let artifact = request
            .output_dir
            .join(format!("{}.{EXTENSION_SUFFIX}", request.module_name));
        install_library(&built, &request.output_dir, &artifact)?;
        Ok(BuildProduct {
            artifact,
            output: stderr,
        })
    }
}

impl Builder for ToolchainBuilder {
    fn build(&self, request: &BuildRequest) -> Result<BuildProduct, BuildError> {
        let start = Instant::now();
        let product = match request.kind {
            BuildKind::Project => self.build_project(request)?,
            BuildKind::Synthesized => self.build_synthesized(request)?,
        };
        tracing::debug!(
            "compiled {} in {:.3}s (has warnings: {})",
            request.module_name,
            start.elapsed().as_secs_f64(),
            output_has_warnings(&product.output)
        );
        Ok(product)
    }
}

/// Parses the output of `maturin --version`.
pub fn parse_maturin_version(output: &str) -> Option<(u32, u32, u32)> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| Regex::new(r"^maturin ([0-9]+)\.([0-9]+)\.([0-9]+)(-.*)?$").ok())
        .as_ref()?;
    let caps = re.captures(output.trim_end())?;
    let part = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
    Some((part(1)?, part(2)?, part(3)?))
}

fn describe_range() -> String {
    let ((a, b, c), (x, y, z)) = MATURIN_VERSION_RANGE;
    format!(">={a}.{b}.{c}, <{x}.{y}.{z}")
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn command_line(program: &Path, args: &[String]) -> String {
    std::iter::once(program.display().to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `program`, returning stdout followed by stderr.
pub(crate) fn run(program: &Path, args: &[String], cwd: Option<&Path>) -> Result<String, BuildError> {
    let (mut stdout, stderr) = run_split(program, args, cwd)?;
    stdout.push_str(&stderr);
    Ok(stdout)
}

fn run_split(
    program: &Path,
    args: &[String],
    cwd: Option<&Path>,
) -> Result<(String, String), BuildError> {
    let command = command_line(program, args);
    tracing::debug!("running command: {command}");
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let result = cmd.output().map_err(|e| BuildError::Spawn {
        program: program.to_path_buf(),
        source: e,
    })?;
    let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
    if !result.status.success() {
        let output = format!("{stdout}{stderr}");
        tracing::error!(
            "command `{command}` returned non-zero exit status: {:?}",
            result.status.code()
        );
        tracing::error!("build output:\n{output}");
        return Err(BuildError::Failed {
            command,
            status: result.status.code(),
            output,
        });
    }
    Ok((stdout, stderr))
}

/// Finds the last cdylib reported in cargo's JSON message stream.
fn find_cdylib(messages: &str) -> Option<PathBuf> {
    let mut found = None;
    for line in messages.lines() {
        let Ok(msg) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if msg["reason"] != "compiler-artifact" {
            continue;
        }
        let is_cdylib = msg["target"]["kind"]
            .as_array()
            .is_some_and(|kinds| kinds.iter().any(|k| *k == "cdylib"));
        if !is_cdylib {
            continue;
        }
        let libraries = msg["filenames"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|f| DYLIB_SUFFIXES.iter().any(|s| f.ends_with(s)));
        if let Some(lib) = libraries.last() {
            found = Some(PathBuf::from(lib));
        }
    }
    found
}

/// Copies `built` to `dest` through a rename, so a library that is already
/// mapped by a running process is replaced rather than overwritten in place.
fn install_library(built: &Path, output_dir: &Path, dest: &Path) -> Result<(), BuildError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BuildError::Io { path, source }
    };
    std::fs::create_dir_all(output_dir).map_err(io_err(output_dir))?;
    let mut src = std::fs::File::open(built).map_err(io_err(built))?;
    let mut tmp = tempfile::NamedTempFile::new_in(output_dir).map_err(io_err(output_dir))?;
    std::io::copy(&mut src, &mut tmp).map_err(io_err(dest))?;
    tmp.persist(dest)
        .map_err(|e| BuildError::Io {
            path: dest.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_versions() {
        assert_eq!(parse_maturin_version("maturin 1.5.1\n"), Some((1, 5, 1)));
        assert_eq!(parse_maturin_version("maturin 1.8.0-beta.2\n"), Some((1, 8, 0)));
        assert_eq!(parse_maturin_version("maturin-cli 1.5.1"), None);
        assert_eq!(parse_maturin_version("garbage"), None);
    }

    #[test]
    fn range_description() {
        assert_eq!(describe_range(), ">=1.5.0, <2.0.0");
    }

    #[test]
    fn cdylib_from_cargo_messages() {
        let messages = concat!(
            r#"{"reason":"compiler-artifact","target":{"kind":["lib"]},"filenames":["/t/libdep.rlib"]}"#,
            "\n",
            "not json\n",
            r#"{"reason":"compiler-artifact","target":{"kind":["cdylib"]},"filenames":["/t/debug/libm.so"]}"#,
            "\n",
            r#"{"reason":"build-finished","success":true}"#,
            "\n",
        );
        assert_eq!(find_cdylib(messages), Some(PathBuf::from("/t/debug/libm.so")));
        assert_eq!(find_cdylib(""), None);
    }

    #[test]
    fn install_replaces_existing_library() {
        let dir = tempfile::tempdir().unwrap();
        let built = dir.path().join("libm.so");
        std::fs::write(&built, "v2").unwrap();
        let out = dir.path().join("dist");
        let dest = out.join("m.so");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(&dest, "v1").unwrap();
        install_library(&built, &out, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "v2");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_keeps_output() {
        let err = run(
            Path::new("/bin/sh"),
            &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
            None,
        )
        .unwrap_err();
        match err {
            BuildError::Failed { status, output, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(output, "out\nerr\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run(Path::new("/definitely/not/a/tool"), &[], None).unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }
}
