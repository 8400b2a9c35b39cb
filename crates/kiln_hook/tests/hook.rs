mod common;

use common::{set_mtime, write_project, FakeBuilder, MockLoader};
use kiln_cache::BUILD_DIR_ENV;
use kiln_common::MapEnv;
use kiln_config::{HookConfig, ENABLED_ENV};
use kiln_hook::{HookError, ImportHook};
use kiln_project::{resolve_project, DiscoveredTarget};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct Workspace {
    sources: TempDir,
    cache: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            sources: tempfile::tempdir().unwrap(),
            cache: tempfile::tempdir().unwrap(),
        }
    }

    fn config(&self) -> HookConfig {
        HookConfig {
            build_dir: Some(self.cache.path().to_path_buf()),
            ..Default::default()
        }
    }

    fn hook(&self, config: HookConfig, builder: Arc<FakeBuilder>) -> ImportHook<MockLoader> {
        ImportHook::install(config, &MapEnv::new(), builder, MockLoader::default()).unwrap()
    }

    /// A project directory that doubles as the search path.
    fn project(&self, name: &str) -> PathBuf {
        let dir = self.sources.path().join(name);
        write_project(&dir, name);
        dir
    }

    fn rust_file(&self, name: &str) -> PathBuf {
        let path = self.sources.path().join(format!("{name}.rs"));
        fs::write(&path, "use pyo3::prelude::*;\n").unwrap();
        path
    }
}

fn project_target(dir: &Path) -> DiscoveredTarget {
    DiscoveredTarget::Project {
        layout: Arc::new(resolve_project(dir).unwrap()),
        editable: true,
    }
}

#[test]
fn disabled_hook_defers_to_normal_loading() {
    let ws = Workspace::new();
    ws.rust_file("fast");
    let builder = FakeBuilder::new();
    let env = MapEnv::new().with(ENABLED_ENV, "disabled");
    let hook = ImportHook::install(ws.config(), &env, builder.clone(), MockLoader::default())
        .unwrap();

    let loaded = hook
        .import("fast", &[ws.sources.path().to_path_buf()])
        .unwrap();
    assert!(loaded.is_none());
    assert_eq!(builder.builds(), 0);
    assert!(hook.binding("fast").is_none());
}

#[test]
fn unknown_module_is_not_handled() {
    let ws = Workspace::new();
    let hook = ws.hook(ws.config(), FakeBuilder::new());
    assert!(hook
        .import("nothing_here", &[ws.sources.path().to_path_buf()])
        .unwrap()
        .is_none());
}

#[test]
fn project_reload_without_changes_preserves_state() {
    let ws = Workspace::new();
    let search = vec![ws.project("fast")];
    let builder = FakeBuilder::new();
    let hook = ws.hook(ws.config(), builder.clone());

    let first = hook.import("fast", &search).unwrap().unwrap();
    first.bump();
    let second = hook.import("fast", &search).unwrap().unwrap();
    let third = hook.import("fast", &search).unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(second.count(), 1);
    assert_eq!(third.count(), 1);
    assert_eq!(builder.builds(), 1);
    assert_eq!(hook.binding("fast").unwrap().generation, 0);
}

#[test]
fn project_reload_after_change_loads_through_a_fresh_alias() {
    let ws = Workspace::new();
    let project = ws.project("fast");
    let search = vec![project.clone()];
    let builder = FakeBuilder::new();
    let hook = ws.hook(ws.config(), builder.clone());
    let lib = project.join("src/lib.rs");

    set_mtime(&lib, 1_000_000);
    let first = hook.import("fast", &search).unwrap().unwrap();
    first.bump();
    let origin = hook.binding("fast").unwrap().origin;

    set_mtime(&lib, 2_000_000);
    let second = hook.import("fast", &search).unwrap().unwrap();
    let binding = hook.binding("fast").unwrap();

    assert_eq!(builder.builds(), 2);
    assert_eq!(second.count(), 0);
    assert_eq!(second.0.contents, "build 2");
    assert_eq!(binding.generation, 1);
    assert_eq!(binding.origin, origin);
    assert_ne!(binding.load_path, origin);

    set_mtime(&lib, 3_000_000);
    hook.import("fast", &search).unwrap();
    let third = hook.binding("fast").unwrap();
    assert_eq!(third.generation, 2);
    assert_ne!(third.load_path, binding.load_path);
}

#[test]
fn file_reload_always_resets_state() {
    let ws = Workspace::new();
    ws.rust_file("fast");
    let search = vec![ws.sources.path().to_path_buf()];
    let builder = FakeBuilder::new();
    let hook = ws.hook(ws.config(), builder.clone());

    let first = hook.import("fast", &search).unwrap().unwrap();
    first.bump();
    let second = hook.import("fast", &search).unwrap().unwrap();
    second.bump();
    let third = hook.import("fast", &search).unwrap().unwrap();

    assert_eq!(builder.builds(), 1);
    assert_eq!(second.count(), 1);
    assert_eq!(third.count(), 0);
    assert!(!Arc::ptr_eq(&second, &third));
    assert_eq!(hook.binding("fast").unwrap().generation, 2);
}

#[test]
fn file_target_gets_a_synthesized_project() {
    let ws = Workspace::new();
    ws.rust_file("fast");
    let hook = ws.hook(ws.config(), FakeBuilder::new());
    hook.import("fast", &[ws.sources.path().to_path_buf()])
        .unwrap()
        .unwrap();

    let records = hook.driver().store().entries().unwrap();
    assert_eq!(records.len(), 1);
    let project_dir = hook.driver().store().project_dir(&records[0].identity);
    let manifest = fs::read_to_string(project_dir.join("Cargo.toml")).unwrap();
    assert!(manifest.contains("name = \"fast\""));
    assert_eq!(
        fs::read_to_string(project_dir.join("src/lib.rs")).unwrap(),
        "use pyo3::prelude::*;\n"
    );
}

#[test]
fn failed_reload_keeps_previous_binding() {
    let ws = Workspace::new();
    let project = ws.project("fast");
    let lib = project.join("src/lib.rs");
    let search = vec![project];
    let builder = FakeBuilder::new();
    let hook = ws.hook(ws.config(), builder.clone());

    set_mtime(&lib, 1_000_000);
    let first = hook.import("fast", &search).unwrap().unwrap();

    set_mtime(&lib, 2_000_000);
    builder.set_failing(true);
    let err = hook.import("fast", &search).unwrap_err();
    assert!(matches!(err, HookError::BuildFailed { .. }));
    let kept = hook.binding("fast").unwrap();
    assert_eq!(kept.generation, 0);
    assert!(Arc::ptr_eq(&kept.handle, &first));

    builder.set_failing(false);
    hook.loader().set_failing(true);
    let err = hook.import("fast", &search).unwrap_err();
    assert!(matches!(err, HookError::ModuleLoadFailed { .. }));
    let kept = hook.binding("fast").unwrap();
    assert_eq!(kept.generation, 0);
    assert!(Arc::ptr_eq(&kept.handle, &first));

    hook.loader().set_failing(false);
    hook.import("fast", &search).unwrap().unwrap();
    assert_eq!(hook.binding("fast").unwrap().generation, 1);
}

#[test]
fn failed_first_load_binds_nothing() {
    let ws = Workspace::new();
    ws.rust_file("fast");
    let loader = MockLoader::default();
    loader.set_failing(true);
    let hook = ImportHook::install(ws.config(), &MapEnv::new(), FakeBuilder::new(), loader)
        .unwrap();
    let err = hook
        .import("fast", &[ws.sources.path().to_path_buf()])
        .unwrap_err();
    assert!(matches!(err, HookError::ModuleLoadFailed { .. }));
    assert!(!err.is_recoverable());
    assert!(hook.binding("fast").is_none());
}

#[test]
fn disabled_reloading_returns_the_bound_module() {
    let ws = Workspace::new();
    let project = ws.project("fast");
    let search = vec![project.clone()];
    let builder = FakeBuilder::new();
    let config = HookConfig {
        enable_reloading: false,
        ..ws.config()
    };
    let hook = ws.hook(config, builder.clone());

    set_mtime(&project.join("src/lib.rs"), 1_000_000);
    let first = hook.import("fast", &search).unwrap().unwrap();
    set_mtime(&project.join("src/lib.rs"), 2_000_000);
    let second = hook.import("fast", &search).unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builder.builds(), 1);
}

#[test]
fn cache_root_comes_from_the_environment() {
    let ws = Workspace::new();
    let override_dir = ws.cache.path().join("override");
    let env = MapEnv::new()
        .with(BUILD_DIR_ENV, override_dir.to_str().unwrap())
        .with("VIRTUAL_ENV", ws.sources.path().to_str().unwrap());
    let hook = ImportHook::install(
        HookConfig::default(),
        &env,
        FakeBuilder::new(),
        MockLoader::default(),
    )
    .unwrap();
    assert_eq!(hook.driver().store().root(), override_dir.as_path());

    let explicit = ImportHook::install(ws.config(), &env, FakeBuilder::new(), MockLoader::default())
        .unwrap();
    assert_eq!(explicit.driver().store().root(), ws.cache.path());
}

#[test]
fn invalid_toggle_is_a_config_error() {
    let ws = Workspace::new();
    let env = MapEnv::new().with(ENABLED_ENV, "sometimes");
    let result = ImportHook::install(ws.config(), &env, FakeBuilder::new(), MockLoader::default());
    assert!(matches!(result, Err(HookError::Config(_))));
}

#[test]
fn project_installed_into_two_environments_is_built_for_each() {
    let ws = Workspace::new();
    let found = project_target(&ws.project("fast"));
    let site_a = ws.sources.path().join("env_a/site-packages");
    let site_b = ws.sources.path().join("env_b/site-packages");
    let builder = FakeBuilder::new();
    let hook = ws.hook(ws.config(), builder.clone());

    let a = hook.build(&found, &[site_a.clone()]).unwrap();
    let b = hook.build(&found, &[site_b.clone()]).unwrap();
    let a_again = hook.build(&found, &[site_a.clone()]).unwrap();

    assert!(a.rebuilt);
    assert!(b.rebuilt);
    assert!(!a_again.rebuilt);
    assert_ne!(a.artifact, b.artifact);
    assert_eq!(a_again.artifact, a.artifact);
    assert_eq!(builder.builds(), 2);

    let requests = builder.requests();
    assert_eq!(requests[0].artifact_search_dirs, vec![site_a.join("fast")]);
    assert_eq!(requests[1].artifact_search_dirs, vec![site_b.join("fast")]);
    assert_eq!(hook.driver().store().entries().unwrap().len(), 2);
}

#[test]
fn pure_native_project_searches_the_given_site_packages() {
    let ws = Workspace::new();
    let found = project_target(&ws.project("fast"));
    let site = ws.sources.path().join("venv/site-packages");
    let builder = FakeBuilder::new();
    let hook = ws.hook(ws.config(), builder.clone());

    hook.build(&found, &[site.clone()]).unwrap();
    assert_eq!(builder.requests()[0].artifact_search_dirs, vec![site.join("fast")]);
}

#[test]
fn pure_native_project_without_install_location_fails_before_building() {
    let ws = Workspace::new();
    let found = project_target(&ws.project("fast"));
    let builder = FakeBuilder::new();
    let hook = ws.hook(ws.config(), builder.clone());

    let err = hook.build(&found, &[]).unwrap_err();
    assert!(matches!(err, HookError::NoInstallLocation { ref name } if name == "fast"));
    assert!(!err.is_recoverable());
    assert!(builder.requests().is_empty());

    let config = HookConfig {
        install_dirs: vec![ws.sources.path().join("site")],
        ..ws.config()
    };
    let hook = ws.hook(config, builder.clone());
    hook.build(&found, &[]).unwrap();
    assert_eq!(builder.builds(), 1);
}
