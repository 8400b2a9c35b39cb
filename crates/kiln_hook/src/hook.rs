//! The import hook: discovery, rebuild, and binding behind one call.

use crate::driver::{BuildOutcome, Driver, DriverObserver, DriverOptions};
use crate::error::HookError;
use crate::reconcile::Reconciler;
use crate::registry::{Binding, Loader, ModuleRegistry};
use crate::synth::synthesize_project;
use kiln_build::{BuildKind, BuildRequest, Builder};
use kiln_cache::{resolve_cache_root, CacheStore, FingerprintEngine, Target, TargetKind};
use kiln_common::EnvSource;
use kiln_config::HookConfig;
use kiln_project::{DiscoveredTarget, Discovery, ProjectLayout};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Rebuilds native modules on import.
///
/// Created once per process by [`ImportHook::install`], which resolves the
/// configuration and the cache root. Every later [`ImportHook::import`] reads
/// only that resolved state.
pub struct ImportHook<L: Loader> {
    config: HookConfig,
    discovery: Discovery,
    driver: Driver,
    reconciler: Reconciler<L>,
    registry: Mutex<ModuleRegistry<L::Handle>>,
}

impl<L: Loader> ImportHook<L> {
    /// Resolves `config` against `env` and sets up the hook.
    pub fn install(
        config: HookConfig,
        env: &dyn EnvSource,
        builder: Arc<dyn Builder>,
        loader: L,
    ) -> Result<Self, HookError> {
        let config = config.resolve(env)?;
        let root = resolve_cache_root(config.build_dir.as_deref(), env);
        tracing::debug!(
            "using cache root {} (from {})",
            root.path.display(),
            root.source
        );
        let driver = Driver::new(
            FingerprintEngine::new(config.sources.clone()),
            CacheStore::open(root.path),
            builder,
            DriverOptions::from_config(&config),
        );
        Ok(Self {
            discovery: Discovery::new(config.enable_automatic_installation),
            config,
            driver,
            reconciler: Reconciler::new(loader),
            registry: Mutex::new(ModuleRegistry::new()),
        })
    }

    /// Notifies `observer` of every driver state transition.
    pub fn with_observer(mut self, observer: Arc<dyn DriverObserver>) -> Self {
        self.driver = self.driver.with_observer(observer);
        self
    }

    /// The resolved configuration.
    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    /// The driver, for direct cache access.
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// The loader modules are bound with.
    pub fn loader(&self) -> &L {
        self.reconciler.loader()
    }

    /// The current binding of `name`, if the hook loaded it.
    pub fn binding(&self, name: &str) -> Option<Binding<L::Handle>> {
        self.registry().get(name).cloned()
    }

    /// Forgets memoized project resolutions, e.g. after editing project metadata.
    pub fn invalidate_caches(&self) {
        self.discovery.resolver().clear_cache();
    }

    /// Imports `fullname`, rebuilding it first if its sources changed.
    ///
    /// `search_paths` are the directories the host would search for the
    /// module. Returns `Ok(None)` when the hook is disabled or no target is
    /// found, in which case the host should load the module normally.
    pub fn import(
        &self,
        fullname: &str,
        search_paths: &[PathBuf],
    ) -> Result<Option<Arc<L::Handle>>, HookError> {
        if !self.config.enabled {
            return Ok(None);
        }
        if !self.config.enable_reloading {
            if let Some(existing) = self.registry().get(fullname) {
                tracing::debug!("module {fullname:?} is already loaded and enable_reloading=false");
                return Ok(Some(Arc::clone(&existing.handle)));
            }
        }

        let start = Instant::now();
        tracing::debug!("searching for {fullname:?}");
        let Some(found) = self.discovery.discover(fullname, search_paths) else {
            tracing::debug!("did not find {fullname:?}");
            return Ok(None);
        };

        let (target, request) = self.plan(&found, search_paths)?;
        let outcome = self.driver.ensure_built(&target, &request)?;
        let mut reg = self.registry();
        let binding = match target.kind {
            TargetKind::Project => self.reconciler.bind_project(&mut reg, fullname, &outcome)?,
            TargetKind::File => self.reconciler.bind_file(&mut reg, fullname, &outcome)?,
        };
        drop(reg);

        let elapsed = start.elapsed().as_secs_f64();
        if outcome.rebuilt {
            tracing::info!("rebuilt and loaded module {fullname:?} in {elapsed:.3}s");
        } else {
            tracing::debug!("loaded module {fullname:?} in {elapsed:.3}s");
        }
        Ok(Some(binding.handle))
    }

    /// Brings `found` up to date without binding it.
    pub fn build(
        &self,
        found: &DiscoveredTarget,
        search_paths: &[PathBuf],
    ) -> Result<BuildOutcome, HookError> {
        let (target, request) = self.plan(found, search_paths)?;
        self.driver.ensure_built(&target, &request)
    }

    /// Describes how `found` is fingerprinted and built.
    ///
    /// For a standalone file this also writes its synthesized project.
    fn plan(
        &self,
        found: &DiscoveredTarget,
        search_paths: &[PathBuf],
    ) -> Result<(Target, BuildRequest), HookError> {
        match found {
            DiscoveredTarget::Project { layout, .. } => self.plan_project(layout, search_paths),
            DiscoveredTarget::File { module_name, path } => self.plan_file(module_name, path),
        }
    }

    fn plan_project(
        &self,
        layout: &ProjectLayout,
        search_paths: &[PathBuf],
    ) -> Result<(Target, BuildRequest), HookError> {
        tracing::debug!("importing project {}", layout.project_dir.display());
        let environment: Vec<PathBuf> = self
            .config
            .install_dirs
            .iter()
            .chain(search_paths)
            .cloned()
            .collect();
        let artifact_search_dirs = match &layout.extension_module_dir {
            Some(dir) => vec![dir.clone()],
            None => environment
                .iter()
                .map(|dir| dir.join(layout.package_name()))
                .collect(),
        };
        if artifact_search_dirs.is_empty() {
            return Err(HookError::NoInstallLocation {
                name: layout.module_name().to_string(),
            });
        }
        let target = Target::project(
            layout.module_name(),
            &layout.project_dir,
            &layout.manifest_path,
            &layout.path_dependencies,
        )
        .installed_into(&environment);
        let request = BuildRequest {
            kind: BuildKind::Project,
            module_name: layout.module_name().to_string(),
            manifest_path: layout.manifest_path.clone(),
            output_dir: self.driver.store().dist_dir(&target.identity),
            artifact_search_dirs,
            settings: self.config.settings.clone(),
        };
        Ok((target, request))
    }

    fn plan_file(
        &self,
        module_name: &str,
        path: &Path,
    ) -> Result<(Target, BuildRequest), HookError> {
        tracing::debug!("importing file {}", path.display());
        let target = Target::file(module_name, path);
        let store = self.driver.store();
        let manifest_path = synthesize_project(
            &store.project_dir(&target.identity),
            module_name,
            path,
            &self.config.settings,
        )?;
        let request = BuildRequest {
            kind: BuildKind::Synthesized,
            module_name: module_name.to_string(),
            manifest_path,
            output_dir: store.dist_dir(&target.identity),
            artifact_search_dirs: Vec::new(),
            settings: self.config.settings.clone(),
        };
        Ok((target, request))
    }

    fn registry(&self) -> MutexGuard<'_, ModuleRegistry<L::Handle>> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
