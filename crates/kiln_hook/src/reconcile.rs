//! Moving a module name from its old binding to a freshly built artifact.
//!
//! Project targets keep their binding when nothing changed and otherwise
//! reload through a fresh alias, dropping loaded submodules so they are
//! resolved again. Standalone files are loaded from a fresh copy on every
//! reload, so their module state never survives a reload even when the
//! artifact is unchanged.
//!
//! In both variants the registry is only modified after the loader accepts
//! the new artifact; a failed load leaves the previous binding in place.

use crate::alias::SessionDir;
use crate::driver::BuildOutcome;
use crate::error::HookError;
use crate::registry::{Binding, Loader, ModuleRegistry};
use kiln_cache::TargetKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Applies build outcomes to a [`ModuleRegistry`] through a [`Loader`].
#[derive(Debug)]
pub struct Reconciler<L> {
    loader: L,
    session: SessionDir,
}

impl<L: Loader> Reconciler<L> {
    /// Creates a reconciler that loads with `loader`.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            session: SessionDir::new(),
        }
    }

    /// The loader.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// The directory reload aliases are created in.
    pub fn session(&self) -> &SessionDir {
        &self.session
    }

    /// Binds `name` to the artifact of a project build.
    pub fn bind_project(
        &self,
        registry: &mut ModuleRegistry<L::Handle>,
        name: &str,
        outcome: &BuildOutcome,
    ) -> Result<Binding<L::Handle>, HookError> {
        let Some(prev) = registry.get(name) else {
            return self.bind_first(registry, name, TargetKind::Project, outcome);
        };
        if prev.kind == TargetKind::Project
            && !outcome.rebuilt
            && prev.fingerprint == outcome.fingerprint
        {
            tracing::debug!("{name:?} is unchanged, keeping the loaded module");
            return Ok(prev.clone());
        }
        let generation = prev.generation + 1;

        tracing::debug!("handling reload of {name:?}");
        let alias = self.session.materialize_alias(name, &outcome.artifact)?;
        let handle = self.load(name, &alias)?;
        let removed = registry.remove_submodules(name);
        if !removed.is_empty() {
            tracing::debug!("unloaded submodules of {name:?}: {removed:?}");
        }
        Ok(self.commit(
            registry,
            name,
            TargetKind::Project,
            outcome,
            alias,
            generation,
            handle,
        ))
    }

    /// Binds `name` to the artifact of a standalone file build.
    pub fn bind_file(
        &self,
        registry: &mut ModuleRegistry<L::Handle>,
        name: &str,
        outcome: &BuildOutcome,
    ) -> Result<Binding<L::Handle>, HookError> {
        let Some(prev) = registry.get(name) else {
            return self.bind_first(registry, name, TargetKind::File, outcome);
        };
        let generation = prev.generation + 1;

        let copy = self.session.fresh_copy(&outcome.artifact)?;
        tracing::debug!("reloading {} as {name:?}", copy.display());
        let handle = self.load(name, &copy)?;
        Ok(self.commit(
            registry,
            name,
            TargetKind::File,
            outcome,
            copy,
            generation,
            handle,
        ))
    }

    fn bind_first(
        &self,
        registry: &mut ModuleRegistry<L::Handle>,
        name: &str,
        kind: TargetKind,
        outcome: &BuildOutcome,
    ) -> Result<Binding<L::Handle>, HookError> {
        let handle = self.load(name, &outcome.artifact)?;
        Ok(self.commit(
            registry,
            name,
            kind,
            outcome,
            outcome.artifact.clone(),
            0,
            handle,
        ))
    }

    fn load(&self, name: &str, path: &Path) -> Result<L::Handle, HookError> {
        self.loader
            .load(name, path)
            .map_err(|e| HookError::ModuleLoadFailed {
                name: name.to_string(),
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        registry: &mut ModuleRegistry<L::Handle>,
        name: &str,
        kind: TargetKind,
        outcome: &BuildOutcome,
        load_path: PathBuf,
        generation: u64,
        handle: L::Handle,
    ) -> Binding<L::Handle> {
        let binding = Binding {
            name: name.to_string(),
            kind,
            origin: outcome.artifact.clone(),
            load_path,
            generation,
            fingerprint: outcome.fingerprint,
            handle: Arc::new(handle),
        };
        registry.insert(binding.clone());
        binding
    }
}
