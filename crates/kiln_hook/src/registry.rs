//! The in-process table of loaded modules.

use kiln_cache::{Fingerprint, TargetKind};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Boxed error returned by a [`Loader`].
pub type LoadError = Box<dyn Error + Send + Sync>;

/// Binds a library on disk into the running process.
///
/// Implementations are expected to treat a path they have already loaded as
/// a no-op, returning the existing handle. The reconciler relies on that: a
/// reload only takes effect when it is given a path the loader has never
/// seen, so every reload goes through a fresh alias.
pub trait Loader: Send + Sync {
    /// The loaded module.
    type Handle: Send + Sync;

    /// Loads the library at `path` as module `name`.
    fn load(&self, name: &str, path: &Path) -> Result<Self::Handle, LoadError>;
}

/// The live association between an import name and a loaded artifact.
#[derive(Debug)]
pub struct Binding<H> {
    /// Dotted import name.
    pub name: String,
    /// Whether the binding came from a project or a standalone file.
    pub kind: TargetKind,
    /// The cached artifact this binding was loaded from.
    pub origin: PathBuf,
    /// The path actually handed to the loader. Differs from `origin` after a
    /// reload.
    pub load_path: PathBuf,
    /// Incremented on every rebind of this name, starting at zero.
    pub generation: u64,
    /// Fingerprint of the sources the artifact was built from.
    pub fingerprint: Fingerprint,
    /// The loaded module.
    pub handle: Arc<H>,
}

impl<H> Clone for Binding<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            origin: self.origin.clone(),
            load_path: self.load_path.clone(),
            generation: self.generation,
            fingerprint: self.fingerprint,
            handle: Arc::clone(&self.handle),
        }
    }
}

/// Loaded modules by dotted name.
#[derive(Debug)]
pub struct ModuleRegistry<H> {
    modules: BTreeMap<String, Binding<H>>,
}

impl<H> Default for ModuleRegistry<H> {
    fn default() -> Self {
        Self {
            modules: BTreeMap::new(),
        }
    }
}

impl<H> ModuleRegistry<H> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The binding for `name`, if loaded.
    pub fn get(&self, name: &str) -> Option<&Binding<H>> {
        self.modules.get(name)
    }

    /// True if `name` is loaded.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Binds `binding.name`, returning the binding it replaced.
    pub fn insert(&mut self, binding: Binding<H>) -> Option<Binding<H>> {
        self.modules.insert(binding.name.clone(), binding)
    }

    /// Unbinds `name`.
    pub fn remove(&mut self, name: &str) -> Option<Binding<H>> {
        self.modules.remove(name)
    }

    /// Unbinds every module nested under `name`, leaving `name` itself.
    ///
    /// Returns the removed names in order.
    pub fn remove_submodules(&mut self, name: &str) -> Vec<String> {
        let prefix = format!("{name}.");
        let doomed: Vec<String> = self
            .modules
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.modules.remove(key);
        }
        doomed
    }

    /// Every loaded name, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// True if nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
