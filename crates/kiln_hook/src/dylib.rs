//! A [`Loader`] backed by the platform's dynamic linker.

use crate::registry::{LoadError, Loader};
use libloading::Library;
use std::path::Path;

/// Opens libraries with `dlopen`/`LoadLibrary`.
///
/// The platform loader already returns the existing handle for a path it has
/// opened before, which is the behavior the reconciler works around with
/// fresh aliases.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader {
    check_init_symbol: bool,
}

impl DylibLoader {
    /// Creates a loader that accepts any library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also require the `PyInit_<name>` entry point of an extension module,
    /// where `<name>` is the last segment of the import name.
    pub fn with_init_symbol_check(mut self) -> Self {
        self.check_init_symbol = true;
        self
    }
}

impl Loader for DylibLoader {
    type Handle = Library;

    fn load(&self, name: &str, path: &Path) -> Result<Library, LoadError> {
        tracing::debug!("loading {} as {name:?}", path.display());
        // SAFETY: loading runs the library's initializers. Artifacts come from
        // the build the caller requested, so they are trusted like any other
        // code the process links.
        let library = unsafe { Library::new(path) }?;
        if self.check_init_symbol {
            let short = name.rsplit('.').next().unwrap_or(name);
            let symbol = format!("PyInit_{short}");
            // SAFETY: the symbol is only looked up, never called.
            unsafe { library.get::<unsafe extern "C" fn()>(symbol.as_bytes()) }
                .map_err(|e| format!("{} has no entry point {symbol}: {e}", path.display()))?;
        }
        Ok(library)
    }
}
