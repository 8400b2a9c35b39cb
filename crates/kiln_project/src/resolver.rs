//! Memoized project resolution.

use crate::layout::{resolve_project, ProjectLayout};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Caches [`resolve_project`] results per directory, including failures.
///
/// Call [`ProjectResolver::clear_cache`] after editing project metadata.
#[derive(Debug, Default)]
pub struct ProjectResolver {
    cache: Mutex<HashMap<PathBuf, Option<Arc<ProjectLayout>>>>,
}

impl ProjectResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `project_dir`, returning `None` if it is not a valid project.
    pub fn resolve(&self, project_dir: &Path) -> Option<Arc<ProjectLayout>> {
        if let Some(cached) = self.entries().get(project_dir) {
            return cached.clone();
        }
        let resolved = match resolve_project(project_dir) {
            Ok(layout) => Some(Arc::new(layout)),
            Err(e) => {
                tracing::info!("failed to resolve project {}: {e}", project_dir.display());
                None
            }
        };
        self.entries()
            .insert(project_dir.to_path_buf(), resolved.clone());
        resolved
    }

    /// Forgets every cached resolution.
    pub fn clear_cache(&self) {
        tracing::debug!("clearing project resolution cache");
        self.entries().clear();
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, Option<Arc<ProjectLayout>>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
