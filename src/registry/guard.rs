//! In-progress file set shared by both registries.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

/// Paths of definition files currently being loaded.
///
/// A file that is already in the set is skipped instead of being loaded a
/// second time, which breaks cycles such as a definition file that reloads
/// the playground while it is itself being loaded.
///
/// The guard also owns the loading lock shared by both registries: one
/// thread populates at a time, and only that thread may re-enter.
#[derive(Debug, Default)]
pub struct LoadingGuard {
    in_progress: Mutex<HashSet<PathBuf>>,
    loading: ReentrantMutex<()>,
}

impl LoadingGuard {
    /// Create an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the loading lock. Re-entrant for the owning thread; other
    /// threads block until it is released.
    pub fn exclusive(&self) -> ReentrantMutexGuard<'_, ()> {
        self.loading.lock()
    }

    /// Mark `path` as in progress.
    ///
    /// Returns `None` if it already is. The returned token removes the path
    /// when dropped, whether loading succeeded, failed, or panicked.
    #[must_use]
    pub fn enter(&self, path: &Path) -> Option<LoadingToken<'_>> {
        let path = path.to_path_buf();
        if !self.in_progress.lock().insert(path.clone()) {
            return None;
        }
        Some(LoadingToken { guard: self, path })
    }

    /// Whether `path` is being loaded.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.in_progress.lock().contains(path)
    }

    /// Whether nothing is being loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.in_progress.lock().is_empty()
    }

    /// Snapshot of in-progress paths, sorted.
    #[must_use]
    pub fn in_progress(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.in_progress.lock().iter().cloned().collect();
        paths.sort();
        paths
    }
}

/// Scoped membership in a [`LoadingGuard`].
#[derive(Debug)]
pub struct LoadingToken<'a> {
    guard: &'a LoadingGuard,
    path: PathBuf,
}

impl LoadingToken<'_> {
    /// Path this token holds.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LoadingToken<'_> {
    fn drop(&mut self) {
        self.guard.in_progress.lock().remove(&self.path);
    }
}
