//! Lazily loaded definition registries
//!
//! A [`Registry`] scans a directory for definition files the first time it
//! is read, hands each file to a [`DefinitionLoader`], and memoizes the
//! resulting id → definition map until it is reset.
//!
//! ## Loading
//!
//! ```text
//! Unloaded ──first read──> take loading lock ──> install empty map (Loading)
//!                                                           │
//!                          scan <dir>/*.<ext>; per file: skip if in
//!                          LoadingGuard, else enter, loader.load(ctx),
//!                          release (also on error)
//!                                                           │
//!                          after-load step (remote metrics) ──> Loaded
//! ```
//!
//! Population runs under the re-entrant lock owned by the [`LoadingGuard`],
//! shared by both registries. Readers on other threads wait for the load to
//! finish and never observe a partial map. A re-entrant read from inside a
//! loader, on the loading thread, observes the partially populated map
//! instead of recursing.
//!
//! Loaders register into the registry's current map. If a loader reloads
//! the playground, definitions it registers afterwards land in the fresh
//! map rather than the discarded one.
//!
//! A loader error propagates to the caller that triggered the load and the
//! registry stays `Loaded` with whatever was registered before the failure.
//! The failing file is not retried until [`Registry::reset`] (or
//! `Playground::reload`).

mod guard;
mod json;

pub use guard::{LoadingGuard, LoadingToken};
pub use json::{JsonExperimentLoader, JsonMetricLoader};

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::Level;

use crate::definition::Definition;
use crate::id::normalize;
use crate::playground::Playground;
use crate::{Error, Result};

/// Live id → definition map shared by a loaded registry and its loaders.
pub type DefinitionMap<D> = DashMap<String, Arc<D>>;

/// Step run once after all files of a registry were loaded.
pub type AfterLoad<D> = fn(&Playground, &DefinitionMap<D>) -> Result<()>;

/// Loads one definition file.
///
/// Loading registers zero or more definitions through
/// [`LoadContext::register`]. The context also exposes the playground, so a
/// loader may look up other definitions (which can trigger loading of the
/// other registry).
pub trait DefinitionLoader<D: Definition>: Send + Sync {
    /// File extension scanned for, without the dot.
    fn extension(&self) -> &str {
        "json"
    }

    /// Load the file at `ctx.path()`.
    ///
    /// # Errors
    /// Returns error if the file is unreadable or malformed
    fn load(&self, ctx: &LoadContext<'_, D>) -> Result<()>;
}

/// Adapts a closure into a [`DefinitionLoader`].
pub struct FnLoader<D, F> {
    extension: String,
    load: F,
    _definition: PhantomData<fn() -> D>,
}

impl<D, F> FnLoader<D, F>
where
    D: Definition,
    F: Fn(&LoadContext<'_, D>) -> Result<()> + Send + Sync,
{
    /// Wrap `load`, scanning for `*.<extension>` files.
    pub fn new(extension: impl Into<String>, load: F) -> Self {
        Self {
            extension: extension.into(),
            load,
            _definition: PhantomData,
        }
    }
}

impl<D, F> DefinitionLoader<D> for FnLoader<D, F>
where
    D: Definition,
    F: Fn(&LoadContext<'_, D>) -> Result<()> + Send + Sync,
{
    fn extension(&self) -> &str {
        &self.extension
    }

    fn load(&self, ctx: &LoadContext<'_, D>) -> Result<()> {
        (self.load)(ctx)
    }
}

/// What a loader sees while loading one file.
pub struct LoadContext<'a, D: Definition> {
    playground: &'a Playground,
    guard: &'a LoadingGuard,
    path: &'a Path,
    registry: &'a Registry<D>,
    map: &'a Arc<DefinitionMap<D>>,
}

impl<'a, D: Definition> LoadContext<'a, D> {
    /// Playground the registry belongs to.
    #[must_use]
    pub const fn playground(&self) -> &'a Playground {
        self.playground
    }

    /// Shared in-progress set.
    #[must_use]
    pub const fn guard(&self) -> &'a LoadingGuard {
        self.guard
    }

    /// File being loaded.
    #[must_use]
    pub const fn path(&self) -> &'a Path {
        self.path
    }

    /// Id derived from the file stem (`Price Test.json` → `price_test`).
    #[must_use]
    pub fn file_id(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| normalize(&stem.to_string_lossy()))
            .unwrap_or_default()
    }

    /// Whether `id` is already registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.target().contains_key(id)
    }

    /// Register `definition`, replacing any earlier one with the same id.
    pub fn register(&self, definition: D) -> Arc<D> {
        let definition = Arc::new(definition);
        let id = definition.id().to_string();
        if self.target().insert(id.clone(), Arc::clone(&definition)).is_some() {
            tracing::warn!(kind = D::KIND, %id, path = %self.path.display(), "definition redefined");
        }
        definition
    }

    /// Build a [`Error::Definition`] pointing at the current file.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Definition {
            path: self.path.to_path_buf(),
            message: message.into(),
        }
    }

    // The registry may have been reset and reloaded by this loader.
    fn target(&self) -> Arc<DefinitionMap<D>> {
        self.registry
            .current()
            .unwrap_or_else(|| Arc::clone(self.map))
    }
}

enum LoadState<D> {
    Unloaded,
    Loading(Arc<DefinitionMap<D>>),
    Loaded(Arc<DefinitionMap<D>>),
}

impl<D> LoadState<D> {
    const fn definitions(&self) -> Option<&Arc<DefinitionMap<D>>> {
        match self {
            Self::Unloaded => None,
            Self::Loading(map) | Self::Loaded(map) => Some(map),
        }
    }
}

/// Lazily loaded, memoized map of definitions of one kind.
pub struct Registry<D: Definition> {
    subdirectory: Option<&'static str>,
    loader: Arc<dyn DefinitionLoader<D>>,
    after_load: Option<AfterLoad<D>>,
    state: RwLock<LoadState<D>>,
}

impl<D: Definition> Registry<D> {
    /// Registry scanning the load path itself.
    #[must_use]
    pub fn new(loader: Arc<dyn DefinitionLoader<D>>) -> Self {
        Self {
            subdirectory: None,
            loader,
            after_load: None,
            state: RwLock::new(LoadState::Unloaded),
        }
    }

    /// Scan `<load_path>/<subdirectory>` instead.
    #[must_use]
    pub const fn in_subdirectory(mut self, subdirectory: &'static str) -> Self {
        self.subdirectory = Some(subdirectory);
        self
    }

    /// Run `step` after the files were loaded.
    #[must_use]
    pub fn after_load(mut self, step: AfterLoad<D>) -> Self {
        self.after_load = Some(step);
        self
    }

    /// Directory scanned for a given load path.
    #[must_use]
    pub fn directory(&self, load_path: &Path) -> PathBuf {
        match self.subdirectory {
            Some(sub) => load_path.join(sub),
            None => load_path.to_path_buf(),
        }
    }

    /// Whether the map has been installed (loading counts).
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !matches!(*self.state.read(), LoadState::Unloaded)
    }

    /// Drop back to `Unloaded`.
    pub fn reset(&self) {
        *self.state.write() = LoadState::Unloaded;
    }

    /// Definition with `id`, loading the registry first if needed.
    ///
    /// Repeated calls return the same `Arc`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if absent after loading, or loading errors
    pub fn get(&self, playground: &Playground, id: &str) -> Result<Arc<D>> {
        self.map(playground)?
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::NotFound {
                kind: D::KIND,
                id: id.to_string(),
            })
    }

    /// Snapshot of all definitions, ordered by id.
    ///
    /// # Errors
    /// Returns loading errors
    pub fn all(&self, playground: &Playground) -> Result<BTreeMap<String, Arc<D>>> {
        Ok(self
            .map(playground)?
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect())
    }

    /// Load the registry if it is not loaded yet.
    ///
    /// # Errors
    /// Returns loading errors
    pub fn load(&self, playground: &Playground) -> Result<()> {
        self.map(playground).map(|_| ())
    }

    fn current(&self) -> Option<Arc<DefinitionMap<D>>> {
        self.state.read().definitions().map(Arc::clone)
    }

    fn map(&self, playground: &Playground) -> Result<Arc<DefinitionMap<D>>> {
        if let LoadState::Loaded(map) = &*self.state.read() {
            return Ok(Arc::clone(map));
        }

        let _loading = playground.loading_guard().exclusive();
        let map = {
            let mut state = self.state.write();
            // Only the loading thread gets past the lock while loading.
            if let Some(map) = state.definitions() {
                return Ok(Arc::clone(map));
            }
            let map = Arc::new(DefinitionMap::<D>::new());
            *state = LoadState::Loading(Arc::clone(&map));
            map
        };

        let result = self.populate(playground, &map);

        let mut state = self.state.write();
        if matches!(&*state, LoadState::Loading(current) if Arc::ptr_eq(current, &map)) {
            *state = LoadState::Loaded(Arc::clone(&map));
        }
        let current = state.definitions().map_or(map, Arc::clone);
        drop(state);

        result.map(|()| current)
    }

    fn populate(&self, playground: &Playground, map: &Arc<DefinitionMap<D>>) -> Result<()> {
        let directory = self.directory(&playground.load_path());
        playground.log(
            Level::INFO,
            &format!("trueno-ab: loading {}s from {}", D::KIND, directory.display()),
        );

        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&directory.to_string_lossy()),
            self.loader.extension()
        );

        let guard = playground.loading_guard();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| Error::Io(e.into()))?;
            let Some(_token) = guard.enter(&path) else {
                tracing::debug!(kind = D::KIND, path = %path.display(), "already loading, skipped");
                continue;
            };
            let ctx = LoadContext {
                playground,
                guard,
                path: &path,
                registry: self,
                map,
            };
            self.loader.load(&ctx)?;
        }

        if let Some(step) = self.after_load {
            let current = self.current().unwrap_or_else(|| Arc::clone(map));
            step(playground, &current)?;
        }
        Ok(())
    }
}

impl<D: Definition> fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &D::KIND)
            .field("subdirectory", &self.subdirectory)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}
