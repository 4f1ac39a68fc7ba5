//! Process-wide default playground

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::Playground;
use crate::Result;

fn slot() -> &'static RwLock<Option<Arc<Playground>>> {
    static DEFAULT: OnceLock<RwLock<Option<Arc<Playground>>>> = OnceLock::new();
    DEFAULT.get_or_init(|| RwLock::new(None))
}

/// Default playground, built with [`Playground::from_env`] on first use.
///
/// # Errors
/// Returns error if building the default playground fails; the next call
/// tries again
pub fn playground() -> Result<Arc<Playground>> {
    if let Some(playground) = slot().read().as_ref() {
        return Ok(Arc::clone(playground));
    }

    let mut slot = slot().write();
    if let Some(playground) = slot.as_ref() {
        return Ok(Arc::clone(playground));
    }
    let playground = Arc::new(Playground::from_env()?);
    tracing::debug!(environment = playground.environment(), "default playground built");
    *slot = Some(Arc::clone(&playground));
    Ok(playground)
}

/// Replace the default playground, returning the previous one.
///
/// `None` clears it so the next [`playground`] call builds a fresh one.
pub fn set_playground(playground: Option<Arc<Playground>>) -> Option<Arc<Playground>> {
    std::mem::replace(&mut *slot().write(), playground)
}
