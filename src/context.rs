//! Current-context slot
//!
//! Holds whatever the host considers "the current request" (a controller,
//! a request id, ...). The slot is per thread, and with the `tokio` feature a
//! task-scoped value set through [`scope`] takes precedence, so concurrent
//! requests never observe each other's context.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

/// Type-erased context value.
pub type Context = Arc<dyn Any + Send + Sync>;

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

#[cfg(feature = "tokio")]
tokio::task_local! {
    static TASK_CURRENT: Context;
}

/// Replace this thread's context, returning the previous one.
pub fn set_current(context: Option<Context>) -> Option<Context> {
    CURRENT.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), context))
}

#[cfg(feature = "tokio")]
fn task_current() -> Option<Context> {
    TASK_CURRENT.try_with(Arc::clone).ok()
}

#[cfg(not(feature = "tokio"))]
const fn task_current() -> Option<Context> {
    None
}

/// Context visible to the caller: the task-scoped one if any, else the thread's.
#[must_use]
pub fn current() -> Option<Context> {
    task_current().or_else(|| CURRENT.with(|slot| slot.borrow().clone()))
}

/// Current context downcast to `T`.
#[must_use]
pub fn current_as<T: Any + Send + Sync>() -> Option<Arc<T>> {
    current()?.downcast::<T>().ok()
}

/// Run `f` with `context` installed on this thread, restoring the previous
/// context afterwards (also on panic).
pub fn with_current<R>(context: Context, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Context>);

    impl Drop for Restore {
        fn drop(&mut self) {
            set_current(self.0.take());
        }
    }

    let _restore = Restore(set_current(Some(context)));
    f()
}

/// Run `future` with `context` as its task-scoped context.
#[cfg(feature = "tokio")]
pub async fn scope<F: std::future::Future>(context: Context, future: F) -> F::Output {
    TASK_CURRENT.scope(context, future).await
}
