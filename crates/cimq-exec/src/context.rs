//! Execution context manager
//!
//! Native instrumentation objects are bound to a thread that has been prepared for
//! them. This module tracks, per thread and per provider, how many scopes currently
//! need the context: the first scope initializes it, the last one to exit tears it
//! down. State is thread-local and never shared.
//!
//! Providers are identified by address. Zero-sized providers therefore share one
//! context per thread, which matches providers whose context is thread-global.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::thread;

use tracing::{debug, warn};

use crate::error::BackendError;
use crate::traits::ContextProvider;

struct ActiveContext {
    key: usize,
    depth: usize,
}

thread_local! {
    static ACTIVE: RefCell<Vec<ActiveContext>> = const { RefCell::new(Vec::new()) };
}

fn key_of<P: ?Sized>(provider: &P) -> usize {
    (provider as *const P).cast::<()>() as usize
}

/// Scope holding an initialized context on the current thread
///
/// Dropping the outermost guard for a provider tears the context down, including
/// during unwinding. Guards cannot leave their thread.
#[must_use = "the context is torn down when the guard is dropped"]
pub struct ContextGuard<'a, P: ContextProvider + ?Sized> {
    provider: &'a P,
    key: usize,
    _not_send: PhantomData<*const ()>,
}

/// Enter a context scope on the current thread
///
/// Initializes the context if this is the outermost scope for `provider`.
///
/// # Errors
/// Returns [`BackendError::ContextInitialization`] if initialization fails. A failed
/// initialization leaves nothing to tear down and is not retried.
pub fn enter<P: ContextProvider + ?Sized>(provider: &P) -> Result<ContextGuard<'_, P>, BackendError> {
    let key = key_of(provider);

    let nested = ACTIVE.with_borrow_mut(|active| {
        match active.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.depth += 1;
                true
            }
            None => false,
        }
    });

    if !nested {
        if let Err(e) = provider.initialize_context() {
            warn!(thread = ?thread::current().name(), error = %e, "execution context initialization failed");
            return Err(e);
        }
        ACTIVE.with_borrow_mut(|active| active.push(ActiveContext { key, depth: 1 }));
        debug!(thread = ?thread::current().name(), "execution context initialized");
    }

    Ok(ContextGuard {
        provider,
        key,
        _not_send: PhantomData,
    })
}

/// Whether the current thread holds an initialized context for `provider`
#[must_use]
pub fn is_active<P: ContextProvider + ?Sized>(provider: &P) -> bool {
    let key = key_of(provider);
    ACTIVE.with_borrow(|active| active.iter().any(|entry| entry.key == key))
}

/// Run `work` inside an initialized context on the current thread
///
/// Nested calls reuse the outer context. The context is torn down when the
/// outermost call returns, whether `work` succeeded, failed, or panicked.
///
/// # Errors
/// Returns the context initialization error converted into `E`, or whatever
/// `work` returns.
pub fn with_context<P, T, E, F>(provider: &P, work: F) -> Result<T, E>
where
    P: ContextProvider + ?Sized,
    E: From<BackendError>,
    F: FnOnce() -> Result<T, E>,
{
    let _guard = enter(provider)?;
    work()
}

impl<P: ContextProvider + ?Sized> Drop for ContextGuard<'_, P> {
    fn drop(&mut self) {
        let outermost = ACTIVE.with_borrow_mut(|active| {
            let Some(idx) = active.iter().position(|entry| entry.key == self.key) else {
                return false;
            };
            active[idx].depth -= 1;
            if active[idx].depth == 0 {
                active.swap_remove(idx);
                true
            } else {
                false
            }
        });

        if outermost {
            self.provider.teardown_context();
            debug!(thread = ?thread::current().name(), "execution context torn down");
        }
    }
}
