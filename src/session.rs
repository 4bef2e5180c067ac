//! Shared handle to one native session.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

/// Identity of a session, stable for as long as any handle to it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(usize);

/// A lockable reference to a native session.
///
/// The connection adapter, its statements and a borrower all hold clones of
/// the same handle.
pub struct SessionHandle<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> SessionHandle<S> {
    pub(crate) fn new(session: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Lock the session for direct use.
    pub fn lock(&self) -> Result<MutexGuard<'_, S>> {
        Ok(self.inner.lock()?)
    }

    pub fn id(&self) -> SessionId {
        SessionId(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    /// Returns true if both handles refer to the same session.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for SessionHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionHandle").field(&self.id()).finish()
    }
}
