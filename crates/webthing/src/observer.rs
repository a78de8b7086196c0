use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use log::error;

use crate::error::{Error, ErrorKind, Result};

/// A callback invoked with every notified value.
pub type Callback<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// A stable identifier of a registered observer.
///
/// The token is returned at registration time and is the only way to
/// remove the observer afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverToken(u64);

impl ObserverToken {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ObserverToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// An ordered list of observers.
///
/// Observers are notified in registration order.
pub struct Observers<T> {
    callbacks: Mutex<IndexMap<ObserverToken, Callback<T>, DefaultHashBuilder>>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Observers<T> {
    /// Creates an empty [`Observers`] list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(IndexMap::with_hasher(DefaultHashBuilder::default())),
        }
    }

    /// Registers an observer, returning its [`ObserverToken`].
    pub fn register<F>(&self, callback: F) -> ObserverToken
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        let token = ObserverToken::next();
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token, Arc::new(callback));
        token
    }

    /// Removes the observer identified by the given token.
    ///
    /// Returns `false` if the token was not registered.
    pub fn unregister(&self, token: ObserverToken) -> bool {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&token)
            .is_some()
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Checks whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifies every observer with the given value.
    ///
    /// A failing observer does not stop the remaining ones. The first
    /// failure is returned once all observers have run.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Listener`] error if at least one observer
    /// failed.
    pub fn notify(&self, value: &T) -> Result<()> {
        // Observers may register or remove observers themselves, so the lock
        // must not be held while they run.
        let callbacks: Vec<(ObserverToken, Callback<T>)> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(token, callback)| (*token, Arc::clone(callback)))
            .collect();

        let mut first_error = None;
        for (token, callback) in callbacks {
            if let Err(e) = callback(value) {
                error!("{token} failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(Error::new(ErrorKind::Listener, e.info().to_owned())),
        }
    }
}
