//! Mutex-serialized registry for hosts that intercept from several threads.

use crate::error::{RegistryError, Result};
use crate::registry::Registry;
use provio_id::Identity;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SharedRegistry<I: Identity> {
    inner: Arc<Mutex<Registry<I>>>,
}

impl<I: Identity> SharedRegistry<I> {
    pub fn new(registry: Registry<I>) -> Self {
        Self { inner: Arc::new(Mutex::new(registry)) }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Registry<I>>> {
        self.inner.lock().map_err(|_| RegistryError::LockPoisoned)
    }

    /// Run `f` with exclusive access to the registry.
    pub fn with<R>(&self, f: impl FnOnce(&mut Registry<I>) -> Result<R>) -> Result<R> {
        let mut registry = self.lock()?;
        f(&mut registry)
    }
}

impl<I: Identity> Clone for SharedRegistry<I> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}
