//! Lazy entity readers.
//!
//! [`SchemaReader`] owns a store and the [`ReaderCache`] built on top of it.
//! Every reader follows the same sequence:
//!
//! 1. answer from the cache, including remembered failures
//! 2. query the row
//! 3. validate persisted enum values
//! 4. mark the slot pending, then resolve nested references through the cache
//! 5. record deferred checks in the [`LoadContext`]
//!
//! A failure after the slot went pending marks it failed, is logged with the
//! entity name and propagates to the caller.

mod class;
mod elements;
mod schema;
mod units;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::cache::{CacheKey, EntityMap, ReaderCache};
use crate::legacy_units::ReferenceUnitsLocator;
use crate::{CatalogResult, CatalogStore, LoadContext};

pub struct SchemaReader<S> {
    pub(crate) store: S,
    pub(crate) cache: ReaderCache,
    locator: Option<Box<dyn ReferenceUnitsLocator>>,
}

impl<S: fmt::Debug> fmt::Debug for SchemaReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaReader")
            .field("store", &self.store)
            .field("cache", &self.cache.stats())
            .field("has_units_locator", &self.locator.is_some())
            .finish()
    }
}

impl<S: CatalogStore> SchemaReader<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: ReaderCache::new(),
            locator: None,
        }
    }

    /// Reader that can fall back to the out-of-band reference unit schemas
    /// for stores without unit-family tables.
    pub fn with_units_locator(store: S, locator: Box<dyn ReferenceUnitsLocator>) -> Self {
        Self {
            store,
            cache: ReaderCache::new(),
            locator: Some(locator),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn cache(&self) -> &ReaderCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Run `read` with a fresh context and drain the deferred work it left,
    /// whether or not `read` succeeded.
    pub fn run<R>(
        &mut self,
        read: impl FnOnce(&mut Self, &mut LoadContext) -> CatalogResult<R>,
    ) -> CatalogResult<R> {
        let mut ctx = LoadContext::new();
        // Entities built before a failure still get their checks.
        let value = read(self, &mut ctx);
        let checked = ctx.postprocess(self);
        let value = value?;
        checked?;
        Ok(value)
    }
}

/// Store the outcome of building entity `id` in its slot.
pub(crate) fn settle<K: CacheKey, T, P>(
    map: &mut EntityMap<K, T, P>,
    id: K,
    kind: &'static str,
    name: &str,
    built: CatalogResult<T>,
) -> CatalogResult<Arc<T>> {
    match built {
        Ok(value) => {
            let value = Arc::new(value);
            map.complete(id, value.clone())?;
            debug!(kind, %id, name, "loaded");
            Ok(value)
        }
        Err(err) => {
            map.fail(id);
            error!(kind, %id, name, error = %err, "failed to load");
            Err(err)
        }
    }
}
