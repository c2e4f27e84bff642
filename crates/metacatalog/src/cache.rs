//! Identity map of materialized entities.
//!
//! Every entity kind has its own map keyed by stable id. A slot is one of:
//!
//! - [`CacheSlot::Pending`]: inserted before nested references are resolved,
//!   so a cycle finds the entity instead of recursing forever
//! - [`CacheSlot::Failed`]: the entity could not be built; later lookups
//!   answer "absent" without touching the store
//! - [`CacheSlot::Loaded`]: the shared instance handed to every caller
//!
//! # Examples
//!
//! ```
//! use metacatalog::{CacheSlot, EntityMap, SchemaId};
//! use std::sync::Arc;
//!
//! let mut map: EntityMap<SchemaId, String> = EntityMap::new();
//! map.begin(SchemaId(1), ()).unwrap();
//! assert!(matches!(map.find(SchemaId(1)), Some(CacheSlot::Pending(()))));
//! map.complete(SchemaId(1), Arc::new("Units".to_string())).unwrap();
//! assert_eq!(map.loaded(SchemaId(1)).as_deref().map(String::as_str), Some("Units"));
//! assert!(map.begin(SchemaId::TRANSIENT, ()).is_err());
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::{
    CatalogError, CatalogResult, Class, ClassId, ClassType, EnumerationId, Enumeration,
    KindOfQuantity, KindOfQuantityId, PropertyCategory, PropertyCategoryId, Schema, SchemaId,
    UnitCatalog,
};

/// Keys usable in an [`EntityMap`].
pub trait CacheKey: Copy + Eq + Hash + fmt::Display {
    fn is_transient(self) -> bool;
}

macro_rules! cache_key {
    ($($id:ty),*) => {
        $(impl CacheKey for $id {
            fn is_transient(self) -> bool {
                !self.is_valid()
            }
        })*
    };
}

cache_key!(SchemaId, ClassId, EnumerationId, KindOfQuantityId, PropertyCategoryId);

#[derive(Debug)]
pub enum CacheSlot<T, P = ()> {
    Pending(P),
    Failed,
    Loaded(Arc<T>),
}

impl<T, P> CacheSlot<T, P> {
    pub fn loaded(&self) -> Option<&Arc<T>> {
        match self {
            CacheSlot::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CacheSlot::Failed)
    }
}

/// Slots of one entity kind.
#[derive(Debug)]
pub struct EntityMap<K, T, P = ()> {
    slots: HashMap<K, CacheSlot<T, P>>,
}

impl<K: CacheKey, T, P> Default for EntityMap<K, T, P> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<K: CacheKey, T, P> EntityMap<K, T, P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Side-effect free lookup.
    pub fn find(&self, id: K) -> Option<&CacheSlot<T, P>> {
        self.slots.get(&id)
    }

    pub fn loaded(&self, id: K) -> Option<Arc<T>> {
        self.find(id).and_then(|slot| slot.loaded()).cloned()
    }

    /// Mark `id` as in progress.
    pub fn begin(&mut self, id: K, payload: P) -> CatalogResult<()> {
        Self::check(id)?;
        self.slots.insert(id, CacheSlot::Pending(payload));
        Ok(())
    }

    pub fn complete(&mut self, id: K, value: Arc<T>) -> CatalogResult<()> {
        Self::check(id)?;
        self.slots.insert(id, CacheSlot::Loaded(value));
        Ok(())
    }

    /// Remember that `id` cannot be built.
    pub fn fail(&mut self, id: K) {
        self.slots.insert(id, CacheSlot::Failed);
    }

    pub fn loaded_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, CacheSlot::Loaded(_)))
            .count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    fn check(id: K) -> CatalogResult<()> {
        if id.is_transient() {
            return Err(CatalogError::TransientEntity(id.to_string()));
        }
        Ok(())
    }
}

/// What is known about a class before it is fully built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassHeader {
    pub schema_id: SchemaId,
    pub class_type: ClassType,
}

/// Number of loaded entities per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub schemas: usize,
    pub classes: usize,
    pub enumerations: usize,
    pub kinds_of_quantity: usize,
    pub property_categories: usize,
    pub units_loaded: bool,
}

/// Every entity materialized by one `SchemaReader`.
#[derive(Debug, Default)]
pub struct ReaderCache {
    pub(crate) schemas: EntityMap<SchemaId, Schema>,
    pub(crate) classes: EntityMap<ClassId, Class, ClassHeader>,
    pub(crate) enumerations: EntityMap<EnumerationId, Enumeration>,
    pub(crate) kinds_of_quantity: EntityMap<KindOfQuantityId, KindOfQuantity>,
    pub(crate) property_categories: EntityMap<PropertyCategoryId, PropertyCategory>,
    /// `None` until the unit family was requested; `Failed` is remembered.
    pub(crate) units: Option<CacheSlot<UnitCatalog>>,
    /// Catalog built from the out-of-band reference schemas.
    pub(crate) legacy_units: Option<Arc<UnitCatalog>>,
    /// `(schema name, class name)`, lowercase.
    pub(crate) class_names: HashMap<(String, String), Option<ClassId>>,
    pub(crate) verified_relationships: HashSet<ClassId>,
    /// Schemas whose full load failed.
    pub(crate) incomplete_schemas: HashSet<SchemaId>,
}

impl ReaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn class_name_key(schema_name: &str, class_name: &str) -> (String, String) {
        (
            schema_name.to_ascii_lowercase(),
            class_name.to_ascii_lowercase(),
        )
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            schemas: self.schemas.loaded_count(),
            classes: self.classes.loaded_count(),
            enumerations: self.enumerations.loaded_count(),
            kinds_of_quantity: self.kinds_of_quantity.loaded_count(),
            property_categories: self.property_categories.loaded_count(),
            units_loaded: matches!(self.units, Some(CacheSlot::Loaded(_))),
        }
    }

    /// Drop every entity, including the legacy unit catalog.
    pub fn clear(&mut self) {
        self.schemas.clear();
        self.classes.clear();
        self.enumerations.clear();
        self.kinds_of_quantity.clear();
        self.property_categories.clear();
        self.units = None;
        self.legacy_units = None;
        self.class_names.clear();
        self.verified_relationships.clear();
        self.incomplete_schemas.clear();
    }
}
