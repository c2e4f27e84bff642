//! Thread-safe facade over a [`SchemaReader`].
//!
//! Every public call takes the manager lock, runs its readers with a fresh
//! [`crate::LoadContext`] and postprocesses before the lock is released, so
//! callers only ever observe fully validated entities.
//!
//! # Examples
//!
//! ```
//! use metacatalog::{ClassDef, MemoryStore, SchemaDef, SchemaManager, SchemaVersion};
//!
//! let manager = SchemaManager::new(MemoryStore::new());
//! let schema = SchemaDef::new("Plant", "plant", SchemaVersion::new(1, 0, 0))
//!     .with_class(ClassDef::entity("Pump"));
//! manager.import_schemas(vec![schema]).unwrap();
//!
//! let pump = manager.get_class("plant", "Pump").unwrap().unwrap();
//! assert!(pump.is_entity());
//! ```

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::dependency::build_dependency_ordered_list;
use crate::format_string::QualifiedName;
use crate::legacy_units::ReferenceUnitsLocator;
use crate::supplemental::apply_supplementals;
use crate::{
    sync, CacheStats, CatalogError, CatalogResult, CatalogStore, CatalogWriter, Class, ClassId,
    Enumeration, EnumerationId, Format, FormatId, KindOfQuantity, KindOfQuantityId, Phenomenon,
    PhenomenonId, PropertyCategory, PropertyCategoryId, Schema, SchemaDef, SchemaId,
    SchemaLookupMode, SchemaReader, SchemaWriter, Unit, UnitCatalog, UnitId, UnitSystem,
    UnitSystemId,
};

pub struct SchemaManager<S> {
    reader: Mutex<SchemaReader<S>>,
}

impl<S: CatalogStore> std::fmt::Debug for SchemaManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reader = sync::lock(&self.reader);
        f.debug_struct("SchemaManager")
            .field("store", &reader.store().identity())
            .field("cache", &reader.cache().stats())
            .finish()
    }
}

impl<S: CatalogStore> SchemaManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            reader: Mutex::new(SchemaReader::new(store)),
        }
    }

    pub fn with_units_locator(store: S, locator: Box<dyn ReferenceUnitsLocator>) -> Self {
        Self {
            reader: Mutex::new(SchemaReader::with_units_locator(store, locator)),
        }
    }

    /// Run `f` under the lock with access to the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let reader = sync::lock(&self.reader);
        f(reader.store())
    }

    pub fn cache_stats(&self) -> CacheStats {
        sync::lock(&self.reader).cache().stats()
    }

    /// Drop every cached entity. Handles held by callers stay valid but are
    /// no longer shared with later lookups.
    pub fn clear_cache(&self) {
        let mut reader = sync::lock(&self.reader);
        let stats = reader.cache().stats();
        reader.clear_cache();
        info!(
            schemas = stats.schemas,
            classes = stats.classes,
            "cleared schema cache"
        );
    }

    fn schema_in(
        reader: &mut SchemaReader<S>,
        ctx: &mut crate::LoadContext,
        name: &str,
        mode: SchemaLookupMode,
        load_entities: bool,
    ) -> CatalogResult<Option<Arc<Schema>>> {
        match reader.find_schema_id(name, mode)? {
            Some(id) => reader.read_schema(ctx, id, load_entities),
            None => {
                debug!(schema = name, ?mode, "no such schema");
                Ok(None)
            }
        }
    }

    /// Schema by name. With `load_entities` every child entity is loaded.
    pub fn get_schema(&self, name: &str, load_entities: bool) -> CatalogResult<Option<Arc<Schema>>> {
        self.get_schema_with_mode(name, SchemaLookupMode::ByName, load_entities)
    }

    pub fn get_schema_with_mode(
        &self,
        name: &str,
        mode: SchemaLookupMode,
        load_entities: bool,
    ) -> CatalogResult<Option<Arc<Schema>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| Self::schema_in(reader, ctx, name, mode, load_entities))
    }

    pub fn get_schema_by_id(&self, id: SchemaId, load_entities: bool) -> CatalogResult<Option<Arc<Schema>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| reader.read_schema(ctx, id, load_entities))
    }

    /// Every schema of the store, in store order.
    pub fn get_schemas(&self, load_entities: bool) -> CatalogResult<Vec<Arc<Schema>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| {
            let mut schemas = Vec::new();
            for id in reader.store().schema_ids()? {
                if let Some(schema) = reader.read_schema(ctx, id, load_entities)? {
                    schemas.push(schema);
                }
            }
            Ok(schemas)
        })
    }

    /// Class by schema name or alias and class name.
    pub fn get_class(&self, schema: &str, class: &str) -> CatalogResult<Option<Arc<Class>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| match Self::class_id_in(reader, ctx, schema, class)? {
            Some(id) => reader.read_class(ctx, id),
            None => Ok(None),
        })
    }

    pub fn get_class_id(&self, schema: &str, class: &str) -> CatalogResult<Option<ClassId>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| Self::class_id_in(reader, ctx, schema, class))
    }

    fn class_id_in(
        reader: &mut SchemaReader<S>,
        ctx: &mut crate::LoadContext,
        schema: &str,
        class: &str,
    ) -> CatalogResult<Option<ClassId>> {
        let key = crate::ReaderCache::class_name_key(schema, class);
        if let Some(found) = reader.cache.class_names.get(&key) {
            return Ok(*found);
        }
        let Some(schema) = Self::schema_in(reader, ctx, schema, SchemaLookupMode::AutoDetect, false)? else {
            return Ok(None);
        };
        reader.find_class_id(&schema, class)
    }

    pub fn get_class_by_id(&self, id: ClassId) -> CatalogResult<Option<Arc<Class>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| reader.read_class(ctx, id))
    }

    /// Direct subclasses; `None` when the class itself is unknown.
    pub fn get_derived_classes(&self, id: ClassId) -> CatalogResult<Option<Vec<Arc<Class>>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| reader.read_derived_classes(ctx, id))
    }

    fn schema_id_in(reader: &SchemaReader<S>, schema: &str) -> CatalogResult<Option<SchemaId>> {
        reader.find_schema_id(schema, SchemaLookupMode::AutoDetect)
    }

    pub fn get_enumeration(&self, schema: &str, name: &str) -> CatalogResult<Option<Arc<Enumeration>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| {
            let Some(schema_id) = Self::schema_id_in(reader, schema)? else {
                return Ok(None);
            };
            match reader.store().enumeration_id(schema_id, name)? {
                Some(id) => reader.read_enumeration(ctx, id),
                None => Ok(None),
            }
        })
    }

    pub fn get_enumeration_by_id(&self, id: EnumerationId) -> CatalogResult<Option<Arc<Enumeration>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| reader.read_enumeration(ctx, id))
    }

    pub fn get_kind_of_quantity(
        &self,
        schema: &str,
        name: &str,
    ) -> CatalogResult<Option<Arc<KindOfQuantity>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| {
            let Some(schema_id) = Self::schema_id_in(reader, schema)? else {
                return Ok(None);
            };
            match reader.store().kind_of_quantity_id(schema_id, name)? {
                Some(id) => reader.read_kind_of_quantity(ctx, id),
                None => Ok(None),
            }
        })
    }

    pub fn get_kind_of_quantity_by_id(
        &self,
        id: KindOfQuantityId,
    ) -> CatalogResult<Option<Arc<KindOfQuantity>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| reader.read_kind_of_quantity(ctx, id))
    }

    pub fn get_property_category(
        &self,
        schema: &str,
        name: &str,
    ) -> CatalogResult<Option<Arc<PropertyCategory>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| {
            let Some(schema_id) = Self::schema_id_in(reader, schema)? else {
                return Ok(None);
            };
            match reader.store().property_category_id(schema_id, name)? {
                Some(id) => reader.read_property_category(ctx, id),
                None => Ok(None),
            }
        })
    }

    pub fn get_property_category_by_id(
        &self,
        id: PropertyCategoryId,
    ) -> CatalogResult<Option<Arc<PropertyCategory>>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| reader.read_property_category(ctx, id))
    }

    /// The whole unit family, loaded on first use.
    pub fn get_unit_catalog(&self) -> CatalogResult<Arc<UnitCatalog>> {
        let mut reader = sync::lock(&self.reader);
        reader.run(|reader, ctx| reader.ensure_unit_catalog(ctx))
    }

    fn with_catalog<R>(&self, find: impl FnOnce(&UnitCatalog) -> Option<Arc<R>>) -> CatalogResult<Option<Arc<R>>> {
        let catalog = self.get_unit_catalog()?;
        Ok(find(&catalog))
    }

    pub fn get_unit_system(&self, schema: &str, name: &str) -> CatalogResult<Option<Arc<UnitSystem>>> {
        let name = QualifiedName::new(schema, name);
        self.with_catalog(|catalog| catalog.unit_systems.find(&name).cloned())
    }

    pub fn get_unit_system_by_id(&self, id: UnitSystemId) -> CatalogResult<Option<Arc<UnitSystem>>> {
        self.with_catalog(|catalog| catalog.unit_systems.get(id.0).cloned())
    }

    pub fn get_phenomenon(&self, schema: &str, name: &str) -> CatalogResult<Option<Arc<Phenomenon>>> {
        let name = QualifiedName::new(schema, name);
        self.with_catalog(|catalog| catalog.phenomena.find(&name).cloned())
    }

    pub fn get_phenomenon_by_id(&self, id: PhenomenonId) -> CatalogResult<Option<Arc<Phenomenon>>> {
        self.with_catalog(|catalog| catalog.phenomena.get(id.0).cloned())
    }

    pub fn get_unit(&self, schema: &str, name: &str) -> CatalogResult<Option<Arc<Unit>>> {
        let name = QualifiedName::new(schema, name);
        self.with_catalog(|catalog| catalog.units.find(&name).cloned())
    }

    pub fn get_unit_by_id(&self, id: UnitId) -> CatalogResult<Option<Arc<Unit>>> {
        self.with_catalog(|catalog| catalog.units.get(id.0).cloned())
    }

    pub fn get_format(&self, schema: &str, name: &str) -> CatalogResult<Option<Arc<Format>>> {
        let name = QualifiedName::new(schema, name);
        self.with_catalog(|catalog| catalog.formats.find(&name).cloned())
    }

    pub fn get_format_by_id(&self, id: FormatId) -> CatalogResult<Option<Arc<Format>>> {
        self.with_catalog(|catalog| catalog.formats.get(id.0).cloned())
    }
}

impl<S: CatalogStore + CatalogWriter> SchemaManager<S> {
    /// Import schema definitions, dependencies first, and return the stubs
    /// of every requested schema.
    ///
    /// Schemas already present with the same version are skipped. Rows
    /// written before a failure are not rolled back.
    pub fn import_schemas(&self, mut defs: Vec<SchemaDef>) -> CatalogResult<Vec<Arc<Schema>>> {
        let mut reader = sync::lock(&self.reader);
        if reader.store().is_readonly() {
            return Err(CatalogError::policy("cannot import schemas into a read-only store"));
        }
        if defs.is_empty() {
            return Err(CatalogError::policy("no schemas to import"));
        }
        let identity = reader.store().identity();
        if let Some(foreign) = defs.iter().find(|d| d.origin.as_ref().is_some_and(|o| *o != identity)) {
            return Err(CatalogError::policy(format!(
                "schema '{}' belongs to another store",
                foreign.name
            )));
        }

        let requested: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();
        let mut present = Vec::new();
        for def in &defs {
            let Some(id) = reader.find_schema_id(&def.name, SchemaLookupMode::ByName)? else {
                continue;
            };
            let row = reader
                .store()
                .schema_row(id)?
                .ok_or_else(|| CatalogError::missing(format!("row of schema {}", id)))?;
            if row.version != def.version {
                return Err(CatalogError::policy(format!(
                    "schema '{}' {} is already present as {}",
                    def.name, def.version, row.version
                )));
            }
            warn!(schema = %def.name, version = %def.version, "schema already present, skipping");
            present.push(def.name.to_ascii_lowercase());
        }
        defs.retain(|d| !present.contains(&d.name.to_ascii_lowercase()));

        let mut order: Vec<String> = build_dependency_ordered_list(&defs)
            .iter()
            .map(|d| d.name.clone())
            .collect();
        if apply_supplementals(&mut defs)? {
            debug!("supplemental schemas added references, rebuilding import order");
            order = build_dependency_ordered_list(&defs)
                .iter()
                .map(|d| d.name.clone())
                .collect();
        }

        let mut writer = SchemaWriter::new(reader.store_mut());
        for name in &order {
            let Some(def) = defs.iter().find(|d| d.is_named(name)) else {
                continue;
            };
            let id = writer.write(def)?;
            info!(schema = %def.name, version = %def.version, %id, "imported schema");
        }

        reader.clear_cache();
        let schemas = reader.run(|reader, ctx| {
            let mut schemas = Vec::with_capacity(requested.len());
            for name in &requested {
                let schema = Self::schema_in(reader, ctx, name, SchemaLookupMode::ByName, false)?
                    .ok_or_else(|| CatalogError::missing(format!("imported schema '{}'", name)))?;
                schemas.push(schema);
            }
            Ok(schemas)
        })?;
        reader.store_mut().regenerate_views()?;
        info!(imported = order.len(), skipped = present.len(), "schema import finished");
        Ok(schemas)
    }
}
