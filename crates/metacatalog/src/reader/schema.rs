//! Schema stubs and full schema loading.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use super::{settle, SchemaReader};
use crate::cache::CacheSlot;
use crate::{
    CatalogError, CatalogResult, CatalogStore, FormatId, LoadContext, PhenomenonId, Schema,
    SchemaId, SchemaLookupMode, SchemaRow, UnitId, UnitSystemId,
};

impl<S: CatalogStore> SchemaReader<S> {
    /// Scalar fields, child count and the stubs of every referenced schema.
    ///
    /// Returns `Ok(None)` for an unknown id and for a schema whose stub is
    /// still being built further up the stack (reference cycle).
    pub fn read_schema_stub(
        &mut self,
        ctx: &mut LoadContext,
        id: SchemaId,
    ) -> CatalogResult<Option<Arc<Schema>>> {
        match self.cache.schemas.find(id) {
            Some(CacheSlot::Loaded(schema)) => return Ok(Some(schema.clone())),
            Some(_) => return Ok(None),
            None => {}
        }
        let Some(row) = self.store.schema_row(id)? else {
            debug!(%id, "no schema row");
            self.cache.schemas.fail(id);
            return Ok(None);
        };

        self.cache.schemas.begin(id, ())?;
        let name = row.name.clone();
        let built = self.build_schema_stub(ctx, row);
        let schema = settle(&mut self.cache.schemas, id, "schema", &name, built)?;
        ctx.schema_custom_attributes.insert(id);
        Ok(Some(schema))
    }

    fn build_schema_stub(&mut self, ctx: &mut LoadContext, row: SchemaRow) -> CatalogResult<Schema> {
        let references = self.store.schema_reference_ids(row.id)?;
        let total = self.store.schema_child_count(row.id)?;
        for &reference in &references {
            if matches!(self.cache.schemas.find(reference), Some(CacheSlot::Pending(()))) {
                continue;
            }
            if self.read_schema_stub(ctx, reference)?.is_none() {
                return Err(CatalogError::missing(format!(
                    "schema '{}' references unknown schema {}",
                    row.name, reference
                )));
            }
        }
        Ok(Schema::new(
            row.id,
            row.name,
            row.alias,
            row.version,
            row.original_version,
            row.display_label,
            row.description,
            references,
            total,
        ))
    }

    /// The schema with every child entity materialized.
    pub fn read_schema_elements(
        &mut self,
        ctx: &mut LoadContext,
        id: SchemaId,
    ) -> CatalogResult<Option<Arc<Schema>>> {
        let Some(schema) = self.read_schema_stub(ctx, id)? else {
            return Ok(None);
        };
        if self.cache.incomplete_schemas.contains(&id) {
            return Err(CatalogError::missing(format!(
                "schema '{}' failed to load its elements",
                schema.name
            )));
        }
        if schema.is_fully_loaded() || !ctx.loading_schemas.insert(id) {
            return Ok(Some(schema));
        }
        let loaded = self.load_schema_elements(ctx, &schema);
        ctx.loading_schemas.remove(&id);
        if let Err(err) = loaded {
            self.cache.incomplete_schemas.insert(id);
            error!(schema = %schema.name, error = %err, "failed to load schema elements");
            return Err(err);
        }
        Ok(Some(schema))
    }

    fn load_schema_elements(&mut self, ctx: &mut LoadContext, schema: &Arc<Schema>) -> CatalogResult<()> {
        debug!(schema = %schema.name, total = schema.total_child_count, "loading schema elements");
        for &reference in &schema.references {
            if self.read_schema_elements(ctx, reference)?.is_none() {
                return Err(CatalogError::missing(format!(
                    "schema '{}' references unknown schema {}",
                    schema.name, reference
                )));
            }
        }

        for id in self.store.class_ids(schema.id)? {
            if schema.is_fully_loaded() {
                return Ok(());
            }
            if self.read_class(ctx, id)?.is_none() {
                return Err(element_failed(schema, "class", id));
            }
        }
        for id in self.store.enumeration_ids(schema.id)? {
            if schema.is_fully_loaded() {
                return Ok(());
            }
            if self.read_enumeration(ctx, id)?.is_none() {
                return Err(element_failed(schema, "enumeration", id));
            }
        }
        for id in self.store.kind_of_quantity_ids(schema.id)? {
            if schema.is_fully_loaded() {
                return Ok(());
            }
            if self.read_kind_of_quantity(ctx, id)?.is_none() {
                return Err(element_failed(schema, "kind of quantity", id));
            }
        }
        for id in self.store.property_category_ids(schema.id)? {
            if schema.is_fully_loaded() {
                return Ok(());
            }
            if self.read_property_category(ctx, id)?.is_none() {
                return Err(element_failed(schema, "property category", id));
            }
        }

        if schema.is_fully_loaded() || !self.store.schema_has_units(schema.id)? {
            return Ok(());
        }
        let catalog = self.ensure_unit_catalog(ctx)?;
        schema.update_contents(|contents| {
            let id = schema.id;
            contents
                .unit_systems
                .extend(catalog.unit_systems.ids_owned_by(id).into_iter().map(UnitSystemId));
            contents
                .phenomena
                .extend(catalog.phenomena.ids_owned_by(id).into_iter().map(PhenomenonId));
            contents
                .units
                .extend(catalog.units.ids_owned_by(id).into_iter().map(UnitId));
            contents
                .formats
                .extend(catalog.formats.ids_owned_by(id).into_iter().map(FormatId));
        });
        Ok(())
    }

    pub fn find_schema_id(&self, name: &str, mode: SchemaLookupMode) -> CatalogResult<Option<SchemaId>> {
        self.store.schema_id(name, mode)
    }

    /// Stub, or fully loaded schema when `load_entities` is set.
    pub fn read_schema(
        &mut self,
        ctx: &mut LoadContext,
        id: SchemaId,
        load_entities: bool,
    ) -> CatalogResult<Option<Arc<Schema>>> {
        let schema = if load_entities {
            self.read_schema_elements(ctx, id)?
        } else {
            self.read_schema_stub(ctx, id)?
        };
        if let Some(schema) = &schema {
            if !schema.custom_attributes_loaded() {
                ctx.schema_custom_attributes.insert(schema.id);
            }
        }
        Ok(schema)
    }
}

fn element_failed(schema: &Schema, kind: &str, id: impl fmt::Display) -> CatalogError {
    CatalogError::missing(format!("{} {} of schema '{}' failed to load", kind, id, schema.name))
}
