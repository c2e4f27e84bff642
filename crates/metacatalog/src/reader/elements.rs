//! Enumerations, kinds of quantity and property categories.

use std::sync::Arc;

use tracing::debug;

use super::{settle, SchemaReader};
use crate::cache::CacheSlot;
use crate::enumeration::{check_backing_type, parse_enumerators};
use crate::format_string::{FormatString, QualifiedName};
use crate::{
    CatalogError, CatalogResult, CatalogStore, EnumerationId, Enumeration, EnumerationRow,
    FormatReference, KindOfQuantity, KindOfQuantityId, KindOfQuantityRow, LoadContext,
    PropertyCategory, PropertyCategoryId, PropertyCategoryRow, Schema, SchemaId, UnitCatalog,
};

impl<S: CatalogStore> SchemaReader<S> {
    fn owning_schema(&mut self, ctx: &mut LoadContext, id: SchemaId, item: &str) -> CatalogResult<Arc<Schema>> {
        self.read_schema_stub(ctx, id)?.ok_or_else(|| {
            CatalogError::missing(format!("'{}' belongs to unknown schema {}", item, id))
        })
    }

    pub fn read_enumeration(
        &mut self,
        ctx: &mut LoadContext,
        id: EnumerationId,
    ) -> CatalogResult<Option<Arc<Enumeration>>> {
        match self.cache.enumerations.find(id) {
            Some(CacheSlot::Loaded(value)) => return Ok(Some(value.clone())),
            Some(_) => return Ok(None),
            None => {}
        }
        let Some(row) = self.store.enumeration_row(id)? else {
            debug!(%id, "no enumeration row");
            self.cache.enumerations.fail(id);
            return Ok(None);
        };
        self.cache.enumerations.begin(id, ())?;
        let name = row.name.clone();
        let built = self.build_enumeration(ctx, row);
        let enumeration = settle(&mut self.cache.enumerations, id, "enumeration", &name, built)?;
        if let Some(schema) = self.cache.schemas.loaded(enumeration.schema_id) {
            schema.update_contents(|contents| {
                contents.enumerations.insert(id);
            });
        }
        Ok(Some(enumeration))
    }

    fn build_enumeration(&mut self, ctx: &mut LoadContext, row: EnumerationRow) -> CatalogResult<Enumeration> {
        let backing_type = check_backing_type(row.backing_type)?;
        self.owning_schema(ctx, row.schema_id, &row.name)?;
        let enumerators = parse_enumerators(backing_type, &row.enum_values)?;
        Ok(Enumeration {
            id: row.id,
            schema_id: row.schema_id,
            name: row.name,
            display_label: row.display_label,
            description: row.description,
            backing_type,
            is_strict: row.is_strict,
            enumerators,
        })
    }

    pub fn read_kind_of_quantity(
        &mut self,
        ctx: &mut LoadContext,
        id: KindOfQuantityId,
    ) -> CatalogResult<Option<Arc<KindOfQuantity>>> {
        match self.cache.kinds_of_quantity.find(id) {
            Some(CacheSlot::Loaded(value)) => return Ok(Some(value.clone())),
            Some(_) => return Ok(None),
            None => {}
        }
        let Some(row) = self.store.kind_of_quantity_row(id)? else {
            debug!(%id, "no kind of quantity row");
            self.cache.kinds_of_quantity.fail(id);
            return Ok(None);
        };
        self.cache.kinds_of_quantity.begin(id, ())?;
        let name = row.name.clone();
        let built = self.build_kind_of_quantity(ctx, row);
        let koq = settle(&mut self.cache.kinds_of_quantity, id, "kind of quantity", &name, built)?;
        if let Some(schema) = self.cache.schemas.loaded(koq.schema_id) {
            schema.update_contents(|contents| {
                contents.kinds_of_quantity.insert(id);
            });
        }
        Ok(Some(koq))
    }

    fn build_kind_of_quantity(
        &mut self,
        ctx: &mut LoadContext,
        row: KindOfQuantityRow,
    ) -> CatalogResult<KindOfQuantity> {
        self.owning_schema(ctx, row.schema_id, &row.name)?;
        let catalog = self.ensure_unit_catalog(ctx)?;

        let unit_name = QualifiedName::parse(&row.persistence_unit)?;
        let persistence_unit = catalog.units.find(&unit_name).cloned().ok_or_else(|| {
            CatalogError::missing(format!(
                "persistence unit '{}' of kind of quantity '{}'",
                row.persistence_unit, row.name
            ))
        })?;

        let format_strings: Vec<String> = match &row.presentation_formats {
            Some(payload) => serde_json::from_str(payload)?,
            None => Vec::new(),
        };
        let presentation_formats = format_strings
            .iter()
            .map(|text| resolve_format(&catalog, text))
            .collect::<CatalogResult<Vec<_>>>()?;

        Ok(KindOfQuantity {
            id: row.id,
            schema_id: row.schema_id,
            name: row.name,
            display_label: row.display_label,
            description: row.description,
            persistence_unit,
            presentation_formats,
            relative_error: row.relative_error,
        })
    }

    pub fn read_property_category(
        &mut self,
        ctx: &mut LoadContext,
        id: PropertyCategoryId,
    ) -> CatalogResult<Option<Arc<PropertyCategory>>> {
        match self.cache.property_categories.find(id) {
            Some(CacheSlot::Loaded(value)) => return Ok(Some(value.clone())),
            Some(_) => return Ok(None),
            None => {}
        }
        let Some(row) = self.store.property_category_row(id)? else {
            debug!(%id, "no property category row");
            self.cache.property_categories.fail(id);
            return Ok(None);
        };
        self.cache.property_categories.begin(id, ())?;
        let name = row.name.clone();
        let built = self.build_property_category(ctx, row);
        let category = settle(&mut self.cache.property_categories, id, "property category", &name, built)?;
        if let Some(schema) = self.cache.schemas.loaded(category.schema_id) {
            schema.update_contents(|contents| {
                contents.property_categories.insert(id);
            });
        }
        Ok(Some(category))
    }

    fn build_property_category(
        &mut self,
        ctx: &mut LoadContext,
        row: PropertyCategoryRow,
    ) -> CatalogResult<PropertyCategory> {
        self.owning_schema(ctx, row.schema_id, &row.name)?;
        Ok(PropertyCategory {
            id: row.id,
            schema_id: row.schema_id,
            name: row.name,
            display_label: row.display_label,
            description: row.description,
            priority: row.priority,
        })
    }
}

/// Resolve one presentation format string against the unit catalog.
pub(crate) fn resolve_format(catalog: &UnitCatalog, text: &str) -> CatalogResult<FormatReference> {
    let parsed = FormatString::parse(text)?;
    let format = catalog.formats.find(&parsed.format).cloned().ok_or_else(|| {
        CatalogError::missing(format!("format '{}' of presentation format '{}'", parsed.format, text))
    })?;
    let unit_overrides = parsed
        .units
        .into_iter()
        .map(|unit_override| {
            let unit = catalog.units.find(&unit_override.unit).cloned().ok_or_else(|| {
                CatalogError::missing(format!(
                    "unit '{}' of presentation format '{}'",
                    unit_override.unit, text
                ))
            })?;
            Ok((unit, unit_override.label))
        })
        .collect::<CatalogResult<Vec<_>>>()?;
    Ok(FormatReference {
        format,
        precision: parsed.precision,
        unit_overrides,
    })
}
