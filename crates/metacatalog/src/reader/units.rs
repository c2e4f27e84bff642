//! Unit family: loaded once per cache lifetime, as one batch.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::SchemaReader;
use crate::cache::CacheSlot;
use crate::format_string::MAX_COMPOSITE_UNITS;
use crate::legacy_units::build_legacy_catalog;
use crate::{
    CatalogError, CatalogResult, CatalogStore, CompositeSpec, CompositeUnit, Format,
    LoadContext, NumericSpec, OwnerSchema, Phenomenon, SchemaId, Unit, UnitCatalog, UnitKind,
    UnitSource, UnitSystem,
};

impl<S: CatalogStore> SchemaReader<S> {
    /// The unit catalog of the store, built on first use.
    ///
    /// Stores without unit-family tables fall back to the legacy reference
    /// schemas when they hold any kind of quantity; otherwise the catalog is
    /// empty.
    pub fn ensure_unit_catalog(&mut self, ctx: &mut LoadContext) -> CatalogResult<Arc<UnitCatalog>> {
        match &self.cache.units {
            Some(CacheSlot::Loaded(catalog)) => return Ok(catalog.clone()),
            Some(CacheSlot::Failed) => {
                return Err(CatalogError::missing("the unit catalog failed to load earlier"))
            }
            Some(CacheSlot::Pending(())) => {
                return Err(CatalogError::malformed("the unit catalog depends on itself"))
            }
            None => {}
        }
        self.cache.units = Some(CacheSlot::Pending(()));
        match self.build_unit_catalog(ctx) {
            Ok(catalog) => {
                debug!(
                    source = ?catalog.source,
                    units = catalog.units.len(),
                    formats = catalog.formats.len(),
                    "loaded unit catalog"
                );
                self.cache.units = Some(CacheSlot::Loaded(catalog.clone()));
                Ok(catalog)
            }
            Err(err) => {
                self.cache.units = Some(CacheSlot::Failed);
                error!(error = %err, "failed to load unit catalog");
                Err(err)
            }
        }
    }

    fn build_unit_catalog(&mut self, ctx: &mut LoadContext) -> CatalogResult<Arc<UnitCatalog>> {
        if self.store.has_unit_tables()? {
            return Ok(Arc::new(self.load_store_units(ctx)?));
        }
        if !self.store.any_kind_of_quantity()? {
            return Ok(Arc::new(UnitCatalog::new(UnitSource::Store)));
        }
        if let Some(catalog) = &self.cache.legacy_units {
            return Ok(catalog.clone());
        }
        let locator = self.locator.as_deref().ok_or_else(|| {
            CatalogError::NotFound(
                "the store predates unit tables and no reference units locator is configured"
                    .to_string(),
            )
        })?;
        info!("building unit catalog from the legacy reference schemas");
        let catalog = Arc::new(build_legacy_catalog(locator)?);
        self.cache.legacy_units = Some(catalog.clone());
        Ok(catalog)
    }

    fn owner_schema(
        &mut self,
        ctx: &mut LoadContext,
        owners: &mut HashMap<SchemaId, OwnerSchema>,
        id: SchemaId,
        item: &str,
    ) -> CatalogResult<OwnerSchema> {
        if let Some(owner) = owners.get(&id) {
            return Ok(owner.clone());
        }
        let schema = self.read_schema_stub(ctx, id)?.ok_or_else(|| {
            CatalogError::missing(format!("'{}' belongs to unknown schema {}", item, id))
        })?;
        let owner = OwnerSchema {
            id: Some(schema.id),
            name: schema.name.clone(),
            alias: schema.alias.clone(),
        };
        owners.insert(id, owner.clone());
        Ok(owner)
    }

    fn load_store_units(&mut self, ctx: &mut LoadContext) -> CatalogResult<UnitCatalog> {
        let mut catalog = UnitCatalog::new(UnitSource::Store);
        let mut owners = HashMap::new();

        for row in self.store.unit_system_rows()? {
            let schema = self.owner_schema(ctx, &mut owners, row.schema_id, &row.name)?;
            catalog.unit_systems.insert(Arc::new(UnitSystem {
                id: Some(row.id),
                schema,
                name: row.name,
                display_label: row.display_label,
                description: row.description,
            }));
        }

        for row in self.store.phenomenon_rows()? {
            let schema = self.owner_schema(ctx, &mut owners, row.schema_id, &row.name)?;
            catalog.phenomena.insert(Arc::new(Phenomenon {
                id: Some(row.id),
                schema,
                name: row.name,
                display_label: row.display_label,
                description: row.description,
                definition: row.definition,
            }));
        }

        let mut inverted = Vec::new();
        for row in self.store.unit_rows()? {
            if row.inverting_unit_id.is_some() {
                inverted.push(row);
                continue;
            }
            let schema = self.owner_schema(ctx, &mut owners, row.schema_id, &row.name)?;
            let phenomenon = row
                .phenomenon_id
                .and_then(|id| catalog.phenomena.get(id.0))
                .cloned()
                .ok_or_else(|| {
                    CatalogError::missing(format!("phenomenon of unit '{}'", row.name))
                })?;
            let definition = row.definition.unwrap_or_default();
            let numerator = row.numerator.unwrap_or(1.0);
            let denominator = row.denominator.unwrap_or(1.0);
            let kind = if row.is_constant {
                UnitKind::Constant {
                    phenomenon,
                    definition,
                    numerator,
                    denominator,
                }
            } else {
                let unit_system = row
                    .unit_system_id
                    .and_then(|id| catalog.unit_systems.get(id.0))
                    .cloned()
                    .ok_or_else(|| {
                        CatalogError::missing(format!("unit system of unit '{}'", row.name))
                    })?;
                UnitKind::Regular {
                    phenomenon,
                    unit_system,
                    definition,
                    numerator,
                    denominator,
                    offset: row.offset.unwrap_or(0.0),
                }
            };
            catalog.units.insert(Arc::new(Unit {
                id: Some(row.id),
                schema,
                name: row.name,
                display_label: row.display_label,
                description: row.description,
                kind,
            }));
        }

        for row in inverted {
            let schema = self.owner_schema(ctx, &mut owners, row.schema_id, &row.name)?;
            let inverts = row
                .inverting_unit_id
                .and_then(|id| catalog.units.get(id.0))
                .cloned()
                .ok_or_else(|| {
                    CatalogError::missing(format!("unit inverted by '{}'", row.name))
                })?;
            let unit_system = row
                .unit_system_id
                .and_then(|id| catalog.unit_systems.get(id.0))
                .cloned()
                .ok_or_else(|| {
                    CatalogError::missing(format!("unit system of inverted unit '{}'", row.name))
                })?;
            catalog.units.insert(Arc::new(Unit {
                id: Some(row.id),
                schema,
                name: row.name,
                display_label: row.display_label,
                description: row.description,
                kind: UnitKind::Inverted {
                    unit_system,
                    inverts,
                },
            }));
        }

        for row in self.store.format_rows()? {
            let schema = self.owner_schema(ctx, &mut owners, row.schema_id, &row.name)?;
            let numeric_spec: NumericSpec = serde_json::from_str(&row.numeric_spec)?;
            let composite = match row.composite_include_zero {
                Some(include_zero) => {
                    let parts = self.store.format_composite_unit_rows(row.id)?;
                    if parts.is_empty() || parts.len() > MAX_COMPOSITE_UNITS {
                        return Err(CatalogError::malformed(format!(
                            "composite format '{}' has {} units, expected 1 to {}",
                            row.name,
                            parts.len(),
                            MAX_COMPOSITE_UNITS
                        )));
                    }
                    let units = parts
                        .into_iter()
                        .map(|part| {
                            let unit = catalog.units.get(part.unit_id.0).cloned().ok_or_else(|| {
                                CatalogError::missing(format!(
                                    "unit {} of composite format '{}'",
                                    part.unit_id, row.name
                                ))
                            })?;
                            Ok(CompositeUnit {
                                unit,
                                label: part.label,
                            })
                        })
                        .collect::<CatalogResult<Vec<_>>>()?;
                    Some(CompositeSpec {
                        spacer: row.composite_spacer,
                        include_zero,
                        units,
                    })
                }
                None => None,
            };
            catalog.formats.insert(Arc::new(Format {
                id: Some(row.id),
                schema,
                name: row.name,
                display_label: row.display_label,
                description: row.description,
                numeric_spec,
                composite,
            }));
        }

        Ok(catalog)
    }
}
