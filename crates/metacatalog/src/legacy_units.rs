//! Reference unit schemas for stores that predate unit-family tables.
//!
//! Such stores persist kinds of quantity whose units and formats live in the
//! standard "Units" and "Formats" 1.0.0 schemas. Those schemas are located
//! out of band through a [`ReferenceUnitsLocator`] and turned into a
//! [`UnitCatalog`] whose entities carry no ids.
//!
//! # Examples
//!
//! ```no_run
//! use metacatalog::{FileUnitsLocator, MemoryStore, SchemaManager};
//!
//! let locator = FileUnitsLocator::new("/usr/share/metacatalog/standard");
//! let manager = SchemaManager::with_units_locator(MemoryStore::new(), Box::new(locator));
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::format_string::{QualifiedName, MAX_COMPOSITE_UNITS};
use crate::{
    CatalogError, CatalogResult, CompositeSpec, CompositeUnit, Format, NamedItems, OwnerSchema,
    Phenomenon, SchemaDef, SchemaKey, SchemaVersion, Unit, UnitCatalog, UnitFamilyItem, UnitKind,
    UnitKindDef, UnitSource, UnitSystem,
};

pub const UNITS_SCHEMA: &str = "Units";
pub const FORMATS_SCHEMA: &str = "Formats";

/// Version of the reference schemas the legacy fallback reads.
pub fn reference_version() -> SchemaVersion {
    SchemaVersion::new(1, 0, 0)
}

/// Finds schema definitions outside of any store.
pub trait ReferenceUnitsLocator: Send + Sync {
    /// `Ok(None)` when the schema is not available.
    fn locate(&self, key: &SchemaKey) -> CatalogResult<Option<SchemaDef>>;
}

/// Reads `<directory>/<Name>.<RR>.<WW>.<mm>.json`.
#[derive(Clone, Debug)]
pub struct FileUnitsLocator {
    directory: PathBuf,
}

impl FileUnitsLocator {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &SchemaKey) -> PathBuf {
        self.directory
            .join(format!("{}.{}.json", key.name, key.version))
    }
}

impl ReferenceUnitsLocator for FileUnitsLocator {
    fn locate(&self, key: &SchemaKey) -> CatalogResult<Option<SchemaDef>> {
        let path = self.path_for(key);
        if !path.is_file() {
            debug!(path = %path.display(), "reference schema not found");
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|err| {
            CatalogError::storage(format!("cannot read {}: {}", path.display(), err))
        })?;
        let schema: SchemaDef = serde_json::from_str(&content)?;
        if !schema.is_named(&key.name) {
            return Err(CatalogError::malformed(format!(
                "{} holds schema '{}', expected '{}'",
                path.display(),
                schema.name,
                key.name
            )));
        }
        Ok(Some(schema))
    }
}

/// Locator over definitions already in memory.
#[derive(Clone, Debug, Default)]
pub struct StaticUnitsLocator {
    schemas: Vec<SchemaDef>,
}

impl StaticUnitsLocator {
    pub fn new(schemas: Vec<SchemaDef>) -> Self {
        Self { schemas }
    }
}

impl ReferenceUnitsLocator for StaticUnitsLocator {
    fn locate(&self, key: &SchemaKey) -> CatalogResult<Option<SchemaDef>> {
        Ok(self
            .schemas
            .iter()
            .find(|s| s.is_named(&key.name) && s.version == key.version)
            .cloned())
    }
}

/// Build the legacy catalog from the "Units" and "Formats" reference schemas.
pub fn build_legacy_catalog(locator: &dyn ReferenceUnitsLocator) -> CatalogResult<UnitCatalog> {
    let mut catalog = UnitCatalog::new(UnitSource::Legacy);
    for name in [UNITS_SCHEMA, FORMATS_SCHEMA] {
        let key = SchemaKey::new(name, reference_version());
        let schema = locator.locate(&key)?.ok_or_else(|| {
            CatalogError::NotFound(format!("reference schema {}.{}", key.name, key.version))
        })?;
        add_schema_units(&mut catalog, &schema)?;
    }
    Ok(catalog)
}

/// Find `text` among `items`, qualifying a bare name with the owning schema.
fn lookup<T: UnitFamilyItem>(
    items: &NamedItems<T>,
    owner: &OwnerSchema,
    text: &str,
    what: &str,
) -> CatalogResult<Arc<T>> {
    let mut name = QualifiedName::parse(text)?;
    if name.qualifier.is_none() {
        name.qualifier = Some(owner.alias.clone());
    }
    items
        .find(&name)
        .cloned()
        .ok_or_else(|| CatalogError::missing(format!("{} '{}' in schema '{}'", what, text, owner.name)))
}

/// Add the unit-family definitions of one schema to `catalog`.
pub(crate) fn add_schema_units(catalog: &mut UnitCatalog, schema: &SchemaDef) -> CatalogResult<()> {
    let owner = OwnerSchema {
        id: None,
        name: schema.name.clone(),
        alias: schema.alias.clone(),
    };

    for def in &schema.unit_systems {
        catalog.unit_systems.insert(Arc::new(UnitSystem {
            id: None,
            schema: owner.clone(),
            name: def.name.clone(),
            display_label: def.display_label.clone(),
            description: def.description.clone(),
        }));
    }
    for def in &schema.phenomena {
        catalog.phenomena.insert(Arc::new(Phenomenon {
            id: None,
            schema: owner.clone(),
            name: def.name.clone(),
            display_label: def.display_label.clone(),
            description: def.description.clone(),
            definition: def.definition.clone(),
        }));
    }

    // Inverted units go last so the unit they invert exists.
    let (inverted, direct): (Vec<_>, Vec<_>) = schema
        .units
        .iter()
        .partition(|def| matches!(def.kind, UnitKindDef::Inverted { .. }));
    for def in direct.into_iter().chain(inverted) {
        let kind = match &def.kind {
            UnitKindDef::Regular {
                phenomenon,
                unit_system,
                definition,
                numerator,
                denominator,
                offset,
            } => UnitKind::Regular {
                phenomenon: lookup(&catalog.phenomena, &owner, phenomenon, "phenomenon")?,
                unit_system: lookup(&catalog.unit_systems, &owner, unit_system, "unit system")?,
                definition: definition.clone(),
                numerator: *numerator,
                denominator: *denominator,
                offset: *offset,
            },
            UnitKindDef::Constant {
                phenomenon,
                definition,
                numerator,
                denominator,
            } => UnitKind::Constant {
                phenomenon: lookup(&catalog.phenomena, &owner, phenomenon, "phenomenon")?,
                definition: definition.clone(),
                numerator: *numerator,
                denominator: *denominator,
            },
            UnitKindDef::Inverted {
                unit_system,
                inverts,
            } => UnitKind::Inverted {
                unit_system: lookup(&catalog.unit_systems, &owner, unit_system, "unit system")?,
                inverts: lookup(&catalog.units, &owner, inverts, "unit")?,
            },
        };
        catalog.units.insert(Arc::new(Unit {
            id: None,
            schema: owner.clone(),
            name: def.name.clone(),
            display_label: def.display_label.clone(),
            description: def.description.clone(),
            kind,
        }));
    }

    for def in &schema.formats {
        let composite = match &def.composite {
            Some(composite) => {
                if composite.units.is_empty() || composite.units.len() > MAX_COMPOSITE_UNITS {
                    return Err(CatalogError::malformed(format!(
                        "composite format '{}' has {} units, expected 1 to {}",
                        def.name,
                        composite.units.len(),
                        MAX_COMPOSITE_UNITS
                    )));
                }
                let units = composite
                    .units
                    .iter()
                    .map(|part| {
                        Ok(CompositeUnit {
                            unit: lookup(&catalog.units, &owner, &part.unit, "unit")?,
                            label: part.label.clone(),
                        })
                    })
                    .collect::<CatalogResult<Vec<_>>>()?;
                Some(CompositeSpec {
                    spacer: composite.spacer.clone(),
                    include_zero: composite.include_zero,
                    units,
                })
            }
            None => None,
        };
        catalog.formats.insert(Arc::new(Format {
            id: None,
            schema: owner.clone(),
            name: def.name.clone(),
            display_label: def.display_label.clone(),
            description: def.description.clone(),
            numeric_spec: def.numeric_spec.clone(),
            composite,
        }));
    }
    Ok(())
}

/// Unit names of a catalog grouped by owning schema, for diagnostics.
pub fn units_by_schema(catalog: &UnitCatalog) -> HashMap<String, Vec<String>> {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for unit in catalog.units.iter() {
        grouped
            .entry(unit.schema.name.clone())
            .or_default()
            .push(unit.name.clone());
    }
    grouped
}
