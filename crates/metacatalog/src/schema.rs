//! Schemas: versioned containers of classes and auxiliary definitions.

use std::fmt;
use std::sync::RwLock;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{
    sync, CatalogError, CatalogResult, ClassId, CustomAttribute, EnumerationId, FormatId,
    KindOfQuantityId, PhenomenonId, PropertyCategoryId, SchemaId, UnitId, UnitSystemId,
};

/// Three part schema version (`read.write.minor`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub read: u32,
    pub write: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub fn new(read: u32, write: u32, minor: u32) -> Self {
        Self { read, write, minor }
    }

    /// Parse `"01.00.02"` or `"1.0.2"`. A two part version gets a zero write
    /// version inserted (`"1.2"` is `1.0.2`).
    pub fn parse(text: &str) -> CatalogResult<Self> {
        let parts: Vec<&str> = text.trim().split('.').collect();
        let number = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| CatalogError::malformed(format!("invalid schema version '{}'", text)))
        };
        match parts.as_slice() {
            [read, minor] => Ok(Self::new(number(read)?, 0, number(minor)?)),
            [read, write, minor] => Ok(Self::new(number(read)?, number(write)?, number(minor)?)),
            _ => Err(CatalogError::malformed(format!(
                "invalid schema version '{}'",
                text
            ))),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}.{:02}", self.read, self.write, self.minor)
    }
}

/// How a schema name passed to a lookup is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchemaLookupMode {
    #[default]
    ByName,
    ByAlias,
    /// Try the name first, then the alias.
    AutoDetect,
}

/// Child entities of a schema that have been materialized so far.
///
/// Only ever grows; ids are kept in load order.
#[derive(Clone, Debug, Default)]
pub struct SchemaContents {
    pub classes: IndexSet<ClassId>,
    pub enumerations: IndexSet<EnumerationId>,
    pub kinds_of_quantity: IndexSet<KindOfQuantityId>,
    pub property_categories: IndexSet<PropertyCategoryId>,
    pub unit_systems: IndexSet<UnitSystemId>,
    pub phenomena: IndexSet<PhenomenonId>,
    pub units: IndexSet<UnitId>,
    pub formats: IndexSet<FormatId>,
    /// `None` until the schema's custom attribute instances were attached.
    pub custom_attributes: Option<Vec<CustomAttribute>>,
}

impl SchemaContents {
    pub fn loaded_count(&self) -> u64 {
        (self.classes.len()
            + self.enumerations.len()
            + self.kinds_of_quantity.len()
            + self.property_categories.len()
            + self.unit_systems.len()
            + self.phenomena.len()
            + self.units.len()
            + self.formats.len()) as u64
    }
}

/// A schema materialized from the store.
///
/// Created as a stub (scalar fields and references); child entities are
/// appended as they get loaded. Holders of an `Arc<Schema>` observe the
/// upgrade.
#[derive(Debug)]
pub struct Schema {
    pub id: SchemaId,
    pub name: String,
    pub alias: String,
    pub version: SchemaVersion,
    /// Version of the serialization format the schema was originally read from.
    pub original_version: Option<(u32, u32)>,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub references: Vec<SchemaId>,
    /// Number of child rows the store holds for this schema.
    pub total_child_count: u64,
    contents: RwLock<SchemaContents>,
}

impl Schema {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SchemaId,
        name: String,
        alias: String,
        version: SchemaVersion,
        original_version: Option<(u32, u32)>,
        display_label: Option<String>,
        description: Option<String>,
        references: Vec<SchemaId>,
        total_child_count: u64,
    ) -> Self {
        Self {
            id,
            name,
            alias,
            version,
            original_version,
            display_label,
            description,
            references,
            total_child_count,
            contents: RwLock::new(SchemaContents::default()),
        }
    }

    /// Display label, falling back to the name.
    pub fn label(&self) -> &str {
        self.display_label.as_deref().unwrap_or(&self.name)
    }

    /// `Name.RR.WW.mm`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.name, self.version)
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn references_schema(&self, id: SchemaId) -> bool {
        self.references.contains(&id)
    }

    pub fn loaded_child_count(&self) -> u64 {
        sync::read(&self.contents).loaded_count()
    }

    /// True once every child row of the store has been materialized.
    pub fn is_fully_loaded(&self) -> bool {
        self.loaded_child_count() >= self.total_child_count
    }

    /// Snapshot of what has been loaded so far.
    pub fn contents(&self) -> SchemaContents {
        sync::read(&self.contents).clone()
    }

    pub fn class_ids(&self) -> Vec<ClassId> {
        sync::read(&self.contents).classes.iter().copied().collect()
    }

    pub fn custom_attributes(&self) -> Vec<CustomAttribute> {
        sync::read(&self.contents)
            .custom_attributes
            .clone()
            .unwrap_or_default()
    }

    pub fn custom_attributes_loaded(&self) -> bool {
        sync::read(&self.contents).custom_attributes.is_some()
    }

    pub(crate) fn update_contents<R>(&self, f: impl FnOnce(&mut SchemaContents) -> R) -> R {
        let mut contents = sync::write(&self.contents);
        f(&mut contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_display() {
        assert_eq!(
            SchemaVersion::parse("01.02.03").unwrap(),
            SchemaVersion::new(1, 2, 3)
        );
        assert_eq!(SchemaVersion::parse("1.3").unwrap(), SchemaVersion::new(1, 0, 3));
        assert!(SchemaVersion::parse("1.x.3").is_err());
        assert!(SchemaVersion::parse("1").is_err());
        assert_eq!(SchemaVersion::new(1, 0, 12).to_string(), "01.00.12");
    }

    #[test]
    fn test_schema_contents_upgrade_in_place() {
        let schema = Schema::new(
            SchemaId(1),
            "Test".into(),
            "ts".into(),
            SchemaVersion::new(1, 0, 0),
            None,
            None,
            None,
            Vec::new(),
            2,
        );
        assert!(!schema.is_fully_loaded());
        schema.update_contents(|c| {
            c.classes.insert(ClassId(10));
            c.classes.insert(ClassId(10));
        });
        assert_eq!(schema.loaded_child_count(), 1);
        schema.update_contents(|c| {
            c.enumerations.insert(EnumerationId(11));
        });
        assert!(schema.is_fully_loaded());
        assert_eq!(schema.label(), "Test");
        assert_eq!(schema.full_name(), "Test.01.00.00");
    }
}
