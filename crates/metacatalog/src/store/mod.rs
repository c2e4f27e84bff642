//! Backing store boundary.
//!
//! The catalog reads rows through [`CatalogStore`] and persists imported
//! schemas through [`CatalogWriter`]. Two backends are provided:
//! - [`MemoryStore`]: hash maps, counts queries, used by tests
//! - `SqliteStore` (feature `sqlite`): rusqlite, file based

mod memory;
mod rows;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::{MemoryStore, QueryCounter};
pub use rows::*;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::{
    CatalogResult, ClassId, ContainerType, EnumerationId, FormatId, KindOfQuantityId,
    PhenomenonId, PropertyCategoryId, SchemaId, SchemaLookupMode, StoreIdentity, UnitId,
    UnitSystemId,
};

/// Row queries keyed by stable ids.
///
/// Methods return `Ok(None)` / empty collections for missing rows and `Err`
/// only when the store itself fails. Multi-row results are ordered by their
/// persisted ordinal.
pub trait CatalogStore: Send {
    fn schema_row(&self, id: SchemaId) -> CatalogResult<Option<SchemaRow>>;

    fn schema_id(&self, name: &str, mode: SchemaLookupMode) -> CatalogResult<Option<SchemaId>>;

    fn schema_ids(&self) -> CatalogResult<Vec<SchemaId>>;

    fn schema_reference_ids(&self, id: SchemaId) -> CatalogResult<Vec<SchemaId>>;

    /// Total rows the schema owns across every child entity table.
    fn schema_child_count(&self, id: SchemaId) -> CatalogResult<u64>;

    /// Single probe: does the schema own any unit system, phenomenon, unit
    /// or format row.
    fn schema_has_units(&self, id: SchemaId) -> CatalogResult<bool>;

    fn class_row(&self, id: ClassId) -> CatalogResult<Option<ClassRow>>;

    fn class_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<ClassId>>;

    fn class_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<ClassId>>;

    fn base_class_ids(&self, id: ClassId) -> CatalogResult<Vec<ClassId>>;

    fn derived_class_ids(&self, id: ClassId) -> CatalogResult<Vec<ClassId>>;

    fn property_rows(&self, class_id: ClassId) -> CatalogResult<Vec<PropertyRow>>;

    fn relationship_constraint_rows(&self, class_id: ClassId) -> CatalogResult<Vec<ConstraintRow>>;

    fn custom_attribute_rows(
        &self,
        container_id: u64,
        container_type: ContainerType,
    ) -> CatalogResult<Vec<CustomAttributeRow>>;

    fn enumeration_row(&self, id: EnumerationId) -> CatalogResult<Option<EnumerationRow>>;

    fn enumeration_id(&self, schema_id: SchemaId, name: &str)
        -> CatalogResult<Option<EnumerationId>>;

    fn enumeration_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<EnumerationId>>;

    fn kind_of_quantity_row(&self, id: KindOfQuantityId)
        -> CatalogResult<Option<KindOfQuantityRow>>;

    fn kind_of_quantity_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<KindOfQuantityId>>;

    fn kind_of_quantity_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<KindOfQuantityId>>;

    fn property_category_row(
        &self,
        id: PropertyCategoryId,
    ) -> CatalogResult<Option<PropertyCategoryRow>>;

    fn property_category_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<PropertyCategoryId>>;

    fn property_category_ids(&self, schema_id: SchemaId)
        -> CatalogResult<Vec<PropertyCategoryId>>;

    fn unit_system_rows(&self) -> CatalogResult<Vec<UnitSystemRow>>;

    fn phenomenon_rows(&self) -> CatalogResult<Vec<PhenomenonRow>>;

    fn unit_rows(&self) -> CatalogResult<Vec<UnitRow>>;

    fn format_rows(&self) -> CatalogResult<Vec<FormatRow>>;

    fn format_composite_unit_rows(&self, format_id: FormatId)
        -> CatalogResult<Vec<FormatCompositeUnitRow>>;

    fn unit_system_id(&self, schema_id: SchemaId, name: &str)
        -> CatalogResult<Option<UnitSystemId>>;

    fn phenomenon_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<PhenomenonId>>;

    fn unit_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<UnitId>>;

    fn format_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<FormatId>>;

    /// False for files created before unit-family tables existed.
    fn has_unit_tables(&self) -> CatalogResult<bool>;

    fn any_kind_of_quantity(&self) -> CatalogResult<bool>;

    fn is_readonly(&self) -> bool;

    fn identity(&self) -> StoreIdentity;
}

/// Persistence used by the import path.
pub trait CatalogWriter {
    /// A fresh id, unique across every entity table of the store.
    fn allocate_id(&mut self) -> CatalogResult<u64>;

    fn insert_schema(&mut self, rows: SchemaRows) -> CatalogResult<()>;

    /// Rebuild derived views after an import.
    fn regenerate_views(&mut self) -> CatalogResult<()>;
}
