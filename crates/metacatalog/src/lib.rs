//! Read-side metadata cache and lazy-loading resolver for schema-based
//! embedded databases.
//!
//! A catalog store persists schemas: classes with properties and
//! relationships, enumerations, kinds of quantity, property categories and
//! the unit family (unit systems, phenomena, units, formats). This crate
//! materializes those rows into shared, immutable entities on first use and
//! keeps them for the lifetime of the cache.
//!
//! - **Readers** - [`SchemaReader`] turns rows into entities, one id at a
//!   time, remembering failures
//! - **Cache** - [`ReaderCache`] holds one `Arc` per id so repeated lookups
//!   return the same instance
//! - **Deferred checks** - [`LoadContext`] validates navigation properties,
//!   relationships and mixins once everything they refer to is loaded
//! - **Facade** - [`SchemaManager`] serializes access and imports schema
//!   definitions in dependency order
//! - **Stores** - [`MemoryStore`] and, with the `sqlite` feature,
//!   `SqliteStore`
//!
//! # Quick Start
//!
//! ```rust
//! use metacatalog::{
//!     ClassDef, MemoryStore, PrimitiveType, PropertyDef, SchemaDef, SchemaManager, SchemaVersion,
//! };
//!
//! let manager = SchemaManager::new(MemoryStore::new());
//! let plant = SchemaDef::new("Plant", "plant", SchemaVersion::new(1, 0, 0)).with_class(
//!     ClassDef::entity("Pump").with_property(PropertyDef::primitive("Flow", PrimitiveType::Double)),
//! );
//! manager.import_schemas(vec![plant]).unwrap();
//!
//! let pump = manager.get_class("Plant", "Pump").unwrap().unwrap();
//! let again = manager.get_class_by_id(pump.id).unwrap().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&pump, &again));
//! assert_eq!(pump.properties[0].name, "Flow");
//! ```

mod cache;
mod class;
pub mod config;
mod context;
mod custom_attribute;
pub mod definition;
pub mod dependency;
mod enumeration;
mod error;
pub mod format_string;
mod ids;
mod kind_of_quantity;
pub mod legacy_units;
mod manager;
mod property;
mod reader;
mod schema;
pub mod store;
pub mod supplemental;
mod sync;
mod units;
mod writer;

#[cfg(test)]
mod tests;

pub use cache::{CacheKey, CacheSlot, CacheStats, ClassHeader, EntityMap, ReaderCache};
pub use class::{
    Class, ClassKind, ClassModifier, ClassType, ConstraintEnd, Direction, Multiplicity,
    RelationshipConstraint, RelationshipInfo, StrengthType,
};
pub use config::CatalogConfig;
pub use context::{
    LoadContext, APPLIES_TO_ENTITY_CLASS, CORE_CUSTOM_ATTRIBUTES_SCHEMA, IS_MIXIN_CLASS,
};
pub use custom_attribute::{ContainerType, ContainerTypes, CustomAttribute};
pub use definition::*;
pub use dependency::{build_dependency_ordered_list, depends_on, insert_in_order};
pub use enumeration::{
    check_backing_type, parse_enumerators, Enumeration, Enumerator, EnumeratorValue,
    PropertyCategory,
};
pub use error::{CatalogError, CatalogResult};
pub use format_string::{FormatString, QualifiedName, UnitOverride};
pub use ids::*;
pub use kind_of_quantity::{FormatReference, KindOfQuantity};
pub use legacy_units::{
    build_legacy_catalog, units_by_schema, FileUnitsLocator, ReferenceUnitsLocator,
    StaticUnitsLocator,
};
pub use manager::SchemaManager;
pub use property::{ArrayBounds, PrimitiveType, Property, PropertyKind, PropertyKindTag};
pub use reader::SchemaReader;
pub use schema::{Schema, SchemaContents, SchemaLookupMode, SchemaVersion};
pub use store::*;
pub use supplemental::apply_supplementals;
pub use units::{
    CompositeSpec, CompositeUnit, Format, NamedItems, NumericSpec, OwnerSchema, Phenomenon, Unit,
    UnitCatalog, UnitFamilyItem, UnitKind, UnitSource, UnitSystem,
};
pub use writer::SchemaWriter;
