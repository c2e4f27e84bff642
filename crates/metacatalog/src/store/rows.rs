//! Row shapes exchanged with a backing store.
//!
//! Enum-like columns are kept as the raw persisted integers; readers decide
//! whether they understand them.

use serde::{Deserialize, Serialize};

use crate::{
    ClassId, EnumerationId, FormatId, KindOfQuantityId, PhenomenonId, PropertyCategoryId,
    PropertyId, SchemaId, SchemaVersion, UnitId, UnitSystemId,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaRow {
    pub id: SchemaId,
    pub name: String,
    pub alias: String,
    pub version: SchemaVersion,
    pub original_version: Option<(u32, u32)>,
    pub display_label: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassRow {
    pub id: ClassId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub class_type: i32,
    pub modifier: i32,
    /// Custom attribute classes only.
    pub applies_to: Option<u32>,
    /// Relationship classes only.
    pub strength: Option<i32>,
    pub strength_direction: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyRow {
    pub id: PropertyId,
    pub class_id: ClassId,
    pub ordinal: u32,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub is_readonly: bool,
    pub priority: i32,
    pub kind: i32,
    pub primitive_type: Option<i32>,
    pub enumeration_id: Option<EnumerationId>,
    pub struct_class_id: Option<ClassId>,
    pub extended_type_name: Option<String>,
    pub kind_of_quantity_id: Option<KindOfQuantityId>,
    pub category_id: Option<PropertyCategoryId>,
    pub array_min: Option<u32>,
    pub array_max: Option<u32>,
    pub navigation_relationship_id: Option<ClassId>,
    pub navigation_direction: Option<i32>,
}

impl PropertyRow {
    /// A row with every optional column empty.
    pub fn new(id: PropertyId, class_id: ClassId, ordinal: u32, name: impl Into<String>, kind: i32) -> Self {
        Self {
            id,
            class_id,
            ordinal,
            name: name.into(),
            display_label: None,
            description: None,
            is_readonly: false,
            priority: 0,
            kind,
            primitive_type: None,
            enumeration_id: None,
            struct_class_id: None,
            extended_type_name: None,
            kind_of_quantity_id: None,
            category_id: None,
            array_min: None,
            array_max: None,
            navigation_relationship_id: None,
            navigation_direction: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRow {
    pub relationship_class_id: ClassId,
    pub end: i32,
    pub multiplicity_lower: u32,
    pub multiplicity_upper: Option<u32>,
    pub is_polymorphic: bool,
    pub role_label: Option<String>,
    pub abstract_constraint_class_id: Option<ClassId>,
    /// Ordered.
    pub constraint_class_ids: Vec<ClassId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomAttributeRow {
    pub class_id: ClassId,
    pub container_id: u64,
    pub container_type: i32,
    pub ordinal: u32,
    /// Serialized instance.
    pub instance: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumerationRow {
    pub id: EnumerationId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub backing_type: i32,
    pub is_strict: bool,
    /// Serialized enumerator list.
    pub enum_values: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KindOfQuantityRow {
    pub id: KindOfQuantityId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    /// `alias:Unit`
    pub persistence_unit: String,
    /// JSON array of format strings.
    pub presentation_formats: Option<String>,
    pub relative_error: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyCategoryRow {
    pub id: PropertyCategoryId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub priority: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitSystemRow {
    pub id: UnitSystemId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhenomenonRow {
    pub id: PhenomenonId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub definition: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitRow {
    pub id: UnitId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub phenomenon_id: Option<PhenomenonId>,
    pub unit_system_id: Option<UnitSystemId>,
    pub definition: Option<String>,
    pub numerator: Option<f64>,
    pub denominator: Option<f64>,
    pub offset: Option<f64>,
    pub is_constant: bool,
    /// Set for inverted units only.
    pub inverting_unit_id: Option<UnitId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormatRow {
    pub id: FormatId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    /// Serialized `NumericSpec`.
    pub numeric_spec: String,
    pub composite_spacer: Option<String>,
    /// `Some` exactly when the format has a composite part.
    pub composite_include_zero: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormatCompositeUnitRow {
    pub format_id: FormatId,
    pub ordinal: u32,
    pub unit_id: UnitId,
    pub label: Option<String>,
}

/// Everything persisted for one schema, as produced by `SchemaWriter`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaRows {
    pub schema: SchemaRow,
    /// Ordered.
    pub references: Vec<SchemaId>,
    pub classes: Vec<ClassRow>,
    /// `(class, ordered base classes)`
    pub base_classes: Vec<(ClassId, Vec<ClassId>)>,
    pub properties: Vec<PropertyRow>,
    pub constraints: Vec<ConstraintRow>,
    pub custom_attributes: Vec<CustomAttributeRow>,
    pub enumerations: Vec<EnumerationRow>,
    pub kinds_of_quantity: Vec<KindOfQuantityRow>,
    pub property_categories: Vec<PropertyCategoryRow>,
    pub unit_systems: Vec<UnitSystemRow>,
    pub phenomena: Vec<PhenomenonRow>,
    pub units: Vec<UnitRow>,
    pub formats: Vec<FormatRow>,
    pub format_composite_units: Vec<FormatCompositeUnitRow>,
}

impl SchemaRows {
    pub fn new(schema: SchemaRow) -> Self {
        Self {
            schema,
            references: Vec::new(),
            classes: Vec::new(),
            base_classes: Vec::new(),
            properties: Vec::new(),
            constraints: Vec::new(),
            custom_attributes: Vec::new(),
            enumerations: Vec::new(),
            kinds_of_quantity: Vec::new(),
            property_categories: Vec::new(),
            unit_systems: Vec::new(),
            phenomena: Vec::new(),
            units: Vec::new(),
            formats: Vec::new(),
            format_composite_units: Vec::new(),
        }
    }

    pub fn schema_id(&self) -> SchemaId {
        self.schema.id
    }
}
