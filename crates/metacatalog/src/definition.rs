//! Transient schema definitions.
//!
//! Definitions are what callers hand to `SchemaManager::import_schemas` and
//! what the legacy reference unit schemas deserialize into. They carry no
//! ids; cross references are by name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    ArrayBounds, ClassModifier, ContainerTypes, Direction, Enumerator, Multiplicity, NumericSpec,
    PrimitiveType, SchemaVersion, StoreIdentity, StrengthType,
};

/// Name and version of a referenced schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaKey {
    pub name: String,
    pub version: SchemaVersion,
}

impl SchemaKey {
    pub fn new(name: impl Into<String>, version: SchemaVersion) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Reference to a named item. `schema == None` means the schema holding the
/// reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
}

impl ItemRef {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn in_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Schema name this reference points into, given the holding schema.
    pub fn schema_or<'a>(&'a self, holder: &'a str) -> &'a str {
        self.schema.as_deref().unwrap_or(holder)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomAttributeDef {
    pub class: ItemRef,
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl CustomAttributeDef {
    pub fn new(class: ItemRef) -> Self {
        Self {
            class,
            values: Map::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

/// Marks a schema as supplementing another schema's metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementalInfo {
    pub primary_schema: String,
    pub primary_version: SchemaVersion,
    pub precedence: u32,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDef {
    pub multiplicity: Multiplicity,
    #[serde(default)]
    pub polymorphic: bool,
    #[serde(default)]
    pub role_label: Option<String>,
    #[serde(default)]
    pub abstract_constraint: Option<ItemRef>,
    #[serde(default)]
    pub constraint_classes: Vec<ItemRef>,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttributeDef>,
}

impl ConstraintDef {
    pub fn new(multiplicity: Multiplicity, classes: Vec<ItemRef>) -> Self {
        Self {
            multiplicity,
            polymorphic: true,
            role_label: None,
            abstract_constraint: None,
            constraint_classes: classes,
            custom_attributes: Vec::new(),
        }
    }

    pub fn with_role_label(mut self, label: impl Into<String>) -> Self {
        self.role_label = Some(label.into());
        self
    }

    pub fn with_abstract_constraint(mut self, class: ItemRef) -> Self {
        self.abstract_constraint = Some(class);
        self
    }

    pub fn with_polymorphic(mut self, polymorphic: bool) -> Self {
        self.polymorphic = polymorphic;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDef {
    pub strength: StrengthType,
    pub strength_direction: Direction,
    pub source: ConstraintDef,
    pub target: ConstraintDef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClassKindDef {
    Entity,
    Struct,
    CustomAttribute { applies_to: ContainerTypes },
    Relationship(Box<RelationshipDef>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PropertyKindDef {
    Primitive {
        primitive_type: PrimitiveType,
        #[serde(default)]
        enumeration: Option<ItemRef>,
        #[serde(default)]
        extended_type: Option<String>,
    },
    Struct {
        struct_class: ItemRef,
    },
    PrimitiveArray {
        primitive_type: PrimitiveType,
        #[serde(default)]
        enumeration: Option<ItemRef>,
        #[serde(default)]
        extended_type: Option<String>,
        #[serde(default)]
        bounds: ArrayBounds,
    },
    StructArray {
        struct_class: ItemRef,
        #[serde(default)]
        bounds: ArrayBounds,
    },
    Navigation {
        relationship: ItemRef,
        direction: Direction,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    pub name: String,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_readonly: bool,
    #[serde(default)]
    pub priority: i32,
    pub kind: PropertyKindDef,
    #[serde(default)]
    pub kind_of_quantity: Option<ItemRef>,
    #[serde(default)]
    pub category: Option<ItemRef>,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttributeDef>,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, kind: PropertyKindDef) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            is_readonly: false,
            priority: 0,
            kind,
            kind_of_quantity: None,
            category: None,
            custom_attributes: Vec::new(),
        }
    }

    pub fn primitive(name: impl Into<String>, primitive_type: PrimitiveType) -> Self {
        Self::new(
            name,
            PropertyKindDef::Primitive {
                primitive_type,
                enumeration: None,
                extended_type: None,
            },
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.display_label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_kind_of_quantity(mut self, koq: ItemRef) -> Self {
        self.kind_of_quantity = Some(koq);
        self
    }

    pub fn with_category(mut self, category: ItemRef) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_custom_attribute(mut self, ca: CustomAttributeDef) -> Self {
        self.custom_attributes.push(ca);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDef {
    pub name: String,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub modifier: ClassModifier,
    pub kind: ClassKindDef,
    #[serde(default)]
    pub base_classes: Vec<ItemRef>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttributeDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>, kind: ClassKindDef) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            modifier: ClassModifier::None,
            kind,
            base_classes: Vec::new(),
            properties: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name, ClassKindDef::Entity)
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, ClassKindDef::Struct)
    }

    pub fn custom_attribute(name: impl Into<String>, applies_to: ContainerTypes) -> Self {
        Self::new(name, ClassKindDef::CustomAttribute { applies_to })
    }

    pub fn relationship(name: impl Into<String>, relationship: RelationshipDef) -> Self {
        Self::new(name, ClassKindDef::Relationship(Box::new(relationship)))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.display_label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_modifier(mut self, modifier: ClassModifier) -> Self {
        self.modifier = modifier;
        self
    }

    pub fn with_base_class(mut self, base: ItemRef) -> Self {
        self.base_classes.push(base);
        self
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_custom_attribute(mut self, ca: CustomAttributeDef) -> Self {
        self.custom_attributes.push(ca);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerationDef {
    pub name: String,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub backing_type: PrimitiveType,
    #[serde(default)]
    pub is_strict: bool,
    #[serde(default)]
    pub enumerators: Vec<Enumerator>,
}

impl EnumerationDef {
    pub fn new(name: impl Into<String>, backing_type: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            backing_type,
            is_strict: true,
            enumerators: Vec::new(),
        }
    }

    pub fn with_enumerator(mut self, enumerator: Enumerator) -> Self {
        self.enumerators.push(enumerator);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.display_label = Some(label.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindOfQuantityDef {
    pub name: String,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// `alias:Unit`
    pub persistence_unit: String,
    /// `alias:Format(precision)[alias:Unit|label]...`
    #[serde(default)]
    pub presentation_formats: Vec<String>,
    pub relative_error: f64,
}

impl KindOfQuantityDef {
    pub fn new(name: impl Into<String>, persistence_unit: impl Into<String>, relative_error: f64) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            persistence_unit: persistence_unit.into(),
            presentation_formats: Vec::new(),
            relative_error,
        }
    }

    pub fn with_presentation_format(mut self, format: impl Into<String>) -> Self {
        self.presentation_formats.push(format.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.display_label = Some(label.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyCategoryDef {
    pub name: String,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: u32,
}

impl PropertyCategoryDef {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            priority,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSystemDef {
    pub name: String,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl UnitSystemDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhenomenonDef {
    pub name: String,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub definition: String,
}

impl PhenomenonDef {
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            definition: definition.into(),
        }
    }
}

fn one() -> f64 {
    1.0
}

/// Unit-family references are qualified names (`alias:Name` or a local
/// `Name`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UnitKindDef {
    #[serde(rename_all = "camelCase")]
    Regular {
        phenomenon: String,
        unit_system: String,
        definition: String,
        #[serde(default = "one")]
        numerator: f64,
        #[serde(default = "one")]
        denominator: f64,
        #[serde(default)]
        offset: f64,
    },
    #[serde(rename_all = "camelCase")]
    Constant {
        phenomenon: String,
        definition: String,
        #[serde(default = "one")]
        numerator: f64,
        #[serde(default = "one")]
        denominator: f64,
    },
    #[serde(rename_all = "camelCase")]
    Inverted { unit_system: String, inverts: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitDef {
    pub name: String,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: UnitKindDef,
}

impl UnitDef {
    pub fn regular(
        name: impl Into<String>,
        phenomenon: impl Into<String>,
        unit_system: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            kind: UnitKindDef::Regular {
                phenomenon: phenomenon.into(),
                unit_system: unit_system.into(),
                definition: definition.into(),
                numerator: 1.0,
                denominator: 1.0,
                offset: 0.0,
            },
        }
    }

    pub fn constant(
        name: impl Into<String>,
        phenomenon: impl Into<String>,
        definition: impl Into<String>,
        numerator: f64,
    ) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            kind: UnitKindDef::Constant {
                phenomenon: phenomenon.into(),
                definition: definition.into(),
                numerator,
                denominator: 1.0,
            },
        }
    }

    pub fn inverted(
        name: impl Into<String>,
        unit_system: impl Into<String>,
        inverts: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            kind: UnitKindDef::Inverted {
                unit_system: unit_system.into(),
                inverts: inverts.into(),
            },
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.display_label = Some(label.into());
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        if let UnitKindDef::Regular { numerator, .. } | UnitKindDef::Constant { numerator, .. } =
            &mut self.kind
        {
            *numerator = factor;
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeUnitDef {
    pub unit: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeDef {
    #[serde(default)]
    pub spacer: Option<String>,
    #[serde(default)]
    pub include_zero: bool,
    pub units: Vec<CompositeUnitDef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDef {
    pub name: String,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub numeric_spec: NumericSpec,
    #[serde(default)]
    pub composite: Option<CompositeDef>,
}

impl FormatDef {
    pub fn new(name: impl Into<String>, numeric_spec: NumericSpec) -> Self {
        Self {
            name: name.into(),
            display_label: None,
            description: None,
            numeric_spec,
            composite: None,
        }
    }

    pub fn with_composite(mut self, composite: CompositeDef) -> Self {
        self.composite = Some(composite);
        self
    }
}

/// A complete schema definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDef {
    pub name: String,
    pub alias: String,
    pub version: SchemaVersion,
    #[serde(default)]
    pub original_version: Option<(u32, u32)>,
    #[serde(default)]
    pub display_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub references: Vec<SchemaKey>,
    #[serde(default)]
    pub classes: Vec<ClassDef>,
    #[serde(default)]
    pub enumerations: Vec<EnumerationDef>,
    #[serde(default)]
    pub kinds_of_quantity: Vec<KindOfQuantityDef>,
    #[serde(default)]
    pub property_categories: Vec<PropertyCategoryDef>,
    #[serde(default)]
    pub unit_systems: Vec<UnitSystemDef>,
    #[serde(default)]
    pub phenomena: Vec<PhenomenonDef>,
    #[serde(default)]
    pub units: Vec<UnitDef>,
    #[serde(default)]
    pub formats: Vec<FormatDef>,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttributeDef>,
    #[serde(default)]
    pub supplemental: Option<SupplementalInfo>,
    /// Store the definition was read from, if any.
    #[serde(skip)]
    pub origin: Option<StoreIdentity>,
}

impl SchemaDef {
    pub fn new(name: impl Into<String>, alias: impl Into<String>, version: SchemaVersion) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            version,
            original_version: None,
            display_label: None,
            description: None,
            references: Vec::new(),
            classes: Vec::new(),
            enumerations: Vec::new(),
            kinds_of_quantity: Vec::new(),
            property_categories: Vec::new(),
            unit_systems: Vec::new(),
            phenomena: Vec::new(),
            units: Vec::new(),
            formats: Vec::new(),
            custom_attributes: Vec::new(),
            supplemental: None,
            origin: None,
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn references_schema(&self, name: &str) -> bool {
        self.references.iter().any(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn is_supplemental(&self) -> bool {
        self.supplemental.is_some()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.display_label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_reference(mut self, key: SchemaKey) -> Self {
        self.references.push(key);
        self
    }

    pub fn with_class(mut self, class: ClassDef) -> Self {
        self.classes.push(class);
        self
    }

    pub fn with_enumeration(mut self, enumeration: EnumerationDef) -> Self {
        self.enumerations.push(enumeration);
        self
    }

    pub fn with_kind_of_quantity(mut self, koq: KindOfQuantityDef) -> Self {
        self.kinds_of_quantity.push(koq);
        self
    }

    pub fn with_property_category(mut self, category: PropertyCategoryDef) -> Self {
        self.property_categories.push(category);
        self
    }

    pub fn with_unit_system(mut self, system: UnitSystemDef) -> Self {
        self.unit_systems.push(system);
        self
    }

    pub fn with_phenomenon(mut self, phenomenon: PhenomenonDef) -> Self {
        self.phenomena.push(phenomenon);
        self
    }

    pub fn with_unit(mut self, unit: UnitDef) -> Self {
        self.units.push(unit);
        self
    }

    pub fn with_format(mut self, format: FormatDef) -> Self {
        self.formats.push(format);
        self
    }

    pub fn with_custom_attribute(mut self, ca: CustomAttributeDef) -> Self {
        self.custom_attributes.push(ca);
        self
    }

    pub fn with_supplemental(mut self, info: SupplementalInfo) -> Self {
        self.supplemental = Some(info);
        self
    }

    pub fn with_origin(mut self, origin: StoreIdentity) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Number of child rows the schema produces in the store.
    pub fn child_count(&self) -> usize {
        self.classes.len()
            + self.enumerations.len()
            + self.kinds_of_quantity.len()
            + self.property_categories.len()
            + self.unit_systems.len()
            + self.phenomena.len()
            + self.units.len()
            + self.formats.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_definitions_deserialize_from_json() {
        let json = r#"{
            "name": "Units",
            "alias": "u",
            "version": {"read": 1, "write": 0, "minor": 0},
            "unitSystems": [{"name": "SI"}],
            "phenomena": [{"name": "LENGTH", "definition": "LENGTH"}],
            "units": [
                {"name": "M", "kind": {"type": "regular", "phenomenon": "LENGTH", "unitSystem": "SI", "definition": "M"}},
                {"name": "M_INV", "kind": {"type": "inverted", "unitSystem": "SI", "inverts": "u:M"}}
            ]
        }"#;
        let schema: SchemaDef = serde_json::from_str(json).unwrap();
        assert_eq!(schema.units.len(), 2);
        assert!(matches!(
            schema.units[0].kind,
            UnitKindDef::Regular { numerator, .. } if numerator == 1.0
        ));
        assert_eq!(schema.child_count(), 4);
        assert!(schema.origin.is_none());
    }

    #[test]
    fn test_item_ref_defaults_to_holder() {
        assert_eq!(ItemRef::local("A").schema_or("S"), "S");
        assert_eq!(ItemRef::in_schema("T", "A").schema_or("S"), "T");
    }
}
