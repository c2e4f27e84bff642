//! Unit tests for the readers, the cache and the import path.

use std::sync::Arc;

use crate::legacy_units::{reference_version, FORMATS_SCHEMA, UNITS_SCHEMA};
use crate::{
    ArrayBounds, CatalogError, CatalogStore, CatalogWriter, ClassDef, ClassId, ClassKindDef,
    ClassModifier, ClassRow, ClassType, CompositeDef, CompositeUnitDef, ConstraintDef,
    ConstraintEnd, ConstraintRow, ContainerType, ContainerTypes, CustomAttributeDef,
    CustomAttributeRow, Direction, EnumerationDef, EnumerationId, EnumerationRow, Enumerator,
    FormatDef, ItemRef, KindOfQuantityDef, MemoryStore, Multiplicity, NumericSpec, PhenomenonDef,
    PhenomenonId, PhenomenonRow, PrimitiveType, PropertyCategoryDef, PropertyDef, PropertyId,
    PropertyKind, PropertyKindDef, PropertyKindTag, PropertyRow, RelationshipDef, SchemaDef,
    SchemaId, SchemaKey, SchemaManager, SchemaRow, SchemaRows, SchemaVersion, SchemaWriter,
    StaticUnitsLocator, StoreIdentity, StrengthType, UnitDef, UnitId, UnitKind, UnitRow,
    UnitSource, UnitSystemDef, UnitSystemId, UnitSystemRow,
};

fn v1() -> SchemaVersion {
    SchemaVersion::new(1, 0, 0)
}

fn units_def() -> SchemaDef {
    SchemaDef::new(UNITS_SCHEMA, "u", reference_version())
        .with_unit_system(UnitSystemDef::new("SI"))
        .with_unit_system(UnitSystemDef::new("USCUSTOM"))
        .with_phenomenon(PhenomenonDef::new("LENGTH", "LENGTH"))
        .with_phenomenon(PhenomenonDef::new("SLOPE", "LENGTH*LENGTH(-1)"))
        .with_unit(UnitDef::inverted("FT_HORIZONTAL_PER_FT_VERTICAL", "USCUSTOM", "FT_PER_FT"))
        .with_unit(UnitDef::regular("M", "LENGTH", "SI", "M"))
        .with_unit(UnitDef::regular("FT", "LENGTH", "USCUSTOM", "M").with_factor(0.3048))
        .with_unit(UnitDef::regular("IN", "LENGTH", "USCUSTOM", "FT").with_factor(1.0 / 12.0))
        .with_unit(UnitDef::regular("FT_PER_FT", "SLOPE", "USCUSTOM", "FT*FT(-1)"))
}

fn formats_def() -> SchemaDef {
    SchemaDef::new(FORMATS_SCHEMA, "f", reference_version())
        .with_reference(SchemaKey::new(UNITS_SCHEMA, reference_version()))
        .with_format(FormatDef::new("DefaultReal", NumericSpec::default()))
        .with_format(
            FormatDef::new("AmerFI", NumericSpec::default()).with_composite(CompositeDef {
                spacer: Some(" ".into()),
                include_zero: true,
                units: vec![
                    CompositeUnitDef {
                        unit: "u:FT".into(),
                        label: Some("'".into()),
                    },
                    CompositeUnitDef {
                        unit: "u:IN".into(),
                        label: Some("\"".into()),
                    },
                ],
            }),
        )
}

fn core_def() -> SchemaDef {
    SchemaDef::new("CoreCustomAttributes", "CoreCA", v1()).with_class(
        ClassDef::custom_attribute("IsMixin", ContainerTypes::ENTITY_CLASS).with_property(
            PropertyDef::primitive("AppliesToEntityClass", PrimitiveType::String),
        ),
    )
}

fn note(text: &str) -> CustomAttributeDef {
    CustomAttributeDef::new(ItemRef::local("Note")).with_value("Text", text)
}

/// A schema touching every reader: structs, enumerations, kinds of
/// quantity, categories, a relationship with a navigation property and a
/// schema custom attribute of its own class.
fn plant_def() -> SchemaDef {
    let owns_pumps = RelationshipDef {
        strength: StrengthType::Embedding,
        strength_direction: Direction::Forward,
        source: ConstraintDef::new(Multiplicity::ZERO_ONE, vec![ItemRef::local("Site")])
            .with_role_label("owns"),
        target: ConstraintDef::new(Multiplicity::ZERO_MANY, vec![ItemRef::local("Element")])
            .with_role_label("is owned by")
            .with_abstract_constraint(ItemRef::local("Element")),
    };

    SchemaDef::new("Plant", "plant", v1())
        .with_label("Process Plant")
        .with_reference(SchemaKey::new(UNITS_SCHEMA, reference_version()))
        .with_reference(SchemaKey::new(FORMATS_SCHEMA, reference_version()))
        .with_custom_attribute(note("plant schema"))
        .with_class(ClassDef::custom_attribute("Note", ContainerTypes::ANY).with_property(
            PropertyDef::primitive("Text", PrimitiveType::String),
        ))
        .with_class(
            ClassDef::structure("Position")
                .with_property(PropertyDef::primitive("X", PrimitiveType::Double))
                .with_property(PropertyDef::primitive("Y", PrimitiveType::Double)),
        )
        .with_class(ClassDef::entity("Element").with_modifier(ClassModifier::Abstract))
        .with_class(
            ClassDef::entity("Pump")
                .with_label("Centrifugal Pump")
                .with_base_class(ItemRef::local("Element"))
                .with_custom_attribute(note("rotating equipment"))
                .with_property(
                    PropertyDef::primitive("Diameter", PrimitiveType::Double)
                        .with_kind_of_quantity(ItemRef::local("LENGTH"))
                        .with_category(ItemRef::local("Hydraulics")),
                )
                .with_property(PropertyDef::new(
                    "Status",
                    PropertyKindDef::Primitive {
                        primitive_type: PrimitiveType::Integer,
                        enumeration: Some(ItemRef::local("PumpStatus")),
                        extended_type: None,
                    },
                ))
                .with_property(PropertyDef::new(
                    "Location",
                    PropertyKindDef::Struct {
                        struct_class: ItemRef::local("Position"),
                    },
                ))
                .with_property(PropertyDef::new(
                    "Tags",
                    PropertyKindDef::PrimitiveArray {
                        primitive_type: PrimitiveType::String,
                        enumeration: None,
                        extended_type: None,
                        bounds: ArrayBounds::new(0, Some(8)),
                    },
                ))
                .with_property(PropertyDef::new(
                    "Site",
                    PropertyKindDef::Navigation {
                        relationship: ItemRef::local("SiteOwnsElements"),
                        direction: Direction::Backward,
                    },
                )),
        )
        .with_class(ClassDef::entity("Site"))
        .with_class(ClassDef::relationship(
            "SiteOwnsElements",
            owns_pumps,
        ))
        .with_enumeration(
            EnumerationDef::new("PumpStatus", PrimitiveType::Integer)
                .with_enumerator(Enumerator::integer("Running", 1))
                .with_enumerator(Enumerator::integer("Stopped", 2).with_label("Out of service")),
        )
        .with_kind_of_quantity(
            KindOfQuantityDef::new("LENGTH", "u:M", 0.0001)
                .with_presentation_format("f:DefaultReal(2)[u:M|m]")
                .with_presentation_format("f:AmerFI"),
        )
        .with_property_category(PropertyCategoryDef::new("Hydraulics", 10))
}

/// Manager over a memory store holding the unit schemas and the plant.
fn plant_manager() -> SchemaManager<MemoryStore> {
    let manager = SchemaManager::new(MemoryStore::new());
    manager
        .import_schemas(vec![plant_def(), formats_def(), units_def()])
        .unwrap();
    manager
}

fn schema_row(id: u64, name: &str, alias: &str) -> SchemaRow {
    SchemaRow {
        id: SchemaId(id),
        name: name.into(),
        alias: alias.into(),
        version: v1(),
        original_version: None,
        display_label: None,
        description: None,
    }
}

fn class_row(id: u64, name: &str, class_type: i32) -> ClassRow {
    ClassRow {
        id: ClassId(id),
        schema_id: SchemaId(1),
        name: name.into(),
        display_label: None,
        description: None,
        class_type,
        modifier: 0,
        applies_to: None,
        strength: None,
        strength_direction: None,
    }
}

fn store_with(rows: SchemaRows) -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert_schema(rows).unwrap();
    store
}

#[test]
fn test_repeated_lookups_share_one_instance() {
    let manager = plant_manager();
    let counter = manager.with_store(|store| store.query_counter());

    let pump = manager.get_class("Plant", "Pump").unwrap().unwrap();
    let before = counter.get();
    let again = manager.get_class("plant", "PUMP").unwrap().unwrap();
    let by_id = manager.get_class_by_id(pump.id).unwrap().unwrap();

    assert!(Arc::ptr_eq(&pump, &again));
    assert!(Arc::ptr_eq(&pump, &by_id));
    assert_eq!(counter.get(), before);

    let schema = manager.get_schema("Plant", false).unwrap().unwrap();
    let schema_by_id = manager.get_schema_by_id(pump.schema_id, false).unwrap().unwrap();
    assert!(Arc::ptr_eq(&schema, &schema_by_id));
}

#[test]
fn test_class_fields_are_materialized() {
    let manager = plant_manager();
    let pump = manager.get_class("Plant", "Pump").unwrap().unwrap();
    let element = manager.get_class("Plant", "Element").unwrap().unwrap();

    assert_eq!(pump.label(), "Centrifugal Pump");
    assert_eq!(pump.base_classes, vec![element.id]);
    assert_eq!(element.modifier, ClassModifier::Abstract);
    let names: Vec<&str> = pump.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Diameter", "Status", "Location", "Tags", "Site"]);

    let tags = pump.property("tags").unwrap();
    assert_eq!(tags.kind.tag(), PropertyKindTag::PrimitiveArray);
    assert_eq!(tags.kind.bounds(), Some(ArrayBounds::new(0, Some(8))));

    let location = pump.property("Location").unwrap();
    let position = manager.get_class("Plant", "Position").unwrap().unwrap();
    assert_eq!(location.kind.struct_class(), Some(position.id));
    assert!(position.is_struct());

    assert_eq!(pump.custom_attributes.len(), 1);
    assert_eq!(pump.custom_attributes[0].get_str("Text"), Some("rotating equipment"));
}

#[test]
fn test_unknown_ids_are_remembered() {
    let manager = plant_manager();
    let counter = manager.with_store(|store| store.query_counter());

    assert!(manager.get_class_by_id(ClassId(9999)).unwrap().is_none());
    let before = counter.get();
    assert!(manager.get_class_by_id(ClassId(9999)).unwrap().is_none());
    assert_eq!(counter.get(), before);
}

#[test]
fn test_unsupported_class_type_fails_once() {
    let mut rows = SchemaRows::new(schema_row(1, "Future", "ft"));
    rows.classes.push(class_row(2, "Hologram", 9));
    let store = store_with(rows);
    let counter = store.query_counter();
    let manager = SchemaManager::new(store);

    let err = manager.get_class_by_id(ClassId(2)).unwrap_err();
    assert!(matches!(
        err,
        CatalogError::UnsupportedValue {
            what: "class type",
            value: 9
        }
    ));

    let before = counter.get();
    assert!(manager.get_class_by_id(ClassId(2)).unwrap().is_none());
    assert_eq!(counter.get(), before);
}

#[test]
fn test_unsupported_property_kind_fails_the_class() {
    let mut rows = SchemaRows::new(schema_row(1, "Future", "ft"));
    rows.classes.push(class_row(2, "Widget", ClassType::Entity.as_i32()));
    rows.properties
        .push(PropertyRow::new(PropertyId(3), ClassId(2), 0, "Shape", 7));
    let manager = SchemaManager::new(store_with(rows));

    let err = manager.get_class_by_id(ClassId(2)).unwrap_err();
    assert!(matches!(
        err,
        CatalogError::UnsupportedValue {
            what: "property kind",
            value: 7
        }
    ));
    assert!(manager.get_class_by_id(ClassId(2)).unwrap().is_none());
}

#[test]
fn test_malformed_custom_attribute_instance() {
    let mut rows = SchemaRows::new(schema_row(1, "Broken", "br"));
    rows.classes.push(class_row(2, "Widget", ClassType::Entity.as_i32()));
    let mut marker = class_row(3, "Marker", ClassType::CustomAttribute.as_i32());
    marker.applies_to = Some(ContainerTypes::ANY.0);
    rows.classes.push(marker);
    rows.custom_attributes.push(CustomAttributeRow {
        class_id: ClassId(3),
        container_id: 2,
        container_type: ContainerType::Class.as_i32(),
        ordinal: 0,
        instance: "[1, 2]".into(),
    });
    let manager = SchemaManager::new(store_with(rows));

    let err = manager.get_class_by_id(ClassId(2)).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));
    // The attribute class itself is fine.
    assert!(manager.get_class_by_id(ClassId(3)).unwrap().is_some());
}

#[test]
fn test_malformed_enumerator_payload() {
    let mut rows = SchemaRows::new(schema_row(1, "Broken", "br"));
    rows.enumerations.push(EnumerationRow {
        id: EnumerationId(2),
        schema_id: SchemaId(1),
        name: "Colors".into(),
        display_label: None,
        description: None,
        backing_type: PrimitiveType::String.as_i32(),
        is_strict: true,
        enum_values: r#"[{"name":"Red","value":1}]"#.into(),
    });
    let manager = SchemaManager::new(store_with(rows));

    let err = manager.get_enumeration_by_id(EnumerationId(2)).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));
    assert!(manager.get_enumeration("Broken", "Colors").unwrap().is_none());
}

#[test]
fn test_attribute_of_non_attribute_class_is_rejected() {
    let mut rows = SchemaRows::new(schema_row(1, "Broken", "br"));
    rows.classes.push(class_row(2, "Widget", ClassType::Entity.as_i32()));
    rows.classes.push(class_row(3, "Gadget", ClassType::Entity.as_i32()));
    rows.custom_attributes.push(CustomAttributeRow {
        class_id: ClassId(3),
        container_id: 2,
        container_type: ContainerType::Class.as_i32(),
        ordinal: 0,
        instance: "{}".into(),
    });
    let manager = SchemaManager::new(store_with(rows));
    let err = manager.get_class_by_id(ClassId(2)).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));
}

#[test]
fn test_base_class_cycle_is_malformed() {
    let mut rows = SchemaRows::new(schema_row(1, "Loop", "lp"));
    rows.classes.push(class_row(2, "A", ClassType::Entity.as_i32()));
    rows.classes.push(class_row(3, "B", ClassType::Entity.as_i32()));
    rows.base_classes = vec![(ClassId(2), vec![ClassId(3)]), (ClassId(3), vec![ClassId(2)])];
    let manager = SchemaManager::new(store_with(rows));

    let err = manager.get_class_by_id(ClassId(2)).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));
    assert!(manager.get_class_by_id(ClassId(3)).unwrap().is_none());
    assert!(manager.get_class_by_id(ClassId(2)).unwrap().is_none());
}

#[test]
fn test_full_load_with_failed_class_fails() {
    let mut rows = SchemaRows::new(schema_row(1, "Loop", "lp"));
    rows.classes.push(class_row(2, "A", ClassType::Entity.as_i32()));
    rows.classes.push(class_row(3, "B", ClassType::Entity.as_i32()));
    rows.base_classes = vec![(ClassId(2), vec![ClassId(3)]), (ClassId(3), vec![ClassId(2)])];
    let manager = SchemaManager::new(store_with(rows));

    let err = manager.get_schema_by_id(SchemaId(1), true).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));

    // The failed full load is remembered; the stub stays usable.
    let err = manager.get_schema_by_id(SchemaId(1), true).unwrap_err();
    assert!(matches!(err, CatalogError::MissingReference(_)));
    let stub = manager.get_schema_by_id(SchemaId(1), false).unwrap().unwrap();
    assert!(!stub.is_fully_loaded());

    manager.clear_cache();
    let err = manager.get_schema_by_id(SchemaId(1), true).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));
}

#[test]
fn test_struct_array_of_derived_struct() {
    let tree = SchemaDef::new("Tree", "tr", v1())
        .with_class(ClassDef::structure("Node").with_property(PropertyDef::new(
            "Children",
            PropertyKindDef::StructArray {
                struct_class: ItemRef::local("Leaf"),
                bounds: ArrayBounds::unbounded(),
            },
        )))
        .with_class(
            ClassDef::structure("Leaf")
                .with_base_class(ItemRef::local("Node"))
                .with_property(PropertyDef::primitive("Weight", PrimitiveType::Double)),
        );
    let manager = SchemaManager::new(MemoryStore::new());
    manager.import_schemas(vec![tree]).unwrap();
    manager.clear_cache();

    let node = manager.get_class("Tree", "Node").unwrap().unwrap();
    let leaf = manager.get_class("Tree", "Leaf").unwrap().unwrap();
    assert_eq!(leaf.base_classes, vec![node.id]);
    assert_eq!(node.properties[0].kind.struct_class(), Some(leaf.id));

    let schema = manager.get_schema("Tree", true).unwrap().unwrap();
    assert!(schema.is_fully_loaded());
    assert_eq!(schema.contents().classes.len(), 2);
}

#[test]
fn test_relationship_needs_both_ends() {
    let mut rows = SchemaRows::new(schema_row(1, "Half", "hf"));
    rows.classes.push(class_row(2, "Node", ClassType::Entity.as_i32()));
    let mut link = class_row(3, "NodeLink", ClassType::Relationship.as_i32());
    link.strength = Some(StrengthType::Referencing.as_i32());
    rows.classes.push(link);
    rows.constraints.push(ConstraintRow {
        relationship_class_id: ClassId(3),
        end: ConstraintEnd::Source.as_i32(),
        multiplicity_lower: 0,
        multiplicity_upper: None,
        is_polymorphic: false,
        role_label: None,
        abstract_constraint_class_id: None,
        constraint_class_ids: vec![ClassId(2)],
    });
    let manager = SchemaManager::new(store_with(rows));

    let err = manager.get_class_by_id(ClassId(3)).unwrap_err();
    assert!(err.to_string().contains("no target constraint"));
    // The constraint class loaded on the way stays valid.
    assert!(manager.get_class_by_id(ClassId(2)).unwrap().is_some());
}

#[test]
fn test_mutually_referencing_structs() {
    let graph = SchemaDef::new("Graph", "gr", v1())
        .with_class(ClassDef::structure("A").with_property(PropertyDef::new(
            "Next",
            PropertyKindDef::Struct {
                struct_class: ItemRef::local("B"),
            },
        )))
        .with_class(ClassDef::structure("B").with_property(PropertyDef::new(
            "Previous",
            PropertyKindDef::StructArray {
                struct_class: ItemRef::local("A"),
                bounds: ArrayBounds::unbounded(),
            },
        )));
    let manager = SchemaManager::new(MemoryStore::new());
    manager.import_schemas(vec![graph]).unwrap();

    let a = manager.get_class("Graph", "A").unwrap().unwrap();
    assert_eq!(manager.cache_stats().classes, 2);
    let b = manager.get_class("Graph", "B").unwrap().unwrap();

    assert_eq!(a.properties[0].kind.struct_class(), Some(b.id));
    assert_eq!(b.properties[0].kind.struct_class(), Some(a.id));
    assert!(Arc::ptr_eq(&b, &manager.get_class_by_id(b.id).unwrap().unwrap()));
}

#[test]
fn test_stub_upgrades_in_place() {
    let manager = plant_manager();
    let stub = manager.get_schema("Plant", false).unwrap().unwrap();
    assert!(!stub.is_fully_loaded());
    assert_eq!(stub.total_child_count, 9);

    let full = manager.get_schema("Plant", true).unwrap().unwrap();
    assert!(Arc::ptr_eq(&stub, &full));
    assert!(stub.is_fully_loaded());

    let contents = stub.contents();
    assert_eq!(contents.classes.len(), 6);
    assert_eq!(contents.enumerations.len(), 1);
    assert_eq!(contents.kinds_of_quantity.len(), 1);
    assert_eq!(contents.property_categories.len(), 1);

    // Referenced schemas are loaded too.
    let units = manager.get_schema("Units", false).unwrap().unwrap();
    assert!(units.is_fully_loaded());
    assert_eq!(units.contents().units.len(), 5);
}

#[test]
fn test_stub_upgrades_through_class_lookups() {
    let pair = SchemaDef::new("Pair", "pr", v1())
        .with_class(ClassDef::entity("Left"))
        .with_class(ClassDef::entity("Right"));
    let manager = SchemaManager::new(MemoryStore::new());
    manager.import_schemas(vec![pair]).unwrap();
    manager.clear_cache();

    let stub = manager.get_schema("Pair", false).unwrap().unwrap();
    assert!(!stub.is_fully_loaded());
    manager.get_class("Pair", "Left").unwrap().unwrap();
    assert!(!stub.is_fully_loaded());
    manager.get_class("Pair", "Right").unwrap().unwrap();
    assert!(stub.is_fully_loaded());

    let counter = manager.with_store(|store| store.query_counter());
    let before = counter.get();
    let full = manager.get_schema_by_id(stub.id, true).unwrap().unwrap();
    assert!(Arc::ptr_eq(&stub, &full));
    assert_eq!(counter.get(), before);
    assert_eq!(full.contents().classes.len(), 2);
}

#[test]
fn test_schema_attribute_of_own_class() {
    let manager = plant_manager();
    let schema = manager.get_schema("Plant", false).unwrap().unwrap();
    assert!(schema.custom_attributes_loaded());
    let attributes = schema.custom_attributes();
    assert_eq!(attributes.len(), 1);
    assert_eq!(attributes[0].get_str("text"), Some("plant schema"));

    let note = manager.get_class("Plant", "Note").unwrap().unwrap();
    assert_eq!(attributes[0].class_id, note.id);
}

#[test]
fn test_navigation_property_resolved_after_declaring_class() {
    let manager = plant_manager();
    let pump = manager.get_class("Plant", "Pump").unwrap().unwrap();
    let site = pump.property("Site").unwrap();
    let PropertyKind::Navigation {
        relationship,
        direction,
    } = site.kind
    else {
        panic!("unexpected kind {:?}", site.kind);
    };
    assert_eq!(direction, Direction::Backward);

    let owns = manager.get_class_by_id(relationship).unwrap().unwrap();
    let info = owns.relationship().unwrap();
    assert_eq!(info.strength, StrengthType::Embedding);
    assert_eq!(info.source.role_label.as_deref(), Some("owns"));
    assert_eq!(info.constraint(ConstraintEnd::Target).multiplicity, Multiplicity::ZERO_MANY);
}

#[test]
fn test_navigation_to_many_end_fails_declaring_class() {
    let net = SchemaDef::new("Net", "net", v1())
        .with_class(ClassDef::entity("Node").with_property(PropertyDef::new(
            "Children",
            PropertyKindDef::Navigation {
                relationship: ItemRef::local("NodeHasChildren"),
                direction: Direction::Forward,
            },
        )))
        .with_class(ClassDef::relationship(
            "NodeHasChildren",
            RelationshipDef {
                strength: StrengthType::Referencing,
                strength_direction: Direction::Forward,
                source: ConstraintDef::new(Multiplicity::ZERO_ONE, vec![ItemRef::local("Node")]),
                target: ConstraintDef::new(Multiplicity::ZERO_MANY, vec![ItemRef::local("Node")]),
            },
        ));
    let manager = SchemaManager::new(MemoryStore::new());
    manager.import_schemas(vec![net]).unwrap();

    let err = manager.get_class("Net", "Node").unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));
    assert!(manager.get_class("Net", "Node").unwrap().is_none());
    // The relationship itself is valid.
    assert!(manager.get_class("Net", "NodeHasChildren").unwrap().is_some());
}

#[test]
fn test_every_navigation_failure_fails_its_class() {
    let to_many = |name: &str, source: &str| {
        ClassDef::relationship(
            name,
            RelationshipDef {
                strength: StrengthType::Referencing,
                strength_direction: Direction::Forward,
                source: ConstraintDef::new(Multiplicity::ZERO_ONE, vec![ItemRef::local(source)]),
                target: ConstraintDef::new(Multiplicity::ZERO_MANY, vec![ItemRef::local("Item")]),
            },
        )
    };
    let navigation = |relationship: &str| {
        PropertyDef::new(
            "Items",
            PropertyKindDef::Navigation {
                relationship: ItemRef::local(relationship),
                direction: Direction::Forward,
            },
        )
    };
    let net = SchemaDef::new("Net", "net", v1())
        .with_class(ClassDef::entity("Item"))
        .with_class(ClassDef::entity("A").with_property(navigation("AHasItems")))
        .with_class(ClassDef::entity("B").with_property(navigation("BHasItems")))
        .with_class(to_many("AHasItems", "A"))
        .with_class(to_many("BHasItems", "B"));
    let manager = SchemaManager::new(MemoryStore::new());
    manager.import_schemas(vec![net]).unwrap();
    manager.clear_cache();

    let err = manager.get_schema("Net", true).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));
    assert!(manager.get_class("Net", "A").unwrap().is_none());
    assert!(manager.get_class("Net", "B").unwrap().is_none());
    assert!(manager.get_class("Net", "Item").unwrap().is_some());
    assert!(manager.get_class("Net", "AHasItems").unwrap().is_some());

    // The schema no longer counts the failed classes as loaded.
    let schema = manager.get_schema("Net", false).unwrap().unwrap();
    assert!(!schema.is_fully_loaded());
    assert!(manager.get_schema("Net", true).is_err());
}

#[test]
fn test_kind_of_quantity_resolves_units_and_formats() {
    let manager = plant_manager();
    let koq = manager.get_kind_of_quantity("Plant", "LENGTH").unwrap().unwrap();
    assert_eq!(koq.persistence_unit.name, "M");
    assert!(koq.persistence_unit.id.is_some());
    assert_eq!(koq.relative_error, 0.0001);
    assert_eq!(koq.presentation_formats.len(), 2);

    let default = koq.default_presentation_format().unwrap();
    assert_eq!(default.format.name, "DefaultReal");
    assert_eq!(default.precision, Some(2));
    assert_eq!(default.unit_overrides.len(), 1);
    assert_eq!(default.unit_overrides[0].1.as_deref(), Some("m"));

    let composite = koq.presentation_formats[1].format.composite.as_ref().unwrap();
    let parts: Vec<&str> = composite.units.iter().map(|c| c.unit.name.as_str()).collect();
    assert_eq!(parts, ["FT", "IN"]);

    let unit = manager.get_unit("u", "M").unwrap().unwrap();
    assert!(Arc::ptr_eq(&unit, &koq.persistence_unit));
}

#[test]
fn test_enumeration_and_category() {
    let manager = plant_manager();
    let status = manager.get_enumeration("plant", "PumpStatus").unwrap().unwrap();
    assert_eq!(status.backing_type, PrimitiveType::Integer);
    assert!(status.is_strict);
    assert_eq!(status.find_by_name("stopped").unwrap().display_label.as_deref(), Some("Out of service"));

    let category = manager.get_property_category("Plant", "Hydraulics").unwrap().unwrap();
    assert_eq!(category.priority, 10);
    let by_id = manager.get_property_category_by_id(category.id).unwrap().unwrap();
    assert!(Arc::ptr_eq(&category, &by_id));
}

#[test]
fn test_inverted_unit_read_before_the_unit_it_inverts() {
    let mut rows = SchemaRows::new(schema_row(1, "Units", "u"));
    rows.unit_systems.push(UnitSystemRow {
        id: UnitSystemId(2),
        schema_id: SchemaId(1),
        name: "SI".into(),
        display_label: None,
        description: None,
    });
    rows.phenomena.push(PhenomenonRow {
        id: PhenomenonId(3),
        schema_id: SchemaId(1),
        name: "SLOPE".into(),
        display_label: None,
        description: None,
        definition: "LENGTH*LENGTH(-1)".into(),
    });
    rows.units.push(UnitRow {
        id: UnitId(5),
        schema_id: SchemaId(1),
        name: "VERTICAL_PER_HORIZONTAL".into(),
        display_label: None,
        description: None,
        phenomenon_id: None,
        unit_system_id: Some(UnitSystemId(2)),
        definition: None,
        numerator: None,
        denominator: None,
        offset: None,
        is_constant: false,
        inverting_unit_id: Some(UnitId(4)),
    });
    rows.units.push(UnitRow {
        id: UnitId(4),
        schema_id: SchemaId(1),
        name: "HORIZONTAL_PER_VERTICAL".into(),
        display_label: None,
        description: None,
        phenomenon_id: Some(PhenomenonId(3)),
        unit_system_id: Some(UnitSystemId(2)),
        definition: Some("M*M(-1)".into()),
        numerator: Some(1.0),
        denominator: Some(1.0),
        offset: None,
        is_constant: false,
        inverting_unit_id: None,
    });
    let manager = SchemaManager::new(store_with(rows));

    let inverted = manager.get_unit("u", "VERTICAL_PER_HORIZONTAL").unwrap().unwrap();
    match &inverted.kind {
        UnitKind::Inverted { inverts, .. } => assert_eq!(inverts.id, Some(UnitId(4))),
        other => panic!("unexpected kind {:?}", other),
    }
    assert!(inverted.is_inverted());
    assert_eq!(inverted.phenomenon().name, "SLOPE");
    let by_id = manager.get_unit_by_id(UnitId(5)).unwrap().unwrap();
    assert!(Arc::ptr_eq(&inverted, &by_id));
}

fn legacy_def() -> SchemaDef {
    SchemaDef::new("Legacy", "lg", v1()).with_kind_of_quantity(
        KindOfQuantityDef::new("LENGTH", "u:M", 0.01).with_presentation_format("f:DefaultReal(4)"),
    )
}

fn legacy_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.set_unit_tables(false);
    SchemaWriter::new(&mut store).write(&legacy_def()).unwrap();
    store
}

#[test]
fn test_legacy_units_fallback() {
    let locator = StaticUnitsLocator::new(vec![units_def(), formats_def()]);
    let manager = SchemaManager::with_units_locator(legacy_store(), Box::new(locator));

    let koq = manager.get_kind_of_quantity("Legacy", "LENGTH").unwrap().unwrap();
    assert_eq!(koq.persistence_unit.name, "M");
    assert!(koq.persistence_unit.id.is_none());
    assert_eq!(koq.presentation_formats[0].precision, Some(4));

    let catalog = manager.get_unit_catalog().unwrap();
    assert_eq!(catalog.source, UnitSource::Legacy);
    assert!(manager.cache_stats().units_loaded);
}

#[test]
fn test_failed_unit_catalog_is_remembered() {
    let manager = SchemaManager::new(legacy_store());

    let err = manager.get_kind_of_quantity("Legacy", "LENGTH").unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
    let err = manager.get_unit_catalog().unwrap_err();
    assert!(matches!(err, CatalogError::MissingReference(_)));
    assert!(!manager.cache_stats().units_loaded);
}

#[test]
fn test_store_without_units_or_quantities_has_empty_catalog() {
    let mut store = MemoryStore::new();
    store.set_unit_tables(false);
    let manager = SchemaManager::new(store);
    let catalog = manager.get_unit_catalog().unwrap();
    assert!(catalog.is_empty());
    assert_eq!(catalog.source, UnitSource::Store);
}

#[test]
fn test_mixin_applies_to_entity_class() {
    let mixins = SchemaDef::new("Mixins", "mx", v1())
        .with_reference(SchemaKey::new("CoreCustomAttributes", v1()))
        .with_class(ClassDef::entity("Pump"))
        .with_class(
            ClassDef::entity("Maintainable")
                .with_modifier(ClassModifier::Abstract)
                .with_custom_attribute(
                    CustomAttributeDef::new(ItemRef::in_schema("CoreCustomAttributes", "IsMixin"))
                        .with_value("AppliesToEntityClass", "Pump"),
                ),
        );
    let manager = SchemaManager::new(MemoryStore::new());
    manager.import_schemas(vec![mixins, core_def()]).unwrap();

    let mixin = manager.get_class("Mixins", "Maintainable").unwrap().unwrap();
    let pump = manager.get_class("Mixins", "Pump").unwrap().unwrap();
    assert!(mixin.is_mixin());
    assert_eq!(mixin.mixin_applies_to(), Some(pump.id));
    assert!(!pump.is_mixin());
}

#[test]
fn test_mixin_of_struct_is_rejected() {
    let mixins = SchemaDef::new("Mixins", "mx", v1())
        .with_reference(SchemaKey::new("CoreCustomAttributes", v1()))
        .with_class(ClassDef::structure("Point"))
        .with_class(ClassDef::entity("Located").with_custom_attribute(
            CustomAttributeDef::new(ItemRef::in_schema("CoreCA", "IsMixin"))
                .with_value("AppliesToEntityClass", "mx:Point"),
        ));
    let manager = SchemaManager::new(MemoryStore::new());
    manager.import_schemas(vec![core_def(), mixins]).unwrap();

    let err = manager.get_class("Mixins", "Located").unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));
}

#[test]
fn test_derived_classes() {
    let manager = plant_manager();
    let element = manager.get_class("Plant", "Element").unwrap().unwrap();
    assert!(element.derived_class_ids().is_none());

    let derived = manager.get_derived_classes(element.id).unwrap().unwrap();
    let names: Vec<&str> = derived.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Pump"]);
    assert_eq!(element.derived_class_ids(), Some(vec![derived[0].id]));

    assert!(manager.get_derived_classes(ClassId(9999)).unwrap().is_none());
}

#[test]
fn test_clear_cache_drops_shared_instances() {
    let manager = plant_manager();
    let pump = manager.get_class("Plant", "Pump").unwrap().unwrap();
    assert!(manager.cache_stats().classes > 0);

    manager.clear_cache();
    assert_eq!(manager.cache_stats().classes, 0);
    let reloaded = manager.get_class("Plant", "Pump").unwrap().unwrap();
    assert!(!Arc::ptr_eq(&pump, &reloaded));
    assert_eq!(pump.id, reloaded.id);
    assert_eq!(pump.name, "Pump");
}

#[test]
fn test_import_rejects_read_only_store() {
    let mut store = MemoryStore::new();
    store.set_readonly(true);
    let manager = SchemaManager::new(store);
    let err = manager.import_schemas(vec![core_def()]).unwrap_err();
    assert!(matches!(err, CatalogError::Policy(_)));
}

#[test]
fn test_import_rejects_empty_and_foreign_input() {
    let manager = SchemaManager::new(MemoryStore::new());
    assert!(matches!(
        manager.import_schemas(Vec::new()).unwrap_err(),
        CatalogError::Policy(_)
    ));

    let foreign = core_def().with_origin(StoreIdentity::new("sqlite:/elsewhere.db"));
    assert!(matches!(
        manager.import_schemas(vec![foreign]).unwrap_err(),
        CatalogError::Policy(_)
    ));
    // Definitions read from this very store are fine.
    let own = core_def().with_origin(StoreIdentity::new("memory"));
    assert_eq!(manager.import_schemas(vec![own]).unwrap().len(), 1);
}

#[test]
fn test_reimport_same_version_is_skipped() {
    let manager = SchemaManager::new(MemoryStore::new());
    manager.import_schemas(vec![core_def()]).unwrap();
    let schemas = manager.import_schemas(vec![core_def()]).unwrap();

    assert_eq!(schemas[0].name, "CoreCustomAttributes");
    manager.with_store(|store| {
        assert_eq!(store.schema_ids().unwrap().len(), 1);
        assert_eq!(store.views_generated(), 2);
    });

    let mut newer = core_def();
    newer.version = SchemaVersion::new(1, 0, 1);
    let err = manager.import_schemas(vec![newer]).unwrap_err();
    assert!(matches!(err, CatalogError::Policy(_)));
}

#[test]
fn test_import_requires_referenced_schemas() {
    let manager = SchemaManager::new(MemoryStore::new());
    let orphan = SchemaDef::new("Orphan", "or", v1()).with_reference(SchemaKey::new("Nowhere", v1()));
    let err = manager.import_schemas(vec![orphan]).unwrap_err();
    assert!(matches!(err, CatalogError::MissingReference(_)));
}

#[test]
fn test_import_returns_requested_order() {
    let manager = SchemaManager::new(MemoryStore::new());
    let schemas = manager
        .import_schemas(vec![plant_def(), units_def(), formats_def()])
        .unwrap();
    let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Plant", "Units", "Formats"]);
    assert_eq!(schemas[0].references, vec![schemas[1].id, schemas[2].id]);
}

#[test]
fn test_writer_qualifies_unit_family_names() {
    let widgets = SchemaDef::new("Widgets", "w", v1())
        .with_unit_system(UnitSystemDef::new("SI"))
        .with_phenomenon(PhenomenonDef::new("LENGTH", "LENGTH"))
        .with_unit(UnitDef::regular("M", "LENGTH", "SI", "M"))
        .with_format(FormatDef::new("DefaultReal", NumericSpec::default()))
        .with_kind_of_quantity(
            KindOfQuantityDef::new("LEN", "M", 0.1).with_presentation_format("DefaultReal(3)[M]"),
        )
        .with_class(ClassDef::entity("Gadget").with_property(
            PropertyDef::primitive("Size", PrimitiveType::Double)
                .with_kind_of_quantity(ItemRef::local("LEN")),
        ));

    let mut store = MemoryStore::new();
    let rows = SchemaWriter::new(&mut store).to_rows(&widgets).unwrap();

    let koq = &rows.kinds_of_quantity[0];
    assert_eq!(koq.persistence_unit, "w:M");
    assert_eq!(koq.presentation_formats.as_deref(), Some(r#"["w:DefaultReal(3)[w:M]"]"#));
    assert_eq!(rows.properties[0].kind_of_quantity_id, Some(koq.id));
    assert_eq!(rows.properties[0].primitive_type, Some(PrimitiveType::Double.as_i32()));
    assert_eq!(rows.units[0].phenomenon_id, Some(rows.phenomena[0].id));
    assert_eq!(rows.units[0].unit_system_id, Some(rows.unit_systems[0].id));
    assert_eq!(rows.formats[0].composite_include_zero, None);

    let mut ids = vec![
        rows.schema.id.0,
        rows.classes[0].id.0,
        rows.properties[0].id.0,
        koq.id.0,
        rows.units[0].id.0,
        rows.formats[0].id.0,
    ];
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[test]
fn test_writer_relationship_and_attribute_rows() {
    let mut store = MemoryStore::new();
    let rows = SchemaWriter::new(&mut store).to_rows(&plant_def_without_units()).unwrap();

    let owns = rows.classes.iter().find(|c| c.name == "SiteOwnsElements").unwrap();
    assert_eq!(owns.class_type, ClassType::Relationship.as_i32());
    assert_eq!(owns.strength, Some(StrengthType::Embedding.as_i32()));
    let ends: Vec<i32> = rows
        .constraints
        .iter()
        .filter(|c| c.relationship_class_id == owns.id)
        .map(|c| c.end)
        .collect();
    assert_eq!(ends, [ConstraintEnd::Source.as_i32(), ConstraintEnd::Target.as_i32()]);

    let schema_attribute = rows
        .custom_attributes
        .iter()
        .find(|ca| ca.container_type == ContainerType::Schema.as_i32())
        .unwrap();
    assert_eq!(schema_attribute.container_id, rows.schema.id.0);
    assert_eq!(schema_attribute.instance, r#"{"Text":"plant schema"}"#);
}

/// The plant schema with its unit-family parts removed, so it can be
/// converted without the unit schemas in the store.
fn plant_def_without_units() -> SchemaDef {
    let mut def = plant_def();
    def.references.clear();
    def.kinds_of_quantity.clear();
    for class in &mut def.classes {
        for property in &mut class.properties {
            property.kind_of_quantity = None;
        }
    }
    def
}

#[test]
fn test_writer_rejects_bad_definitions() {
    let mut store = MemoryStore::new();

    let twice = SchemaDef::new("Twice", "tw", v1())
        .with_class(ClassDef::entity("A"))
        .with_class(ClassDef::entity("a"));
    let err = SchemaWriter::new(&mut store).to_rows(&twice).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));

    let not_an_attribute = SchemaDef::new("Bad", "bd", v1())
        .with_class(ClassDef::entity("Plain"))
        .with_custom_attribute(CustomAttributeDef::new(ItemRef::local("Plain")));
    let err = SchemaWriter::new(&mut store).to_rows(&not_an_attribute).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));

    let dangling = SchemaDef::new("Dangling", "dg", v1()).with_class(
        ClassDef::entity("A").with_base_class(ItemRef::in_schema("Elsewhere", "Base")),
    );
    let err = SchemaWriter::new(&mut store).to_rows(&dangling).unwrap_err();
    assert!(matches!(err, CatalogError::MissingReference(_)));

    let mut composite = FormatDef::new("TooMany", NumericSpec::default());
    composite.composite = Some(CompositeDef {
        spacer: None,
        include_zero: false,
        units: Vec::new(),
    });
    let empty_composite = SchemaDef::new("Formats2", "f2", v1()).with_format(composite);
    let err = SchemaWriter::new(&mut store).to_rows(&empty_composite).unwrap_err();
    assert!(matches!(err, CatalogError::MalformedPayload(_)));
}

#[test]
fn test_class_kind_definitions_map_to_class_types() {
    let kinds = [
        (ClassKindDef::Entity, ClassType::Entity),
        (ClassKindDef::Struct, ClassType::Struct),
        (
            ClassKindDef::CustomAttribute {
                applies_to: ContainerTypes::ANY_PROPERTY,
            },
            ClassType::CustomAttribute,
        ),
    ];
    for (kind, expected) in kinds {
        let def = SchemaDef::new("Kinds", "kd", v1()).with_class(ClassDef::new("Only", kind));
        let mut store = MemoryStore::new();
        let rows = SchemaWriter::new(&mut store).to_rows(&def).unwrap();
        assert_eq!(rows.classes[0].class_type, expected.as_i32());
    }
}
