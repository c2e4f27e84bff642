//! Integration tests with realistic catalog scenarios.

use std::sync::Arc;
use std::thread;

use metacatalog::*;

fn v1() -> SchemaVersion {
    SchemaVersion::new(1, 0, 0)
}

/// A small process-plant schema with a struct, an enumeration and an
/// embedding relationship.
fn plant() -> SchemaDef {
    SchemaDef::new("Plant", "plant", v1())
        .with_label("Process Plant")
        .with_class(
            ClassDef::structure("Position")
                .with_property(PropertyDef::primitive("X", PrimitiveType::Double))
                .with_property(PropertyDef::primitive("Y", PrimitiveType::Double)),
        )
        .with_class(ClassDef::entity("Equipment").with_modifier(ClassModifier::Abstract))
        .with_class(
            ClassDef::entity("Pump")
                .with_description("Moves fluid")
                .with_base_class(ItemRef::local("Equipment"))
                .with_property(PropertyDef::primitive("Flow", PrimitiveType::Double))
                .with_property(PropertyDef::new(
                    "Location",
                    PropertyKindDef::Struct {
                        struct_class: ItemRef::local("Position"),
                    },
                ))
                .with_property(PropertyDef::new(
                    "Status",
                    PropertyKindDef::Primitive {
                        primitive_type: PrimitiveType::String,
                        enumeration: Some(ItemRef::local("Status")),
                        extended_type: None,
                    },
                )),
        )
        .with_class(ClassDef::entity("Site"))
        .with_class(ClassDef::relationship(
            "SiteHasEquipment",
            RelationshipDef {
                strength: StrengthType::Embedding,
                strength_direction: Direction::Forward,
                source: ConstraintDef::new(Multiplicity::ONE_ONE, vec![ItemRef::local("Site")]),
                target: ConstraintDef::new(
                    Multiplicity::ZERO_MANY,
                    vec![ItemRef::local("Pump")],
                )
                .with_abstract_constraint(ItemRef::local("Equipment")),
            },
        ))
        .with_enumeration(
            EnumerationDef::new("Status", PrimitiveType::String)
                .with_enumerator(Enumerator::string("Running", "R"))
                .with_enumerator(Enumerator::string("Stopped", "S")),
        )
}

/// Test that a schema imported through the facade reads back with its
/// scalar fields intact.
#[test]
fn test_import_and_read_back() {
    let manager = SchemaManager::new(MemoryStore::new());
    let imported = manager.import_schemas(vec![plant()]).unwrap();
    assert_eq!(imported.len(), 1);

    let schema = manager.get_schema("Plant", true).unwrap().unwrap();
    assert!(Arc::ptr_eq(&schema, &imported[0]));
    assert_eq!(schema.alias, "plant");
    assert_eq!(schema.label(), "Process Plant");
    assert_eq!(schema.full_name(), "Plant.01.00.00");
    assert!(schema.is_fully_loaded());

    // Lookup by alias
    let by_alias = manager
        .get_schema_with_mode("PLANT", SchemaLookupMode::ByAlias, false)
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&schema, &by_alias));

    let pump = manager.get_class("plant", "Pump").unwrap().unwrap();
    assert_eq!(pump.description.as_deref(), Some("Moves fluid"));
    assert_eq!(pump.class_type(), ClassType::Entity);
    assert_eq!(pump.properties.len(), 3);

    let status = pump.property("Status").unwrap();
    let enumeration = manager.get_enumeration("Plant", "Status").unwrap().unwrap();
    assert_eq!(status.kind.enumeration(), Some(enumeration.id));
    assert_eq!(enumeration.enumerators.len(), 2);

    let link = manager.get_class("Plant", "SiteHasEquipment").unwrap().unwrap();
    let info = link.relationship().unwrap();
    assert_eq!(info.source.multiplicity, Multiplicity::ONE_ONE);
    assert_eq!(info.target.multiplicity.to_string(), "(0..*)");
    let equipment = manager.get_class_id("Plant", "Equipment").unwrap();
    assert_eq!(info.target.abstract_constraint, equipment);
}

/// Test that lookups of unknown names come back empty rather than failing.
#[test]
fn test_unknown_names() {
    let manager = SchemaManager::new(MemoryStore::new());
    manager.import_schemas(vec![plant()]).unwrap();

    assert!(manager.get_schema("Refinery", false).unwrap().is_none());
    assert!(manager.get_class("Plant", "Valve").unwrap().is_none());
    assert!(manager.get_class("Refinery", "Pump").unwrap().is_none());
    assert!(manager.get_enumeration("Plant", "Colors").unwrap().is_none());
    assert!(manager.get_kind_of_quantity("Plant", "LENGTH").unwrap().is_none());
}

/// Test that every schema is listed once.
#[test]
fn test_get_schemas() {
    let manager = SchemaManager::new(MemoryStore::new());
    let other = SchemaDef::new("Other", "ot", v1()).with_class(ClassDef::entity("Thing"));
    manager.import_schemas(vec![plant(), other]).unwrap();

    let mut names: Vec<String> = manager
        .get_schemas(false)
        .unwrap()
        .iter()
        .map(|s| s.name.clone())
        .collect();
    names.sort();
    assert_eq!(names, ["Other", "Plant"]);
}

/// Test that readers on several threads share the same instances.
#[test]
fn test_concurrent_readers_share_instances() {
    let manager = Arc::new(SchemaManager::new(MemoryStore::new()));
    manager.import_schemas(vec![plant()]).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let pump = manager.get_class("Plant", "Pump").unwrap().unwrap();
                let position = manager.get_class("Plant", "Position").unwrap().unwrap();
                (pump, position)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let (first_pump, first_position) = &results[0];
    for (pump, position) in &results[1..] {
        assert!(Arc::ptr_eq(first_pump, pump));
        assert!(Arc::ptr_eq(first_position, position));
    }
}

/// Test that a supplemental schema's attributes end up on the primary.
#[test]
fn test_supplemental_schema_import() {
    let primary = SchemaDef::new("Plant2", "p2", v1())
        .with_class(ClassDef::entity("Pump").with_property(PropertyDef::primitive(
            "Flow",
            PrimitiveType::Double,
        )));
    let supplemental = SchemaDef::new("Plant2_Supp", "ps", v1())
        .with_supplemental(SupplementalInfo {
            primary_schema: "Plant2".into(),
            primary_version: v1(),
            precedence: 200,
            purpose: "Ratings".into(),
        })
        .with_class(ClassDef::custom_attribute("Rating", ContainerTypes::ANY_CLASS).with_property(
            PropertyDef::primitive("Stars", PrimitiveType::Integer),
        ))
        .with_class(ClassDef::entity("Pump").with_custom_attribute(
            CustomAttributeDef::new(ItemRef::local("Rating")).with_value("Stars", 5),
        ));

    let manager = SchemaManager::new(MemoryStore::new());
    let imported = manager
        .import_schemas(vec![primary, supplemental])
        .unwrap();
    let (primary, supplemental) = (&imported[0], &imported[1]);
    assert_eq!(primary.name, "Plant2");
    assert!(primary.references_schema(supplemental.id));

    let pump = manager.get_class("Plant2", "Pump").unwrap().unwrap();
    let rating = manager.get_class("Plant2_Supp", "Rating").unwrap().unwrap();
    assert_eq!(pump.custom_attributes.len(), 1);
    assert_eq!(pump.custom_attributes[0].class_id, rating.id);
    assert_eq!(pump.custom_attributes[0].get("stars"), Some(&serde_json::json!(5)));
}

/// Test a round trip through a SQLite file reopened read-only.
#[cfg(feature = "sqlite")]
#[test]
fn test_sqlite_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plant.db");

    {
        let manager = SchemaManager::new(SqliteStore::open(&path).unwrap());
        manager.import_schemas(vec![plant()]).unwrap();
    }

    let manager = SchemaManager::new(SqliteStore::open_readonly(&path).unwrap());
    let pump = manager.get_class("Plant", "Pump").unwrap().unwrap();
    let equipment = manager.get_class("Plant", "Equipment").unwrap().unwrap();
    assert_eq!(pump.base_classes, vec![equipment.id]);
    let names: Vec<&str> = pump.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Flow", "Location", "Status"]);

    let derived = manager.get_derived_classes(equipment.id).unwrap().unwrap();
    assert_eq!(derived.len(), 1);
    assert!(Arc::ptr_eq(&derived[0], &pump));

    // Read-only stores refuse imports.
    let err = manager.import_schemas(vec![plant()]).unwrap_err();
    assert!(matches!(err, CatalogError::Policy(_)));
}
