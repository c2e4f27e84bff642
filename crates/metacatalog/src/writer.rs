//! Conversion of schema definitions into store rows.
//!
//! Ids for every named child of a schema are allocated before any row is
//! built, so references between items of the same schema resolve in any
//! declaration order. References into other schemas go through the store and
//! must name a schema listed in the definition's references.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::enumeration::{check_backing_type, parse_enumerators};
use crate::format_string::{FormatString, QualifiedName, MAX_COMPOSITE_UNITS};
use crate::{
    CatalogError, CatalogResult, CatalogStore, CatalogWriter, ClassDef, ClassId, ClassKindDef,
    ClassRow, ClassType, ConstraintDef, ConstraintEnd, ConstraintRow, ContainerType,
    CustomAttributeDef, CustomAttributeRow, EnumerationId, EnumerationRow, FormatCompositeUnitRow,
    FormatId, FormatRow, ItemRef, KindOfQuantityId, KindOfQuantityRow, PhenomenonId,
    PhenomenonRow, PropertyCategoryId, PropertyCategoryRow, PropertyDef, PropertyId,
    PropertyKindDef, PropertyKindTag, PropertyRow, SchemaDef, SchemaId, SchemaLookupMode,
    SchemaRow, SchemaRows, UnitId, UnitKindDef, UnitRow, UnitSystemId, UnitSystemRow,
};

/// Writes [`SchemaDef`]s into a [`CatalogWriter`].
pub struct SchemaWriter<'a, S> {
    store: &'a mut S,
}

/// Ids allocated for the items of the schema being written, keyed by
/// lowercase name.
#[derive(Default)]
struct LocalIds {
    classes: HashMap<String, ClassId>,
    enumerations: HashMap<String, EnumerationId>,
    kinds_of_quantity: HashMap<String, KindOfQuantityId>,
    property_categories: HashMap<String, PropertyCategoryId>,
    unit_systems: HashMap<String, UnitSystemId>,
    phenomena: HashMap<String, PhenomenonId>,
    units: HashMap<String, UnitId>,
    formats: HashMap<String, FormatId>,
    /// Per class, in declaration order.
    properties: Vec<Vec<PropertyId>>,
}

fn claim<T: Copy>(
    map: &mut HashMap<String, T>,
    schema: &str,
    kind: &str,
    name: &str,
    id: T,
) -> CatalogResult<()> {
    if map.insert(name.to_ascii_lowercase(), id).is_some() {
        return Err(CatalogError::malformed(format!(
            "schema '{}' declares {} '{}' twice",
            schema, kind, name
        )));
    }
    Ok(())
}

impl<'a, S: CatalogStore + CatalogWriter> SchemaWriter<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Convert and insert one schema. Every schema it references must
    /// already be in the store.
    pub fn write(&mut self, def: &SchemaDef) -> CatalogResult<SchemaId> {
        let rows = self.to_rows(def)?;
        let id = rows.schema_id();
        debug!(
            schema = %def.name,
            %id,
            classes = rows.classes.len(),
            properties = rows.properties.len(),
            "writing schema rows"
        );
        self.store.insert_schema(rows)?;
        Ok(id)
    }

    pub fn to_rows(&mut self, def: &SchemaDef) -> CatalogResult<SchemaRows> {
        let mut references = Vec::with_capacity(def.references.len());
        for key in &def.references {
            let row = self
                .store
                .schema_id(&key.name, SchemaLookupMode::ByName)?
                .map(|id| self.store.schema_row(id))
                .transpose()?
                .flatten()
                .ok_or_else(|| {
                    CatalogError::missing(format!(
                        "schema '{}' references '{}' {}, which is not in the store",
                        def.name, key.name, key.version
                    ))
                })?;
            if row.version.read != key.version.read {
                return Err(CatalogError::missing(format!(
                    "schema '{}' references '{}' {}, the store holds {}",
                    def.name, key.name, key.version, row.version
                )));
            }
            references.push(row);
        }

        let schema_id = SchemaId(self.store.allocate_id()?);
        let ids = self.allocate_ids(def)?;

        let scope = Scope {
            store: &*self.store,
            def,
            schema_id,
            references,
            ids,
        };
        scope.build()
    }

    fn allocate_ids(&mut self, def: &SchemaDef) -> CatalogResult<LocalIds> {
        let mut ids = LocalIds::default();
        let schema = def.name.as_str();
        for class in &def.classes {
            let id = ClassId(self.store.allocate_id()?);
            claim(&mut ids.classes, schema, "class", &class.name, id)?;
        }
        for item in &def.enumerations {
            let id = EnumerationId(self.store.allocate_id()?);
            claim(&mut ids.enumerations, schema, "enumeration", &item.name, id)?;
        }
        for item in &def.kinds_of_quantity {
            let id = KindOfQuantityId(self.store.allocate_id()?);
            claim(&mut ids.kinds_of_quantity, schema, "kind of quantity", &item.name, id)?;
        }
        for item in &def.property_categories {
            let id = PropertyCategoryId(self.store.allocate_id()?);
            claim(&mut ids.property_categories, schema, "property category", &item.name, id)?;
        }
        for item in &def.unit_systems {
            let id = UnitSystemId(self.store.allocate_id()?);
            claim(&mut ids.unit_systems, schema, "unit system", &item.name, id)?;
        }
        for item in &def.phenomena {
            let id = PhenomenonId(self.store.allocate_id()?);
            claim(&mut ids.phenomena, schema, "phenomenon", &item.name, id)?;
        }
        for item in &def.units {
            let id = UnitId(self.store.allocate_id()?);
            claim(&mut ids.units, schema, "unit", &item.name, id)?;
        }
        for item in &def.formats {
            let id = FormatId(self.store.allocate_id()?);
            claim(&mut ids.formats, schema, "format", &item.name, id)?;
        }
        for class in &def.classes {
            let properties = class
                .properties
                .iter()
                .map(|_| self.store.allocate_id().map(PropertyId))
                .collect::<CatalogResult<Vec<_>>>()?;
            ids.properties.push(properties);
        }
        Ok(ids)
    }
}

struct Scope<'a, S> {
    store: &'a S,
    def: &'a SchemaDef,
    schema_id: SchemaId,
    references: Vec<SchemaRow>,
    ids: LocalIds,
}

impl<S: CatalogStore> Scope<'_, S> {
    fn is_local(&self, qualifier: Option<&str>) -> bool {
        qualifier.map_or(true, |q| {
            q.eq_ignore_ascii_case(&self.def.name) || q.eq_ignore_ascii_case(&self.def.alias)
        })
    }

    fn referenced_schema(&self, qualifier: &str, item: &str) -> CatalogResult<SchemaId> {
        self.references
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(qualifier) || r.alias.eq_ignore_ascii_case(qualifier))
            .map(|r| r.id)
            .ok_or_else(|| {
                CatalogError::missing(format!(
                    "'{}:{}' used by schema '{}' points into an unreferenced schema",
                    qualifier, item, self.def.name
                ))
            })
    }

    /// Resolve `qualifier:name` against the local ids or a referenced schema.
    fn lookup<T: Copy>(
        &self,
        kind: &str,
        qualifier: Option<&str>,
        name: &str,
        local: &HashMap<String, T>,
        remote: impl Fn(&S, SchemaId, &str) -> CatalogResult<Option<T>>,
    ) -> CatalogResult<T> {
        let found = if self.is_local(qualifier) {
            local.get(&name.to_ascii_lowercase()).copied()
        } else {
            let qualifier = qualifier.unwrap_or_default();
            let schema_id = self.referenced_schema(qualifier, name)?;
            remote(self.store, schema_id, name)?
        };
        found.ok_or_else(|| {
            let full = match qualifier {
                Some(q) => format!("{}:{}", q, name),
                None => name.to_string(),
            };
            CatalogError::missing(format!("{} '{}' used by schema '{}'", kind, full, self.def.name))
        })
    }

    fn class_id(&self, item: &ItemRef) -> CatalogResult<ClassId> {
        self.lookup("class", item.schema.as_deref(), &item.name, &self.ids.classes, |s, id, n| {
            s.class_id(id, n)
        })
    }

    fn enumeration_id(&self, item: &ItemRef) -> CatalogResult<EnumerationId> {
        self.lookup(
            "enumeration",
            item.schema.as_deref(),
            &item.name,
            &self.ids.enumerations,
            |s, id, n| s.enumeration_id(id, n),
        )
    }

    fn kind_of_quantity_id(&self, item: &ItemRef) -> CatalogResult<KindOfQuantityId> {
        self.lookup(
            "kind of quantity",
            item.schema.as_deref(),
            &item.name,
            &self.ids.kinds_of_quantity,
            |s, id, n| s.kind_of_quantity_id(id, n),
        )
    }

    fn property_category_id(&self, item: &ItemRef) -> CatalogResult<PropertyCategoryId> {
        self.lookup(
            "property category",
            item.schema.as_deref(),
            &item.name,
            &self.ids.property_categories,
            |s, id, n| s.property_category_id(id, n),
        )
    }

    fn unit_system_id(&self, text: &str) -> CatalogResult<UnitSystemId> {
        let name = QualifiedName::parse(text)?;
        self.lookup("unit system", name.qualifier.as_deref(), &name.name, &self.ids.unit_systems, |s, id, n| {
            s.unit_system_id(id, n)
        })
    }

    fn phenomenon_id(&self, text: &str) -> CatalogResult<PhenomenonId> {
        let name = QualifiedName::parse(text)?;
        self.lookup("phenomenon", name.qualifier.as_deref(), &name.name, &self.ids.phenomena, |s, id, n| {
            s.phenomenon_id(id, n)
        })
    }

    fn unit_id(&self, text: &str) -> CatalogResult<UnitId> {
        let name = QualifiedName::parse(text)?;
        self.lookup("unit", name.qualifier.as_deref(), &name.name, &self.ids.units, |s, id, n| {
            s.unit_id(id, n)
        })
    }

    /// Bare names get the alias of the schema being written.
    fn qualify(&self, name: QualifiedName) -> QualifiedName {
        match name.qualifier {
            Some(_) => name,
            None => QualifiedName::new(self.def.alias.clone(), name.name),
        }
    }

    fn class_type_of(&self, item: &ItemRef, id: ClassId) -> CatalogResult<Option<ClassType>> {
        if self.is_local(item.schema.as_deref()) {
            return Ok(self.def.class(&item.name).map(|class| match class.kind {
                ClassKindDef::Entity => ClassType::Entity,
                ClassKindDef::Struct => ClassType::Struct,
                ClassKindDef::CustomAttribute { .. } => ClassType::CustomAttribute,
                ClassKindDef::Relationship(_) => ClassType::Relationship,
            }));
        }
        Ok(self
            .store
            .class_row(id)?
            .and_then(|row| ClassType::from_i32(row.class_type)))
    }

    fn build(self) -> CatalogResult<SchemaRows> {
        let def = self.def;
        let mut rows = SchemaRows::new(SchemaRow {
            id: self.schema_id,
            name: def.name.clone(),
            alias: def.alias.clone(),
            version: def.version,
            original_version: def.original_version,
            display_label: def.display_label.clone(),
            description: def.description.clone(),
        });
        rows.references = self.references.iter().map(|r| r.id).collect();

        self.custom_attribute_rows(
            &mut rows,
            self.schema_id.0,
            ContainerType::Schema,
            &def.custom_attributes,
        )?;
        for (class, property_ids) in def.classes.iter().zip(&self.ids.properties) {
            self.class_rows(&mut rows, class, property_ids)?;
        }
        self.element_rows(&mut rows)?;
        self.unit_rows(&mut rows)?;
        Ok(rows)
    }

    fn custom_attribute_rows(
        &self,
        rows: &mut SchemaRows,
        container_id: u64,
        container_type: ContainerType,
        attributes: &[CustomAttributeDef],
    ) -> CatalogResult<()> {
        for (ordinal, attribute) in attributes.iter().enumerate() {
            let class_id = self.class_id(&attribute.class)?;
            if self.class_type_of(&attribute.class, class_id)? != Some(ClassType::CustomAttribute) {
                return Err(CatalogError::malformed(format!(
                    "'{}' used as a custom attribute in schema '{}' is not a custom attribute class",
                    attribute.class.name, self.def.name
                )));
            }
            rows.custom_attributes.push(CustomAttributeRow {
                class_id,
                container_id,
                container_type: container_type.as_i32(),
                ordinal: ordinal as u32,
                instance: serde_json::to_string(&Value::Object(attribute.values.clone()))?,
            });
        }
        Ok(())
    }

    fn class_rows(
        &self,
        rows: &mut SchemaRows,
        class: &ClassDef,
        property_ids: &[PropertyId],
    ) -> CatalogResult<()> {
        let id = self.class_id(&ItemRef::local(class.name.clone()))?;
        let mut row = ClassRow {
            id,
            schema_id: self.schema_id,
            name: class.name.clone(),
            display_label: class.display_label.clone(),
            description: class.description.clone(),
            class_type: ClassType::Entity.as_i32(),
            modifier: class.modifier.as_i32(),
            applies_to: None,
            strength: None,
            strength_direction: None,
        };
        match &class.kind {
            ClassKindDef::Entity => {}
            ClassKindDef::Struct => row.class_type = ClassType::Struct.as_i32(),
            ClassKindDef::CustomAttribute { applies_to } => {
                row.class_type = ClassType::CustomAttribute.as_i32();
                row.applies_to = Some(applies_to.0);
            }
            ClassKindDef::Relationship(relationship) => {
                row.class_type = ClassType::Relationship.as_i32();
                row.strength = Some(relationship.strength.as_i32());
                row.strength_direction = Some(relationship.strength_direction.as_i32());
                self.constraint_row(rows, id, ConstraintEnd::Source, &relationship.source)?;
                self.constraint_row(rows, id, ConstraintEnd::Target, &relationship.target)?;
            }
        }
        rows.classes.push(row);

        if !class.base_classes.is_empty() {
            let bases = class
                .base_classes
                .iter()
                .map(|base| self.class_id(base))
                .collect::<CatalogResult<Vec<_>>>()?;
            rows.base_classes.push((id, bases));
        }

        for (ordinal, (property, &property_id)) in class.properties.iter().zip(property_ids).enumerate() {
            self.property_row(rows, id, property_id, ordinal as u32, property)?;
        }
        self.custom_attribute_rows(rows, id.0, ContainerType::Class, &class.custom_attributes)
    }

    fn constraint_row(
        &self,
        rows: &mut SchemaRows,
        relationship: ClassId,
        end: ConstraintEnd,
        constraint: &ConstraintDef,
    ) -> CatalogResult<()> {
        let constraint_class_ids = constraint
            .constraint_classes
            .iter()
            .map(|class| self.class_id(class))
            .collect::<CatalogResult<Vec<_>>>()?;
        let abstract_constraint_class_id = constraint
            .abstract_constraint
            .as_ref()
            .map(|class| self.class_id(class))
            .transpose()?;
        rows.constraints.push(ConstraintRow {
            relationship_class_id: relationship,
            end: end.as_i32(),
            multiplicity_lower: constraint.multiplicity.lower,
            multiplicity_upper: constraint.multiplicity.upper,
            is_polymorphic: constraint.polymorphic,
            role_label: constraint.role_label.clone(),
            abstract_constraint_class_id,
            constraint_class_ids,
        });
        let container_type = match end {
            ConstraintEnd::Source => ContainerType::SourceRelationshipConstraint,
            ConstraintEnd::Target => ContainerType::TargetRelationshipConstraint,
        };
        self.custom_attribute_rows(rows, relationship.0, container_type, &constraint.custom_attributes)
    }

    fn property_row(
        &self,
        rows: &mut SchemaRows,
        class_id: ClassId,
        id: PropertyId,
        ordinal: u32,
        property: &PropertyDef,
    ) -> CatalogResult<()> {
        let tag = match &property.kind {
            PropertyKindDef::Primitive { .. } => PropertyKindTag::Primitive,
            PropertyKindDef::Struct { .. } => PropertyKindTag::Struct,
            PropertyKindDef::PrimitiveArray { .. } => PropertyKindTag::PrimitiveArray,
            PropertyKindDef::StructArray { .. } => PropertyKindTag::StructArray,
            PropertyKindDef::Navigation { .. } => PropertyKindTag::Navigation,
        };
        let mut row = PropertyRow::new(id, class_id, ordinal, property.name.clone(), tag.as_i32());
        row.display_label = property.display_label.clone();
        row.description = property.description.clone();
        row.is_readonly = property.is_readonly;
        row.priority = property.priority;

        match &property.kind {
            PropertyKindDef::Primitive {
                primitive_type,
                enumeration,
                extended_type,
            } => {
                row.primitive_type = Some(primitive_type.as_i32());
                row.enumeration_id = enumeration.as_ref().map(|e| self.enumeration_id(e)).transpose()?;
                row.extended_type_name = extended_type.clone();
            }
            PropertyKindDef::Struct { struct_class } => {
                row.struct_class_id = Some(self.class_id(struct_class)?);
            }
            PropertyKindDef::PrimitiveArray {
                primitive_type,
                enumeration,
                extended_type,
                bounds,
            } => {
                row.primitive_type = Some(primitive_type.as_i32());
                row.enumeration_id = enumeration.as_ref().map(|e| self.enumeration_id(e)).transpose()?;
                row.extended_type_name = extended_type.clone();
                row.array_min = Some(bounds.min);
                row.array_max = bounds.max;
            }
            PropertyKindDef::StructArray {
                struct_class,
                bounds,
            } => {
                row.struct_class_id = Some(self.class_id(struct_class)?);
                row.array_min = Some(bounds.min);
                row.array_max = bounds.max;
            }
            PropertyKindDef::Navigation {
                relationship,
                direction,
            } => {
                row.navigation_relationship_id = Some(self.class_id(relationship)?);
                row.navigation_direction = Some(direction.as_i32());
            }
        }
        row.kind_of_quantity_id = property
            .kind_of_quantity
            .as_ref()
            .map(|koq| self.kind_of_quantity_id(koq))
            .transpose()?;
        row.category_id = property
            .category
            .as_ref()
            .map(|category| self.property_category_id(category))
            .transpose()?;
        rows.properties.push(row);
        self.custom_attribute_rows(rows, id.0, ContainerType::Property, &property.custom_attributes)
    }

    fn element_rows(&self, rows: &mut SchemaRows) -> CatalogResult<()> {
        let def = self.def;
        for item in &def.enumerations {
            let backing_type = check_backing_type(item.backing_type.as_i32())?;
            let enum_values = serde_json::to_string(&item.enumerators)?;
            parse_enumerators(backing_type, &enum_values)?;
            rows.enumerations.push(EnumerationRow {
                id: self.enumeration_id(&ItemRef::local(item.name.clone()))?,
                schema_id: self.schema_id,
                name: item.name.clone(),
                display_label: item.display_label.clone(),
                description: item.description.clone(),
                backing_type: backing_type.as_i32(),
                is_strict: item.is_strict,
                enum_values,
            });
        }

        for item in &def.kinds_of_quantity {
            let persistence_unit = self.qualify(QualifiedName::parse(&item.persistence_unit)?);
            let presentation_formats = if item.presentation_formats.is_empty() {
                None
            } else {
                let normalized = item
                    .presentation_formats
                    .iter()
                    .map(|text| {
                        let mut parsed = FormatString::parse(text)?;
                        parsed.format = self.qualify(parsed.format);
                        for unit in &mut parsed.units {
                            unit.unit = self.qualify(unit.unit.clone());
                        }
                        Ok(parsed.to_string())
                    })
                    .collect::<CatalogResult<Vec<_>>>()?;
                Some(serde_json::to_string(&normalized)?)
            };
            rows.kinds_of_quantity.push(KindOfQuantityRow {
                id: self.kind_of_quantity_id(&ItemRef::local(item.name.clone()))?,
                schema_id: self.schema_id,
                name: item.name.clone(),
                display_label: item.display_label.clone(),
                description: item.description.clone(),
                persistence_unit: persistence_unit.to_string(),
                presentation_formats,
                relative_error: item.relative_error,
            });
        }

        for item in &def.property_categories {
            rows.property_categories.push(PropertyCategoryRow {
                id: self.property_category_id(&ItemRef::local(item.name.clone()))?,
                schema_id: self.schema_id,
                name: item.name.clone(),
                display_label: item.display_label.clone(),
                description: item.description.clone(),
                priority: item.priority,
            });
        }
        Ok(())
    }

    fn unit_rows(&self, rows: &mut SchemaRows) -> CatalogResult<()> {
        let def = self.def;
        for item in &def.unit_systems {
            rows.unit_systems.push(UnitSystemRow {
                id: self.unit_system_id(&item.name)?,
                schema_id: self.schema_id,
                name: item.name.clone(),
                display_label: item.display_label.clone(),
                description: item.description.clone(),
            });
        }

        for item in &def.phenomena {
            rows.phenomena.push(PhenomenonRow {
                id: self.phenomenon_id(&item.name)?,
                schema_id: self.schema_id,
                name: item.name.clone(),
                display_label: item.display_label.clone(),
                description: item.description.clone(),
                definition: item.definition.clone(),
            });
        }

        for item in &def.units {
            let mut row = UnitRow {
                id: self.unit_id(&item.name)?,
                schema_id: self.schema_id,
                name: item.name.clone(),
                display_label: item.display_label.clone(),
                description: item.description.clone(),
                phenomenon_id: None,
                unit_system_id: None,
                definition: None,
                numerator: None,
                denominator: None,
                offset: None,
                is_constant: false,
                inverting_unit_id: None,
            };
            match &item.kind {
                UnitKindDef::Regular {
                    phenomenon,
                    unit_system,
                    definition,
                    numerator,
                    denominator,
                    offset,
                } => {
                    row.phenomenon_id = Some(self.phenomenon_id(phenomenon)?);
                    row.unit_system_id = Some(self.unit_system_id(unit_system)?);
                    row.definition = Some(definition.clone());
                    row.numerator = Some(*numerator);
                    row.denominator = Some(*denominator);
                    row.offset = Some(*offset);
                }
                UnitKindDef::Constant {
                    phenomenon,
                    definition,
                    numerator,
                    denominator,
                } => {
                    row.phenomenon_id = Some(self.phenomenon_id(phenomenon)?);
                    row.definition = Some(definition.clone());
                    row.numerator = Some(*numerator);
                    row.denominator = Some(*denominator);
                    row.is_constant = true;
                }
                UnitKindDef::Inverted {
                    unit_system,
                    inverts,
                } => {
                    row.unit_system_id = Some(self.unit_system_id(unit_system)?);
                    row.inverting_unit_id = Some(self.unit_id(inverts)?);
                }
            }
            rows.units.push(row);
        }

        for item in &def.formats {
            let id = self.lookup("format", None, &item.name, &self.ids.formats, |s, id, n| {
                s.format_id(id, n)
            })?;
            let mut row = FormatRow {
                id,
                schema_id: self.schema_id,
                name: item.name.clone(),
                display_label: item.display_label.clone(),
                description: item.description.clone(),
                numeric_spec: serde_json::to_string(&item.numeric_spec)?,
                composite_spacer: None,
                composite_include_zero: None,
            };
            if let Some(composite) = &item.composite {
                if composite.units.is_empty() || composite.units.len() > MAX_COMPOSITE_UNITS {
                    return Err(CatalogError::malformed(format!(
                        "composite format '{}' has {} units, expected 1 to {}",
                        item.name,
                        composite.units.len(),
                        MAX_COMPOSITE_UNITS
                    )));
                }
                row.composite_spacer = composite.spacer.clone();
                row.composite_include_zero = Some(composite.include_zero);
                for (ordinal, part) in composite.units.iter().enumerate() {
                    rows.format_composite_units.push(FormatCompositeUnitRow {
                        format_id: id,
                        ordinal: ordinal as u32,
                        unit_id: self.unit_id(&part.unit)?,
                        label: part.label.clone(),
                    });
                }
            }
            rows.formats.push(row);
        }
        Ok(())
    }
}
