//! Classes, properties, relationship constraints and custom attributes.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error};

use super::{settle, SchemaReader};
use crate::cache::{CacheSlot, ClassHeader, ReaderCache};
use crate::{
    ArrayBounds, CatalogError, CatalogResult, CatalogStore, Class, ClassId, ClassKind,
    ClassModifier, ClassRow, ClassType, ConstraintEnd, ConstraintRow, ContainerType,
    ContainerTypes, CustomAttribute, Direction, LoadContext, Multiplicity, PrimitiveType,
    Property, PropertyKind, PropertyKindTag, PropertyRow, RelationshipConstraint,
    RelationshipInfo, Schema, StrengthType,
};

fn class_header(row: &ClassRow) -> CatalogResult<ClassHeader> {
    let class_type = ClassType::from_i32(row.class_type)
        .ok_or_else(|| CatalogError::unsupported("class type", row.class_type))?;
    Ok(ClassHeader {
        schema_id: row.schema_id,
        class_type,
    })
}

fn header_of(class: &Class) -> ClassHeader {
    ClassHeader {
        schema_id: class.schema_id,
        class_type: class.class_type(),
    }
}

impl<S: CatalogStore> SchemaReader<S> {
    /// The fully built class, or `Ok(None)` when the id is unknown, failed
    /// earlier, or is still being built further up the stack.
    pub fn read_class(&mut self, ctx: &mut LoadContext, id: ClassId) -> CatalogResult<Option<Arc<Class>>> {
        match self.cache.classes.find(id) {
            Some(CacheSlot::Loaded(class)) => return Ok(Some(class.clone())),
            Some(_) => return Ok(None),
            None => {}
        }
        let Some(row) = self.store.class_row(id)? else {
            debug!(%id, "no class row");
            self.cache.classes.fail(id);
            return Ok(None);
        };
        let header = match class_header(&row) {
            Ok(header) => header,
            Err(err) => {
                self.cache.classes.fail(id);
                error!(%id, class = %row.name, error = %err, "failed to load class");
                return Err(err);
            }
        };

        self.cache.classes.begin(id, header)?;
        let name = row.name.clone();
        let built = self.build_class(ctx, row, header);
        let class = settle(&mut self.cache.classes, id, "class", &name, built)?;

        if let Some(schema) = self.cache.schemas.loaded(class.schema_id) {
            schema.update_contents(|contents| {
                contents.classes.insert(id);
            });
            self.cache
                .class_names
                .insert(ReaderCache::class_name_key(&schema.name, &class.name), Some(id));
        }
        if class.is_entity() && !class.custom_attributes.is_empty() {
            ctx.mixin_candidates.push(id);
        }
        if class.relationship().is_some() {
            ctx.relationships.push(id);
        }
        Ok(Some(class))
    }

    /// Header of a class that is loaded or being loaded; loads it otherwise.
    pub(crate) fn ensure_class(
        &mut self,
        ctx: &mut LoadContext,
        id: ClassId,
    ) -> CatalogResult<Option<ClassHeader>> {
        match self.cache.classes.find(id) {
            Some(CacheSlot::Pending(header)) => Ok(Some(*header)),
            Some(CacheSlot::Loaded(class)) => Ok(Some(header_of(class))),
            Some(CacheSlot::Failed) => Ok(None),
            None => Ok(self.read_class(ctx, id)?.as_deref().map(header_of)),
        }
    }

    fn build_class(
        &mut self,
        ctx: &mut LoadContext,
        row: ClassRow,
        header: ClassHeader,
    ) -> CatalogResult<Class> {
        let modifier = ClassModifier::from_i32(row.modifier)
            .ok_or_else(|| CatalogError::unsupported("class modifier", row.modifier))?;
        let schema = self.read_schema_stub(ctx, header.schema_id)?.ok_or_else(|| {
            CatalogError::missing(format!(
                "class '{}' belongs to unknown schema {}",
                row.name, header.schema_id
            ))
        })?;

        let base_classes = self.store.base_class_ids(row.id)?;
        for &base_id in &base_classes {
            if matches!(self.cache.classes.find(base_id), Some(CacheSlot::Pending(_)))
                && self.stored_base_reaches(base_id, row.id)?
            {
                return Err(CatalogError::malformed(format!(
                    "class '{}' derives from itself through {}",
                    row.name, base_id
                )));
            }
            // A base still under construction further up the stack is
            // represented by its header.
            let base = self.ensure_class(ctx, base_id)?.ok_or_else(|| {
                CatalogError::missing(format!("base class {} of '{}'", base_id, row.name))
            })?;
            if base.schema_id != schema.id && !schema.references_schema(base.schema_id) {
                return Err(CatalogError::missing(format!(
                    "base class {} of '{}' lives in a schema '{}' does not reference",
                    base_id, row.name, schema.name
                )));
            }
        }

        let mut properties = Vec::new();
        for property_row in self.store.property_rows(row.id)? {
            properties.push(self.read_property(ctx, &schema, property_row)?);
        }

        let kind = match header.class_type {
            ClassType::Entity => ClassKind::Entity,
            ClassType::Struct => ClassKind::Struct,
            ClassType::CustomAttribute => ClassKind::CustomAttribute {
                applies_to: row.applies_to.map(ContainerTypes).unwrap_or_default(),
            },
            ClassType::Relationship => {
                ClassKind::Relationship(Box::new(self.read_relationship(ctx, &row)?))
            }
        };

        let custom_attributes = self.read_custom_attributes(ctx, row.id.0, ContainerType::Class)?;

        Ok(Class::new(
            row.id,
            row.schema_id,
            row.name,
            row.display_label,
            row.description,
            modifier,
            kind,
            base_classes,
            properties,
            custom_attributes,
        ))
    }

    /// True when `ancestor` is reachable from `class` through stored base
    /// class rows.
    fn stored_base_reaches(&self, class: ClassId, ancestor: ClassId) -> CatalogResult<bool> {
        let mut visited = HashSet::new();
        let mut pending = vec![class];
        while let Some(id) = pending.pop() {
            if id == ancestor {
                return Ok(true);
            }
            if visited.insert(id) {
                pending.extend(self.store.base_class_ids(id)?);
            }
        }
        Ok(false)
    }

    fn read_property(
        &mut self,
        ctx: &mut LoadContext,
        schema: &Schema,
        row: PropertyRow,
    ) -> CatalogResult<Property> {
        let tag = PropertyKindTag::from_i32(row.kind)
            .ok_or_else(|| CatalogError::unsupported("property kind", row.kind))?;
        let bounds = ArrayBounds::new(row.array_min.unwrap_or(0), row.array_max);

        let kind = match tag {
            PropertyKindTag::Primitive | PropertyKindTag::PrimitiveArray => {
                let raw = row.primitive_type.ok_or_else(|| {
                    CatalogError::malformed(format!("property '{}' has no primitive type", row.name))
                })?;
                let primitive_type = PrimitiveType::from_i32(raw)
                    .ok_or_else(|| CatalogError::unsupported("primitive type", raw))?;
                if let Some(enumeration_id) = row.enumeration_id {
                    self.read_enumeration(ctx, enumeration_id)?.ok_or_else(|| {
                        CatalogError::missing(format!(
                            "enumeration {} of property '{}'",
                            enumeration_id, row.name
                        ))
                    })?;
                }
                if tag == PropertyKindTag::Primitive {
                    PropertyKind::Primitive {
                        primitive_type,
                        enumeration: row.enumeration_id,
                        extended_type: row.extended_type_name.clone(),
                    }
                } else {
                    PropertyKind::PrimitiveArray {
                        primitive_type,
                        enumeration: row.enumeration_id,
                        extended_type: row.extended_type_name.clone(),
                        bounds,
                    }
                }
            }
            PropertyKindTag::Struct | PropertyKindTag::StructArray => {
                let struct_class = row.struct_class_id.ok_or_else(|| {
                    CatalogError::malformed(format!("property '{}' has no struct class", row.name))
                })?;
                let header = self.ensure_class(ctx, struct_class)?.ok_or_else(|| {
                    CatalogError::missing(format!(
                        "struct class {} of property '{}'",
                        struct_class, row.name
                    ))
                })?;
                if header.class_type != ClassType::Struct {
                    return Err(CatalogError::malformed(format!(
                        "class {} used by property '{}' is not a struct",
                        struct_class, row.name
                    )));
                }
                if tag == PropertyKindTag::Struct {
                    PropertyKind::Struct { struct_class }
                } else {
                    PropertyKind::StructArray {
                        struct_class,
                        bounds,
                    }
                }
            }
            PropertyKindTag::Navigation => {
                let relationship = row.navigation_relationship_id.ok_or_else(|| {
                    CatalogError::malformed(format!(
                        "navigation property '{}' has no relationship",
                        row.name
                    ))
                })?;
                let raw = row.navigation_direction.ok_or_else(|| {
                    CatalogError::malformed(format!(
                        "navigation property '{}' has no direction",
                        row.name
                    ))
                })?;
                let direction = Direction::from_i32(raw)
                    .ok_or_else(|| CatalogError::unsupported("navigation direction", raw))?;
                ctx.navigation_properties.push((row.class_id, row.id));
                PropertyKind::Navigation {
                    relationship,
                    direction,
                }
            }
        };

        if let Some(koq_id) = row.kind_of_quantity_id {
            self.read_kind_of_quantity(ctx, koq_id)?.ok_or_else(|| {
                CatalogError::missing(format!(
                    "kind of quantity {} of property '{}' in schema '{}'",
                    koq_id, row.name, schema.name
                ))
            })?;
        }
        if let Some(category_id) = row.category_id {
            self.read_property_category(ctx, category_id)?.ok_or_else(|| {
                CatalogError::missing(format!(
                    "property category {} of property '{}'",
                    category_id, row.name
                ))
            })?;
        }

        let custom_attributes = self.read_custom_attributes(ctx, row.id.0, ContainerType::Property)?;

        Ok(Property {
            id: row.id,
            class_id: row.class_id,
            name: row.name,
            display_label: row.display_label,
            description: row.description,
            is_readonly: row.is_readonly,
            priority: row.priority,
            kind,
            kind_of_quantity: row.kind_of_quantity_id,
            category: row.category_id,
            custom_attributes,
        })
    }

    fn read_relationship(&mut self, ctx: &mut LoadContext, row: &ClassRow) -> CatalogResult<RelationshipInfo> {
        let raw_strength = row.strength.ok_or_else(|| {
            CatalogError::malformed(format!("relationship '{}' has no strength", row.name))
        })?;
        let strength = StrengthType::from_i32(raw_strength)
            .ok_or_else(|| CatalogError::unsupported("relationship strength", raw_strength))?;
        let raw_direction = row.strength_direction.unwrap_or(Direction::Forward.as_i32());
        let strength_direction = Direction::from_i32(raw_direction)
            .ok_or_else(|| CatalogError::unsupported("strength direction", raw_direction))?;

        let mut source = None;
        let mut target = None;
        for constraint_row in self.store.relationship_constraint_rows(row.id)? {
            let end = ConstraintEnd::from_i32(constraint_row.end)
                .ok_or_else(|| CatalogError::unsupported("constraint end", constraint_row.end))?;
            let constraint = self.read_constraint(ctx, end, constraint_row)?;
            match end {
                ConstraintEnd::Source => source = Some(constraint),
                ConstraintEnd::Target => target = Some(constraint),
            }
        }
        let missing_end = |end: &str| {
            CatalogError::malformed(format!("relationship '{}' has no {} constraint", row.name, end))
        };
        Ok(RelationshipInfo {
            strength,
            strength_direction,
            source: source.ok_or_else(|| missing_end("source"))?,
            target: target.ok_or_else(|| missing_end("target"))?,
        })
    }

    fn read_constraint(
        &mut self,
        ctx: &mut LoadContext,
        end: ConstraintEnd,
        row: ConstraintRow,
    ) -> CatalogResult<RelationshipConstraint> {
        for &class_id in row.constraint_class_ids.iter().chain(&row.abstract_constraint_class_id) {
            if self.ensure_class(ctx, class_id)?.is_none() {
                return Err(CatalogError::missing(format!(
                    "constraint class {} of relationship {}",
                    class_id, row.relationship_class_id
                )));
            }
        }
        let container_type = match end {
            ConstraintEnd::Source => ContainerType::SourceRelationshipConstraint,
            ConstraintEnd::Target => ContainerType::TargetRelationshipConstraint,
        };
        let custom_attributes =
            self.read_custom_attributes(ctx, row.relationship_class_id.0, container_type)?;
        Ok(RelationshipConstraint {
            end,
            multiplicity: Multiplicity::new(row.multiplicity_lower, row.multiplicity_upper),
            polymorphic: row.is_polymorphic,
            role_label: row.role_label,
            abstract_constraint: row.abstract_constraint_class_id,
            constraint_classes: row.constraint_class_ids,
            custom_attributes,
        })
    }

    /// Parse the custom attribute instances attached to a container. Every
    /// instance class must be a custom attribute class.
    pub(crate) fn read_custom_attributes(
        &mut self,
        ctx: &mut LoadContext,
        container_id: u64,
        container_type: ContainerType,
    ) -> CatalogResult<Vec<CustomAttribute>> {
        let rows = self.store.custom_attribute_rows(container_id, container_type)?;
        let mut attributes = Vec::with_capacity(rows.len());
        for row in rows {
            let header = self.ensure_class(ctx, row.class_id)?.ok_or_else(|| {
                CatalogError::missing(format!(
                    "custom attribute class {} on {:?} {}",
                    row.class_id, container_type, container_id
                ))
            })?;
            if header.class_type != ClassType::CustomAttribute {
                return Err(CatalogError::malformed(format!(
                    "class {} attached to {:?} {} is not a custom attribute class",
                    row.class_id, container_type, container_id
                )));
            }
            attributes.push(CustomAttribute::parse(row.class_id, &row.instance)?);
        }
        Ok(attributes)
    }

    /// Id of `class_name` inside `schema`, remembered in the name index.
    pub fn find_class_id(&mut self, schema: &Schema, class_name: &str) -> CatalogResult<Option<ClassId>> {
        let key = ReaderCache::class_name_key(&schema.name, class_name);
        if let Some(found) = self.cache.class_names.get(&key) {
            return Ok(*found);
        }
        let found = self.store.class_id(schema.id, class_name)?;
        self.cache.class_names.insert(key, found);
        Ok(found)
    }

    /// True when `class_id` is `base_id` or inherits from it.
    pub fn derives_from(
        &mut self,
        ctx: &mut LoadContext,
        class_id: ClassId,
        base_id: ClassId,
    ) -> CatalogResult<bool> {
        let mut pending = vec![class_id];
        let mut visited = HashSet::new();
        while let Some(id) = pending.pop() {
            if id == base_id {
                return Ok(true);
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(class) = self.read_class(ctx, id)? {
                pending.extend(class.base_classes.iter().copied());
            }
        }
        Ok(false)
    }

    /// Direct subclasses of a class, loaded on first request.
    pub fn read_derived_classes(
        &mut self,
        ctx: &mut LoadContext,
        id: ClassId,
    ) -> CatalogResult<Option<Vec<Arc<Class>>>> {
        let Some(class) = self.read_class(ctx, id)? else {
            return Ok(None);
        };
        let derived_ids = match class.derived_class_ids() {
            Some(ids) => ids,
            None => {
                let ids = self.store.derived_class_ids(id)?;
                class.set_derived_class_ids(ids.clone());
                ids
            }
        };
        let mut derived = Vec::with_capacity(derived_ids.len());
        for derived_id in derived_ids {
            if let Some(derived_class) = self.read_class(ctx, derived_id)? {
                derived.push(derived_class);
            }
        }
        Ok(Some(derived))
    }
}
