//! Work deferred until the entities a public call touched are all built.
//!
//! Some checks need entities that may be loaded later in the same call: a
//! navigation property can be read before its relationship class, a mixin
//! names an entity class by string, schema custom attributes may use classes
//! of the schema itself. Readers record such work in a [`LoadContext`];
//! [`LoadContext::postprocess`] drains it in rounds until nothing is left.

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{debug, error};

use crate::format_string::QualifiedName;
use crate::{
    CatalogError, CatalogResult, CatalogStore, Class, ClassId, ContainerType, Direction,
    PropertyId, PropertyKind, RelationshipConstraint, SchemaId, SchemaReader,
};

/// Schema that defines the mixin marker custom attribute.
pub const CORE_CUSTOM_ATTRIBUTES_SCHEMA: &str = "CoreCustomAttributes";
/// Custom attribute class marking an entity class as a mixin.
pub const IS_MIXIN_CLASS: &str = "IsMixin";
/// Property of the mixin marker holding the target entity class.
pub const APPLIES_TO_ENTITY_CLASS: &str = "AppliesToEntityClass";

#[derive(Debug, Default)]
pub struct LoadContext {
    /// `(declaring class, property)`
    pub(crate) navigation_properties: Vec<(ClassId, PropertyId)>,
    pub(crate) relationships: Vec<ClassId>,
    /// Entity classes carrying custom attributes.
    pub(crate) mixin_candidates: Vec<ClassId>,
    /// Schemas whose own custom attributes are not attached yet.
    pub(crate) schema_custom_attributes: IndexSet<SchemaId>,
    /// Schemas whose elements are being loaded further up the stack.
    pub(crate) loading_schemas: HashSet<SchemaId>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// No deferred work left.
    pub fn is_empty(&self) -> bool {
        self.navigation_properties.is_empty()
            && self.relationships.is_empty()
            && self.mixin_candidates.is_empty()
            && self.schema_custom_attributes.is_empty()
    }

    /// Run every deferred check. Work recorded while doing so is drained in
    /// further rounds. A failing check marks its class failed; the rest of
    /// the queue still runs and the first failure is returned at the end.
    pub fn postprocess<S: CatalogStore>(&mut self, reader: &mut SchemaReader<S>) -> CatalogResult<()> {
        let mut first_error = None;
        let mut keep = |result: CatalogResult<()>| {
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        };
        let mut round = 0;
        while !self.is_empty() {
            round += 1;
            let navigation = mem::take(&mut self.navigation_properties);
            let relationships = mem::take(&mut self.relationships);
            let mixins = mem::take(&mut self.mixin_candidates);
            let schemas = mem::take(&mut self.schema_custom_attributes);
            debug!(
                round,
                navigation = navigation.len(),
                relationships = relationships.len(),
                mixins = mixins.len(),
                schemas = schemas.len(),
                "postprocessing"
            );

            for (class_id, property_id) in navigation {
                keep(verify_navigation_property(reader, self, class_id, property_id));
            }
            for class_id in relationships {
                keep(verify_relationship(reader, self, class_id));
            }
            for class_id in mixins {
                keep(resolve_mixin(reader, self, class_id));
            }
            for schema_id in schemas {
                keep(attach_schema_custom_attributes(reader, schema_id));
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn fail_class<S: CatalogStore>(
    reader: &mut SchemaReader<S>,
    class: &Class,
    err: CatalogError,
) -> CatalogError {
    reader.cache.classes.fail(class.id);
    if let Some(schema) = reader.cache.schemas.loaded(class.schema_id) {
        schema.update_contents(|contents| {
            contents.classes.shift_remove(&class.id);
        });
    }
    error!(class = %class.name, id = %class.id, error = %err, "class failed validation");
    err
}

fn verify_navigation_property<S: CatalogStore>(
    reader: &mut SchemaReader<S>,
    ctx: &mut LoadContext,
    class_id: ClassId,
    property_id: PropertyId,
) -> CatalogResult<()> {
    let Some(class) = reader.cache.classes.loaded(class_id) else {
        return Ok(());
    };
    let Some(property) = class.property_by_id(property_id) else {
        return Ok(());
    };
    let PropertyKind::Navigation {
        relationship,
        direction,
    } = property.kind
    else {
        return Ok(());
    };
    match check_navigation(reader, ctx, &class, &property.name, relationship, direction) {
        Ok(()) => Ok(()),
        Err(err) => Err(fail_class(reader, &class, err)),
    }
}

fn check_navigation<S: CatalogStore>(
    reader: &mut SchemaReader<S>,
    ctx: &mut LoadContext,
    class: &Class,
    property_name: &str,
    relationship_id: ClassId,
    direction: Direction,
) -> CatalogResult<()> {
    let relationship = reader.read_class(ctx, relationship_id)?.ok_or_else(|| {
        CatalogError::missing(format!(
            "relationship {} of navigation property '{}.{}'",
            relationship_id, class.name, property_name
        ))
    })?;
    let info = relationship.relationship().ok_or_else(|| {
        CatalogError::malformed(format!(
            "'{}' used by navigation property '{}.{}' is not a relationship class",
            relationship.name, class.name, property_name
        ))
    })?;
    let (from, to) = match direction {
        Direction::Forward => (&info.source, &info.target),
        Direction::Backward => (&info.target, &info.source),
    };
    if !supports(reader, ctx, from, class.id)? {
        return Err(CatalogError::malformed(format!(
            "class '{}' is not supported by the {:?} end of '{}' used by '{}'",
            class.name, from.end, relationship.name, property_name
        )));
    }
    if to.multiplicity.upper != Some(1) {
        return Err(CatalogError::malformed(format!(
            "navigation property '{}.{}' points to an end with multiplicity {}",
            class.name, property_name, to.multiplicity
        )));
    }
    Ok(())
}

/// Is `class_id` accepted by a relationship end.
fn supports<S: CatalogStore>(
    reader: &mut SchemaReader<S>,
    ctx: &mut LoadContext,
    constraint: &RelationshipConstraint,
    class_id: ClassId,
) -> CatalogResult<bool> {
    for &candidate in &constraint.constraint_classes {
        if candidate == class_id {
            return Ok(true);
        }
        if constraint.polymorphic && reader.derives_from(ctx, class_id, candidate)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn verify_relationship<S: CatalogStore>(
    reader: &mut SchemaReader<S>,
    ctx: &mut LoadContext,
    class_id: ClassId,
) -> CatalogResult<()> {
    if reader.cache.verified_relationships.contains(&class_id) {
        return Ok(());
    }
    let Some(class) = reader.cache.classes.loaded(class_id) else {
        return Ok(());
    };
    match check_relationship(reader, ctx, &class) {
        Ok(()) => {
            reader.cache.verified_relationships.insert(class_id);
            Ok(())
        }
        Err(err) => Err(fail_class(reader, &class, err)),
    }
}

fn check_relationship<S: CatalogStore>(
    reader: &mut SchemaReader<S>,
    ctx: &mut LoadContext,
    class: &Class,
) -> CatalogResult<()> {
    let Some(info) = class.relationship() else {
        return Ok(());
    };
    for constraint in [&info.source, &info.target] {
        if constraint.constraint_classes.is_empty() {
            return Err(CatalogError::malformed(format!(
                "{:?} end of relationship '{}' has no constraint classes",
                constraint.end, class.name
            )));
        }
        let Some(abstract_constraint) = constraint.abstract_constraint else {
            continue;
        };
        for &constraint_class in &constraint.constraint_classes {
            if !reader.derives_from(ctx, constraint_class, abstract_constraint)? {
                return Err(CatalogError::malformed(format!(
                    "constraint class {} of relationship '{}' does not derive from its abstract constraint {}",
                    constraint_class, class.name, abstract_constraint
                )));
            }
        }
    }
    Ok(())
}

fn resolve_mixin<S: CatalogStore>(
    reader: &mut SchemaReader<S>,
    ctx: &mut LoadContext,
    class_id: ClassId,
) -> CatalogResult<()> {
    let Some(class) = reader.cache.classes.loaded(class_id) else {
        return Ok(());
    };
    if class.is_mixin() {
        return Ok(());
    }
    match find_mixin_target(reader, ctx, &class) {
        Ok(Some(target)) => {
            class.set_mixin_applies_to(target);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => Err(fail_class(reader, &class, err)),
    }
}

fn find_mixin_target<S: CatalogStore>(
    reader: &mut SchemaReader<S>,
    ctx: &mut LoadContext,
    class: &Arc<Class>,
) -> CatalogResult<Option<ClassId>> {
    let mut applies_to = None;
    for attribute in &class.custom_attributes {
        let Some(attribute_class) = reader.read_class(ctx, attribute.class_id)? else {
            continue;
        };
        if !attribute_class.name.eq_ignore_ascii_case(IS_MIXIN_CLASS) {
            continue;
        }
        let in_core_schema = reader
            .cache
            .schemas
            .loaded(attribute_class.schema_id)
            .is_some_and(|schema| schema.is_named(CORE_CUSTOM_ATTRIBUTES_SCHEMA));
        if !in_core_schema {
            continue;
        }
        let text = attribute.get_str(APPLIES_TO_ENTITY_CLASS).ok_or_else(|| {
            CatalogError::malformed(format!(
                "mixin '{}' has no {} value",
                class.name, APPLIES_TO_ENTITY_CLASS
            ))
        })?;
        applies_to = Some(text.to_string());
        break;
    }
    let Some(text) = applies_to else {
        return Ok(None);
    };

    let name = QualifiedName::parse(&text)?;
    let mixin_schema = reader.read_schema_stub(ctx, class.schema_id)?.ok_or_else(|| {
        CatalogError::missing(format!("schema {} of mixin '{}'", class.schema_id, class.name))
    })?;
    let target_schema = match &name.qualifier {
        None => mixin_schema,
        Some(qualifier) => {
            let mut found = None;
            let candidates = std::iter::once(mixin_schema.id).chain(mixin_schema.references.iter().copied());
            for schema_id in candidates {
                if let Some(schema) = reader.read_schema_stub(ctx, schema_id)? {
                    if schema.alias.eq_ignore_ascii_case(qualifier) || schema.is_named(qualifier) {
                        found = Some(schema);
                        break;
                    }
                }
            }
            found.ok_or_else(|| {
                CatalogError::missing(format!(
                    "schema '{}' named by mixin '{}' is not referenced",
                    qualifier, class.name
                ))
            })?
        }
    };

    let target_id = reader.find_class_id(&target_schema, &name.name)?;
    let target = match target_id {
        Some(id) => reader.read_class(ctx, id)?,
        None => None,
    };
    let target = target.ok_or_else(|| {
        CatalogError::missing(format!("class '{}' named by mixin '{}'", text, class.name))
    })?;
    if !target.is_entity() {
        return Err(CatalogError::malformed(format!(
            "mixin '{}' applies to '{}', which is not an entity class",
            class.name, target.name
        )));
    }
    Ok(Some(target.id))
}

/// Parse and attach a schema's own custom attributes in a nested context.
fn attach_schema_custom_attributes<S: CatalogStore>(
    reader: &mut SchemaReader<S>,
    schema_id: SchemaId,
) -> CatalogResult<()> {
    let Some(schema) = reader.cache.schemas.loaded(schema_id) else {
        return Ok(());
    };
    if schema.custom_attributes_loaded() {
        return Ok(());
    }
    let mut nested = LoadContext::new();
    let attributes = reader
        .read_custom_attributes(&mut nested, schema_id.0, ContainerType::Schema)
        .map_err(|err| {
            error!(schema = %schema.name, error = %err, "failed to read schema custom attributes");
            err
        })?;
    schema.update_contents(|contents| contents.custom_attributes = Some(attributes));
    nested.postprocess(reader)
}
