//! Merging supplemental schemas into their primary schema before import.
//!
//! A supplemental schema carries custom attributes for classes and
//! properties of another schema. Each supplemental attribute is copied onto
//! the same-named container of the primary unless the primary already holds
//! an attribute of that class. Supplementals are applied highest precedence
//! first, so the first one to provide an attribute wins.

use tracing::debug;

use crate::{CatalogError, CatalogResult, CustomAttributeDef, ItemRef, SchemaDef, SchemaKey};

/// Apply every supplemental of `schemas` to its primary schema when the
/// primary is part of the same batch.
///
/// Returns `true` when a primary gained references, in which case the
/// import order has to be rebuilt.
pub fn apply_supplementals(schemas: &mut [SchemaDef]) -> CatalogResult<bool> {
    let supplementals: Vec<SchemaDef> = schemas.iter().filter(|s| s.is_supplemental()).cloned().collect();
    if supplementals.is_empty() {
        return Ok(false);
    }

    let mut references_changed = false;
    for primary in schemas.iter_mut().filter(|s| !s.is_supplemental()) {
        let mut applicable: Vec<&SchemaDef> = supplementals
            .iter()
            .filter(|s| {
                s.supplemental
                    .as_ref()
                    .is_some_and(|info| info.primary_schema.eq_ignore_ascii_case(&primary.name))
            })
            .collect();
        applicable.sort_by_key(|s| {
            std::cmp::Reverse(s.supplemental.as_ref().map_or(0, |info| info.precedence))
        });
        for supplemental in applicable {
            debug!(primary = %primary.name, supplemental = %supplemental.name, "merging supplemental schema");
            references_changed |= merge(primary, supplemental)?;
        }
    }
    Ok(references_changed)
}

fn merge(primary: &mut SchemaDef, supplemental: &SchemaDef) -> CatalogResult<bool> {
    let mut added = Vec::new();

    let holder = primary.name.clone();
    merge_attributes(
        &holder,
        &mut primary.custom_attributes,
        supplemental,
        &supplemental.custom_attributes,
        &mut added,
    );

    for supplemental_class in &supplemental.classes {
        let Some(class) = primary
            .classes
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&supplemental_class.name))
        else {
            continue;
        };
        merge_attributes(
            &holder,
            &mut class.custom_attributes,
            supplemental,
            &supplemental_class.custom_attributes,
            &mut added,
        );
        for supplemental_property in &supplemental_class.properties {
            let Some(property) = class
                .properties
                .iter_mut()
                .find(|p| p.name.eq_ignore_ascii_case(&supplemental_property.name))
            else {
                continue;
            };
            merge_attributes(
                &holder,
                &mut property.custom_attributes,
                supplemental,
                &supplemental_property.custom_attributes,
                &mut added,
            );
        }
    }

    let mut changed = false;
    for schema_name in added {
        if schema_name.eq_ignore_ascii_case(&primary.name) || primary.references_schema(&schema_name) {
            continue;
        }
        let version = if supplemental.is_named(&schema_name) {
            supplemental.version
        } else {
            supplemental
                .references
                .iter()
                .find(|key| key.name.eq_ignore_ascii_case(&schema_name))
                .map(|key| key.version)
                .ok_or_else(|| {
                    CatalogError::missing(format!(
                        "supplemental schema '{}' uses custom attributes of unreferenced schema '{}'",
                        supplemental.name, schema_name
                    ))
                })?
        };
        primary.references.push(SchemaKey::new(schema_name, version));
        changed = true;
    }
    Ok(changed)
}

/// Copy `incoming` into `target`, qualifying class references that were
/// local to the supplemental. Records schemas the copies point into.
fn merge_attributes(
    holder: &str,
    target: &mut Vec<CustomAttributeDef>,
    supplemental: &SchemaDef,
    incoming: &[CustomAttributeDef],
    schemas_used: &mut Vec<String>,
) {
    for attribute in incoming {
        let schema = resolve_schema_name(supplemental, &attribute.class);
        let present = target.iter().any(|existing| {
            existing.class.name.eq_ignore_ascii_case(&attribute.class.name)
                && existing.class.schema_or(holder).eq_ignore_ascii_case(&schema)
        });
        if present {
            continue;
        }
        let mut copy = attribute.clone();
        copy.class = ItemRef::in_schema(schema.clone(), attribute.class.name.clone());
        target.push(copy);
        if !schemas_used.iter().any(|s| s.eq_ignore_ascii_case(&schema)) {
            schemas_used.push(schema);
        }
    }
}

/// Schema name behind a reference held by `holder`; aliases of the holder
/// and of its references are mapped back to names where known.
fn resolve_schema_name(holder: &SchemaDef, item: &ItemRef) -> String {
    match &item.schema {
        None => holder.name.clone(),
        Some(qualifier) if qualifier.eq_ignore_ascii_case(&holder.alias) => holder.name.clone(),
        Some(qualifier) => qualifier.clone(),
    }
}
