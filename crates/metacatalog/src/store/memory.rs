//! In-memory row store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use super::*;
use crate::CatalogError;

/// Shared count of queries answered by a [`MemoryStore`].
///
/// Clones observe the same counter, so a test can keep one after handing the
/// store to a `SchemaManager`.
#[derive(Clone, Debug, Default)]
pub struct QueryCounter(Arc<AtomicUsize>);

impl QueryCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hash map backed implementation of [`CatalogStore`] and [`CatalogWriter`].
///
/// Multi-row results come back in insertion order, which lets tests control
/// the row order a reader observes.
#[derive(Debug)]
pub struct MemoryStore {
    identity: StoreIdentity,
    readonly: bool,
    unit_tables: bool,
    next_id: u64,
    counter: QueryCounter,
    views_generated: usize,
    schemas: IndexMap<SchemaId, SchemaRow>,
    references: HashMap<SchemaId, Vec<SchemaId>>,
    classes: IndexMap<ClassId, ClassRow>,
    base_classes: HashMap<ClassId, Vec<ClassId>>,
    properties: HashMap<ClassId, Vec<PropertyRow>>,
    constraints: HashMap<ClassId, Vec<ConstraintRow>>,
    custom_attributes: Vec<CustomAttributeRow>,
    enumerations: IndexMap<EnumerationId, EnumerationRow>,
    kinds_of_quantity: IndexMap<KindOfQuantityId, KindOfQuantityRow>,
    property_categories: IndexMap<PropertyCategoryId, PropertyCategoryRow>,
    unit_systems: Vec<UnitSystemRow>,
    phenomena: Vec<PhenomenonRow>,
    units: Vec<UnitRow>,
    formats: Vec<FormatRow>,
    format_composite_units: Vec<FormatCompositeUnitRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            identity: StoreIdentity::new("memory"),
            readonly: false,
            unit_tables: true,
            next_id: 1,
            counter: QueryCounter::default(),
            views_generated: 0,
            schemas: IndexMap::new(),
            references: HashMap::new(),
            classes: IndexMap::new(),
            base_classes: HashMap::new(),
            properties: HashMap::new(),
            constraints: HashMap::new(),
            custom_attributes: Vec::new(),
            enumerations: IndexMap::new(),
            kinds_of_quantity: IndexMap::new(),
            property_categories: IndexMap::new(),
            unit_systems: Vec::new(),
            phenomena: Vec::new(),
            units: Vec::new(),
            formats: Vec::new(),
            format_composite_units: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: StoreIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    /// Simulate a file created before the unit-family tables existed.
    pub fn set_unit_tables(&mut self, present: bool) {
        self.unit_tables = present;
    }

    pub fn query_counter(&self) -> QueryCounter {
        self.counter.clone()
    }

    pub fn views_generated(&self) -> usize {
        self.views_generated
    }

    fn query(&self) {
        self.counter.bump();
    }

    fn observe_id(&mut self, id: u64) {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    fn find_in_schema<K: Copy, R>(
        rows: &IndexMap<K, R>,
        schema_id: SchemaId,
        name: &str,
        key: impl Fn(&R) -> (SchemaId, &str),
    ) -> Option<K> {
        rows.iter()
            .find(|(_, row)| {
                let (owner, row_name) = key(row);
                owner == schema_id && row_name.eq_ignore_ascii_case(name)
            })
            .map(|(id, _)| *id)
    }

    fn ids_in_schema<K: Copy, R>(
        rows: &IndexMap<K, R>,
        schema_id: SchemaId,
        owner: impl Fn(&R) -> SchemaId,
    ) -> Vec<K> {
        rows.iter()
            .filter(|(_, row)| owner(row) == schema_id)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogStore for MemoryStore {
    fn schema_row(&self, id: SchemaId) -> CatalogResult<Option<SchemaRow>> {
        self.query();
        Ok(self.schemas.get(&id).cloned())
    }

    fn schema_id(&self, name: &str, mode: SchemaLookupMode) -> CatalogResult<Option<SchemaId>> {
        self.query();
        let by_name = || {
            self.schemas
                .values()
                .find(|s| s.name.eq_ignore_ascii_case(name))
                .map(|s| s.id)
        };
        let by_alias = || {
            self.schemas
                .values()
                .find(|s| s.alias.eq_ignore_ascii_case(name))
                .map(|s| s.id)
        };
        Ok(match mode {
            SchemaLookupMode::ByName => by_name(),
            SchemaLookupMode::ByAlias => by_alias(),
            SchemaLookupMode::AutoDetect => by_name().or_else(by_alias),
        })
    }

    fn schema_ids(&self) -> CatalogResult<Vec<SchemaId>> {
        self.query();
        Ok(self.schemas.keys().copied().collect())
    }

    fn schema_reference_ids(&self, id: SchemaId) -> CatalogResult<Vec<SchemaId>> {
        self.query();
        Ok(self.references.get(&id).cloned().unwrap_or_default())
    }

    fn schema_child_count(&self, id: SchemaId) -> CatalogResult<u64> {
        self.query();
        let count = self.classes.values().filter(|r| r.schema_id == id).count()
            + self.enumerations.values().filter(|r| r.schema_id == id).count()
            + self.kinds_of_quantity.values().filter(|r| r.schema_id == id).count()
            + self.property_categories.values().filter(|r| r.schema_id == id).count()
            + self.unit_systems.iter().filter(|r| r.schema_id == id).count()
            + self.phenomena.iter().filter(|r| r.schema_id == id).count()
            + self.units.iter().filter(|r| r.schema_id == id).count()
            + self.formats.iter().filter(|r| r.schema_id == id).count();
        Ok(count as u64)
    }

    fn schema_has_units(&self, id: SchemaId) -> CatalogResult<bool> {
        self.query();
        Ok(self.unit_systems.iter().any(|r| r.schema_id == id)
            || self.phenomena.iter().any(|r| r.schema_id == id)
            || self.units.iter().any(|r| r.schema_id == id)
            || self.formats.iter().any(|r| r.schema_id == id))
    }

    fn class_row(&self, id: ClassId) -> CatalogResult<Option<ClassRow>> {
        self.query();
        Ok(self.classes.get(&id).cloned())
    }

    fn class_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<ClassId>> {
        self.query();
        Ok(Self::find_in_schema(&self.classes, schema_id, name, |r| {
            (r.schema_id, r.name.as_str())
        }))
    }

    fn class_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<ClassId>> {
        self.query();
        Ok(Self::ids_in_schema(&self.classes, schema_id, |r| r.schema_id))
    }

    fn base_class_ids(&self, id: ClassId) -> CatalogResult<Vec<ClassId>> {
        self.query();
        Ok(self.base_classes.get(&id).cloned().unwrap_or_default())
    }

    fn derived_class_ids(&self, id: ClassId) -> CatalogResult<Vec<ClassId>> {
        self.query();
        Ok(self
            .classes
            .keys()
            .filter(|derived| {
                self.base_classes
                    .get(derived)
                    .map_or(false, |bases| bases.contains(&id))
            })
            .copied()
            .collect())
    }

    fn property_rows(&self, class_id: ClassId) -> CatalogResult<Vec<PropertyRow>> {
        self.query();
        let mut rows = self.properties.get(&class_id).cloned().unwrap_or_default();
        rows.sort_by_key(|r| r.ordinal);
        Ok(rows)
    }

    fn relationship_constraint_rows(&self, class_id: ClassId) -> CatalogResult<Vec<ConstraintRow>> {
        self.query();
        Ok(self.constraints.get(&class_id).cloned().unwrap_or_default())
    }

    fn custom_attribute_rows(
        &self,
        container_id: u64,
        container_type: ContainerType,
    ) -> CatalogResult<Vec<CustomAttributeRow>> {
        self.query();
        let mut rows: Vec<CustomAttributeRow> = self
            .custom_attributes
            .iter()
            .filter(|r| {
                r.container_id == container_id && r.container_type == container_type.as_i32()
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.ordinal);
        Ok(rows)
    }

    fn enumeration_row(&self, id: EnumerationId) -> CatalogResult<Option<EnumerationRow>> {
        self.query();
        Ok(self.enumerations.get(&id).cloned())
    }

    fn enumeration_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<EnumerationId>> {
        self.query();
        Ok(Self::find_in_schema(&self.enumerations, schema_id, name, |r| {
            (r.schema_id, r.name.as_str())
        }))
    }

    fn enumeration_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<EnumerationId>> {
        self.query();
        Ok(Self::ids_in_schema(&self.enumerations, schema_id, |r| r.schema_id))
    }

    fn kind_of_quantity_row(
        &self,
        id: KindOfQuantityId,
    ) -> CatalogResult<Option<KindOfQuantityRow>> {
        self.query();
        Ok(self.kinds_of_quantity.get(&id).cloned())
    }

    fn kind_of_quantity_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<KindOfQuantityId>> {
        self.query();
        Ok(Self::find_in_schema(&self.kinds_of_quantity, schema_id, name, |r| {
            (r.schema_id, r.name.as_str())
        }))
    }

    fn kind_of_quantity_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<KindOfQuantityId>> {
        self.query();
        Ok(Self::ids_in_schema(&self.kinds_of_quantity, schema_id, |r| r.schema_id))
    }

    fn property_category_row(
        &self,
        id: PropertyCategoryId,
    ) -> CatalogResult<Option<PropertyCategoryRow>> {
        self.query();
        Ok(self.property_categories.get(&id).cloned())
    }

    fn property_category_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<PropertyCategoryId>> {
        self.query();
        Ok(Self::find_in_schema(&self.property_categories, schema_id, name, |r| {
            (r.schema_id, r.name.as_str())
        }))
    }

    fn property_category_ids(
        &self,
        schema_id: SchemaId,
    ) -> CatalogResult<Vec<PropertyCategoryId>> {
        self.query();
        Ok(Self::ids_in_schema(&self.property_categories, schema_id, |r| r.schema_id))
    }

    fn unit_system_rows(&self) -> CatalogResult<Vec<UnitSystemRow>> {
        self.query();
        Ok(self.unit_systems.clone())
    }

    fn phenomenon_rows(&self) -> CatalogResult<Vec<PhenomenonRow>> {
        self.query();
        Ok(self.phenomena.clone())
    }

    fn unit_rows(&self) -> CatalogResult<Vec<UnitRow>> {
        self.query();
        Ok(self.units.clone())
    }

    fn format_rows(&self) -> CatalogResult<Vec<FormatRow>> {
        self.query();
        Ok(self.formats.clone())
    }

    fn format_composite_unit_rows(
        &self,
        format_id: FormatId,
    ) -> CatalogResult<Vec<FormatCompositeUnitRow>> {
        self.query();
        let mut rows: Vec<FormatCompositeUnitRow> = self
            .format_composite_units
            .iter()
            .filter(|r| r.format_id == format_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.ordinal);
        Ok(rows)
    }

    fn unit_system_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<UnitSystemId>> {
        self.query();
        Ok(self
            .unit_systems
            .iter()
            .find(|r| r.schema_id == schema_id && r.name.eq_ignore_ascii_case(name))
            .map(|r| r.id))
    }

    fn phenomenon_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<PhenomenonId>> {
        self.query();
        Ok(self
            .phenomena
            .iter()
            .find(|r| r.schema_id == schema_id && r.name.eq_ignore_ascii_case(name))
            .map(|r| r.id))
    }

    fn unit_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<UnitId>> {
        self.query();
        Ok(self
            .units
            .iter()
            .find(|r| r.schema_id == schema_id && r.name.eq_ignore_ascii_case(name))
            .map(|r| r.id))
    }

    fn format_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<FormatId>> {
        self.query();
        Ok(self
            .formats
            .iter()
            .find(|r| r.schema_id == schema_id && r.name.eq_ignore_ascii_case(name))
            .map(|r| r.id))
    }

    fn has_unit_tables(&self) -> CatalogResult<bool> {
        self.query();
        Ok(self.unit_tables)
    }

    fn any_kind_of_quantity(&self) -> CatalogResult<bool> {
        self.query();
        Ok(!self.kinds_of_quantity.is_empty())
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn identity(&self) -> StoreIdentity {
        self.identity.clone()
    }
}

impl CatalogWriter for MemoryStore {
    fn allocate_id(&mut self) -> CatalogResult<u64> {
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }

    fn insert_schema(&mut self, rows: SchemaRows) -> CatalogResult<()> {
        if self.readonly {
            return Err(CatalogError::policy("store is read-only"));
        }
        let schema_id = rows.schema.id;
        if self.schemas.contains_key(&schema_id) {
            return Err(CatalogError::storage(format!(
                "schema id {} already exists",
                schema_id
            )));
        }

        self.observe_id(schema_id.0);
        self.references.insert(schema_id, rows.references);
        self.schemas.insert(schema_id, rows.schema);

        for row in rows.classes {
            self.observe_id(row.id.0);
            self.classes.insert(row.id, row);
        }
        for (class_id, bases) in rows.base_classes {
            self.base_classes.insert(class_id, bases);
        }
        for row in rows.properties {
            self.observe_id(row.id.0);
            self.properties.entry(row.class_id).or_default().push(row);
        }
        for row in rows.constraints {
            self.constraints
                .entry(row.relationship_class_id)
                .or_default()
                .push(row);
        }
        self.custom_attributes.extend(rows.custom_attributes);
        for row in rows.enumerations {
            self.observe_id(row.id.0);
            self.enumerations.insert(row.id, row);
        }
        for row in rows.kinds_of_quantity {
            self.observe_id(row.id.0);
            self.kinds_of_quantity.insert(row.id, row);
        }
        for row in rows.property_categories {
            self.observe_id(row.id.0);
            self.property_categories.insert(row.id, row);
        }
        for row in rows.unit_systems {
            self.observe_id(row.id.0);
            self.unit_systems.push(row);
        }
        for row in rows.phenomena {
            self.observe_id(row.id.0);
            self.phenomena.push(row);
        }
        for row in rows.units {
            self.observe_id(row.id.0);
            self.units.push(row);
        }
        for row in rows.formats {
            self.observe_id(row.id.0);
            self.formats.push(row);
        }
        self.format_composite_units
            .extend(rows.format_composite_units);
        Ok(())
    }

    fn regenerate_views(&mut self) -> CatalogResult<()> {
        self.views_generated += 1;
        Ok(())
    }
}
