//! Unit systems, phenomena, units and formats.
//!
//! The unit family is loaded as one batch and shared through `Arc`: units
//! point at their phenomenon and unit system, inverted units at the unit
//! they invert, composite formats at their units. Entities taken from the
//! legacy reference schemas have no persisted ids.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::format_string::QualifiedName;
use crate::{FormatId, PhenomenonId, SchemaId, UnitId, UnitSystemId};

/// Schema a unit-family entity belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerSchema {
    pub id: Option<SchemaId>,
    pub name: String,
    pub alias: String,
}

impl OwnerSchema {
    /// Qualifiers may use either the alias or the full schema name.
    pub fn matches(&self, qualifier: &str) -> bool {
        self.alias.eq_ignore_ascii_case(qualifier) || self.name.eq_ignore_ascii_case(qualifier)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnitSystem {
    pub id: Option<UnitSystemId>,
    pub schema: OwnerSchema,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Phenomenon {
    pub id: Option<PhenomenonId>,
    pub schema: OwnerSchema,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub definition: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UnitKind {
    Regular {
        phenomenon: Arc<Phenomenon>,
        unit_system: Arc<UnitSystem>,
        definition: String,
        numerator: f64,
        denominator: f64,
        offset: f64,
    },
    Constant {
        phenomenon: Arc<Phenomenon>,
        definition: String,
        numerator: f64,
        denominator: f64,
    },
    Inverted {
        unit_system: Arc<UnitSystem>,
        inverts: Arc<Unit>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub id: Option<UnitId>,
    pub schema: OwnerSchema,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub kind: UnitKind,
}

impl Unit {
    pub fn label(&self) -> &str {
        self.display_label.as_deref().unwrap_or(&self.name)
    }

    pub fn phenomenon(&self) -> &Arc<Phenomenon> {
        match &self.kind {
            UnitKind::Regular { phenomenon, .. } | UnitKind::Constant { phenomenon, .. } => {
                phenomenon
            }
            UnitKind::Inverted { inverts, .. } => inverts.phenomenon(),
        }
    }

    pub fn unit_system(&self) -> Option<&Arc<UnitSystem>> {
        match &self.kind {
            UnitKind::Regular { unit_system, .. } | UnitKind::Inverted { unit_system, .. } => {
                Some(unit_system)
            }
            UnitKind::Constant { .. } => None,
        }
    }

    pub fn is_inverted(&self) -> bool {
        matches!(self.kind, UnitKind::Inverted { .. })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, UnitKind::Constant { .. })
    }
}

/// Numeric part of a format, stored as a JSON document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NumericSpec {
    pub format_type: String,
    pub precision: Option<u32>,
    pub round_factor: f64,
    pub minimum_width: Option<u32>,
    pub show_sign_option: Option<String>,
    pub format_traits: Vec<String>,
    pub decimal_separator: Option<String>,
    pub thousand_separator: Option<String>,
    pub uom_separator: Option<String>,
}

impl Default for NumericSpec {
    fn default() -> Self {
        Self {
            format_type: "Decimal".to_string(),
            precision: Some(6),
            round_factor: 0.0,
            minimum_width: None,
            show_sign_option: None,
            format_traits: Vec::new(),
            decimal_separator: None,
            thousand_separator: None,
            uom_separator: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompositeUnit {
    pub unit: Arc<Unit>,
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompositeSpec {
    pub spacer: Option<String>,
    pub include_zero: bool,
    /// Major to minor, at most four.
    pub units: Vec<CompositeUnit>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Format {
    pub id: Option<FormatId>,
    pub schema: OwnerSchema,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub numeric_spec: NumericSpec,
    pub composite: Option<CompositeSpec>,
}

impl Format {
    pub fn label(&self) -> &str {
        self.display_label.as_deref().unwrap_or(&self.name)
    }
}

/// Common accessors used to index the unit family.
pub trait UnitFamilyItem {
    fn raw_id(&self) -> Option<u64>;
    fn owner(&self) -> &OwnerSchema;
    fn item_name(&self) -> &str;
}

macro_rules! unit_family_item {
    ($($ty:ty),*) => {
        $(impl UnitFamilyItem for $ty {
            fn raw_id(&self) -> Option<u64> {
                self.id.map(|id| id.0)
            }

            fn owner(&self) -> &OwnerSchema {
                &self.schema
            }

            fn item_name(&self) -> &str {
                &self.name
            }
        })*
    };
}

unit_family_item!(UnitSystem, Phenomenon, Unit, Format);

/// Items of one unit-family kind, indexed by id and by lowercase name.
#[derive(Debug)]
pub struct NamedItems<T> {
    items: Vec<Arc<T>>,
    by_id: HashMap<u64, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl<T> Default for NamedItems<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<T: UnitFamilyItem> NamedItems<T> {
    pub(crate) fn insert(&mut self, item: Arc<T>) {
        let index = self.items.len();
        if let Some(id) = item.raw_id() {
            self.by_id.insert(id, index);
        }
        self.by_name
            .entry(item.item_name().to_ascii_lowercase())
            .or_default()
            .push(index);
        self.items.push(item);
    }

    pub fn get(&self, id: u64) -> Option<&Arc<T>> {
        self.by_id.get(&id).map(|&index| &self.items[index])
    }

    /// Resolve `alias:Name`; a bare name matches the first item of any schema.
    pub fn find(&self, name: &QualifiedName) -> Option<&Arc<T>> {
        self.by_name
            .get(&name.name.to_ascii_lowercase())?
            .iter()
            .map(|&index| &self.items[index])
            .find(|item| {
                name.qualifier
                    .as_deref()
                    .map_or(true, |qualifier| item.owner().matches(qualifier))
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Persisted ids of the items owned by `schema_id`, in load order.
    pub fn ids_owned_by(&self, schema_id: SchemaId) -> Vec<u64> {
        self.items
            .iter()
            .filter(|item| item.owner().id == Some(schema_id))
            .filter_map(|item| item.raw_id())
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitSource {
    /// The store's own unit-family tables.
    Store,
    /// The out-of-band "Units" and "Formats" reference schemas.
    Legacy,
}

/// The whole unit family of a store, loaded at once.
#[derive(Debug)]
pub struct UnitCatalog {
    pub source: UnitSource,
    pub unit_systems: NamedItems<UnitSystem>,
    pub phenomena: NamedItems<Phenomenon>,
    pub units: NamedItems<Unit>,
    pub formats: NamedItems<Format>,
}

impl UnitCatalog {
    pub fn new(source: UnitSource) -> Self {
        Self {
            source,
            unit_systems: NamedItems::default(),
            phenomena: NamedItems::default(),
            units: NamedItems::default(),
            formats: NamedItems::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.unit_systems.is_empty()
            && self.phenomena.is_empty()
            && self.units.is_empty()
            && self.formats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerSchema {
        OwnerSchema {
            id: Some(SchemaId(1)),
            name: "Units".into(),
            alias: "u".into(),
        }
    }

    #[test]
    fn test_find_by_alias_or_schema_name() {
        let mut systems = NamedItems::default();
        systems.insert(Arc::new(UnitSystem {
            id: Some(UnitSystemId(5)),
            schema: owner(),
            name: "SI".into(),
            display_label: None,
            description: None,
        }));
        assert!(systems.find(&QualifiedName::new("u", "si")).is_some());
        assert!(systems.find(&QualifiedName::new("Units", "SI")).is_some());
        assert!(systems.find(&QualifiedName::new("f", "SI")).is_none());
        assert!(systems.find(&QualifiedName::parse("SI").unwrap()).is_some());
        assert_eq!(systems.get(5).map(|s| s.name.as_str()), Some("SI"));
        assert_eq!(systems.ids_owned_by(SchemaId(1)), vec![5]);
    }

    #[test]
    fn test_inverted_unit_reports_phenomenon_of_target() {
        let phenomenon = Arc::new(Phenomenon {
            id: None,
            schema: owner(),
            name: "SLOPE".into(),
            display_label: None,
            description: None,
            definition: "LENGTH*LENGTH(-1)".into(),
        });
        let system = Arc::new(UnitSystem {
            id: None,
            schema: owner(),
            name: "SI".into(),
            display_label: None,
            description: None,
        });
        let base = Arc::new(Unit {
            id: None,
            schema: owner(),
            name: "M_PER_M".into(),
            display_label: None,
            description: None,
            kind: UnitKind::Regular {
                phenomenon: phenomenon.clone(),
                unit_system: system.clone(),
                definition: "M*M(-1)".into(),
                numerator: 1.0,
                denominator: 1.0,
                offset: 0.0,
            },
        });
        let inverted = Unit {
            id: None,
            schema: owner(),
            name: "M_PER_M_INV".into(),
            display_label: None,
            description: None,
            kind: UnitKind::Inverted {
                unit_system: system,
                inverts: base,
            },
        };
        assert!(inverted.is_inverted());
        assert!(Arc::ptr_eq(inverted.phenomenon(), &phenomenon));
    }
}
