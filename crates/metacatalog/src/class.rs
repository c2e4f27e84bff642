//! Classes and relationship constraints.

use std::fmt;
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::{sync, ClassId, ContainerTypes, CustomAttribute, Property, PropertyId, SchemaId};

/// Persisted class type tag. Closed: an unknown tag is a hard failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassType {
    Entity,
    Relationship,
    Struct,
    CustomAttribute,
}

impl ClassType {
    pub fn as_i32(self) -> i32 {
        match self {
            ClassType::Entity => 0,
            ClassType::Relationship => 1,
            ClassType::Struct => 2,
            ClassType::CustomAttribute => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ClassType::Entity),
            1 => Some(ClassType::Relationship),
            2 => Some(ClassType::Struct),
            3 => Some(ClassType::CustomAttribute),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassModifier {
    #[default]
    None,
    Abstract,
    Sealed,
}

impl ClassModifier {
    pub fn as_i32(self) -> i32 {
        match self {
            ClassModifier::None => 0,
            ClassModifier::Abstract => 1,
            ClassModifier::Sealed => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ClassModifier::None),
            1 => Some(ClassModifier::Abstract),
            2 => Some(ClassModifier::Sealed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrengthType {
    #[default]
    Referencing,
    Holding,
    Embedding,
}

impl StrengthType {
    pub fn as_i32(self) -> i32 {
        match self {
            StrengthType::Referencing => 0,
            StrengthType::Holding => 1,
            StrengthType::Embedding => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(StrengthType::Referencing),
            1 => Some(StrengthType::Holding),
            2 => Some(StrengthType::Embedding),
            _ => None,
        }
    }
}

/// Direction used both for relationship strength and navigation properties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn as_i32(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Direction::Forward),
            2 => Some(Direction::Backward),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintEnd {
    Source,
    Target,
}

impl ConstraintEnd {
    pub fn as_i32(self) -> i32 {
        match self {
            ConstraintEnd::Source => 0,
            ConstraintEnd::Target => 1,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ConstraintEnd::Source),
            1 => Some(ConstraintEnd::Target),
            _ => None,
        }
    }
}

/// Relationship end multiplicity; `upper == None` means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Multiplicity {
    pub lower: u32,
    pub upper: Option<u32>,
}

impl Multiplicity {
    pub const ZERO_ONE: Self = Self {
        lower: 0,
        upper: Some(1),
    };
    pub const ZERO_MANY: Self = Self {
        lower: 0,
        upper: None,
    };
    pub const ONE_ONE: Self = Self {
        lower: 1,
        upper: Some(1),
    };
    pub const ONE_MANY: Self = Self {
        lower: 1,
        upper: None,
    };

    pub fn new(lower: u32, upper: Option<u32>) -> Self {
        Self { lower, upper }
    }

    pub fn is_single(&self) -> bool {
        self.upper == Some(1)
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            Some(upper) => write!(f, "({}..{})", self.lower, upper),
            None => write!(f, "({}..*)", self.lower),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationshipConstraint {
    pub end: ConstraintEnd,
    pub multiplicity: Multiplicity,
    pub polymorphic: bool,
    pub role_label: Option<String>,
    pub abstract_constraint: Option<ClassId>,
    pub constraint_classes: Vec<ClassId>,
    pub custom_attributes: Vec<CustomAttribute>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationshipInfo {
    pub strength: StrengthType,
    pub strength_direction: Direction,
    pub source: RelationshipConstraint,
    pub target: RelationshipConstraint,
}

impl RelationshipInfo {
    pub fn constraint(&self, end: ConstraintEnd) -> &RelationshipConstraint {
        match end {
            ConstraintEnd::Source => &self.source,
            ConstraintEnd::Target => &self.target,
        }
    }
}

/// Kind specific payload of a class.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassKind {
    Entity,
    Struct,
    CustomAttribute { applies_to: ContainerTypes },
    Relationship(Box<RelationshipInfo>),
}

impl ClassKind {
    pub fn class_type(&self) -> ClassType {
        match self {
            ClassKind::Entity => ClassType::Entity,
            ClassKind::Struct => ClassType::Struct,
            ClassKind::CustomAttribute { .. } => ClassType::CustomAttribute,
            ClassKind::Relationship(_) => ClassType::Relationship,
        }
    }
}

/// A class materialized from the store.
#[derive(Debug)]
pub struct Class {
    pub id: ClassId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub modifier: ClassModifier,
    pub kind: ClassKind,
    pub base_classes: Vec<ClassId>,
    pub properties: Vec<Property>,
    pub custom_attributes: Vec<CustomAttribute>,
    derived_classes: RwLock<Option<Vec<ClassId>>>,
    mixin_applies_to: OnceLock<ClassId>,
}

impl Class {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ClassId,
        schema_id: SchemaId,
        name: String,
        display_label: Option<String>,
        description: Option<String>,
        modifier: ClassModifier,
        kind: ClassKind,
        base_classes: Vec<ClassId>,
        properties: Vec<Property>,
        custom_attributes: Vec<CustomAttribute>,
    ) -> Self {
        Self {
            id,
            schema_id,
            name,
            display_label,
            description,
            modifier,
            kind,
            base_classes,
            properties,
            custom_attributes,
            derived_classes: RwLock::new(None),
            mixin_applies_to: OnceLock::new(),
        }
    }

    pub fn class_type(&self) -> ClassType {
        self.kind.class_type()
    }

    pub fn label(&self) -> &str {
        self.display_label.as_deref().unwrap_or(&self.name)
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, ClassKind::Entity)
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, ClassKind::Struct)
    }

    pub fn is_custom_attribute(&self) -> bool {
        matches!(self.kind, ClassKind::CustomAttribute { .. })
    }

    pub fn relationship(&self) -> Option<&RelationshipInfo> {
        match &self.kind {
            ClassKind::Relationship(info) => Some(info),
            _ => None,
        }
    }

    /// Property declared directly on this class (base classes not searched).
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn property_by_id(&self, id: PropertyId) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Entity class a mixin may be applied to, once resolved.
    pub fn mixin_applies_to(&self) -> Option<ClassId> {
        self.mixin_applies_to.get().copied()
    }

    pub fn is_mixin(&self) -> bool {
        self.mixin_applies_to.get().is_some()
    }

    pub(crate) fn set_mixin_applies_to(&self, class_id: ClassId) {
        let _ = self.mixin_applies_to.set(class_id);
    }

    /// Derived class ids if they have been loaded.
    pub fn derived_class_ids(&self) -> Option<Vec<ClassId>> {
        sync::read(&self.derived_classes).clone()
    }

    pub(crate) fn set_derived_class_ids(&self, ids: Vec<ClassId>) {
        *sync::write(&self.derived_classes) = Some(ids);
    }
}
