//! Custom attribute instances and container types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CatalogError, CatalogResult, ClassId};

/// Generalized kind of object a custom attribute instance is attached to.
///
/// Persisted as the integer tag of the container type column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerType {
    Schema,
    Class,
    Property,
    SourceRelationshipConstraint,
    TargetRelationshipConstraint,
}

impl ContainerType {
    pub fn as_i32(self) -> i32 {
        match self {
            ContainerType::Schema => 1,
            ContainerType::Class => 30,
            ContainerType::Property => 992,
            ContainerType::SourceRelationshipConstraint => 1024,
            ContainerType::TargetRelationshipConstraint => 2048,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(ContainerType::Schema),
            30 => Some(ContainerType::Class),
            992 => Some(ContainerType::Property),
            1024 => Some(ContainerType::SourceRelationshipConstraint),
            2048 => Some(ContainerType::TargetRelationshipConstraint),
            _ => None,
        }
    }
}

/// Bit set of container kinds a custom attribute class may be applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerTypes(pub u32);

impl ContainerTypes {
    pub const SCHEMA: Self = Self(1);
    pub const ENTITY_CLASS: Self = Self(2);
    pub const CUSTOM_ATTRIBUTE_CLASS: Self = Self(4);
    pub const STRUCT_CLASS: Self = Self(8);
    pub const RELATIONSHIP_CLASS: Self = Self(16);
    pub const ANY_CLASS: Self = Self(30);
    pub const ANY_PROPERTY: Self = Self(992);
    pub const ANY_RELATIONSHIP_CONSTRAINT: Self = Self(3072);
    pub const ANY: Self = Self(4095);

    pub fn contains(self, other: ContainerTypes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ContainerTypes {
    fn default() -> Self {
        Self::ANY
    }
}

/// A custom attribute instance: the custom attribute class plus its
/// property values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomAttribute {
    pub class_id: ClassId,
    pub values: Map<String, Value>,
}

impl CustomAttribute {
    /// Parse a serialized instance. The payload must be a JSON object.
    pub fn parse(class_id: ClassId, payload: &str) -> CatalogResult<Self> {
        match serde_json::from_str::<Value>(payload)? {
            Value::Object(values) => Ok(Self { class_id, values }),
            other => Err(CatalogError::malformed(format!(
                "custom attribute instance of class {} is not an object: {}",
                class_id, other
            ))),
        }
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, property: &str) -> Option<&str> {
        self.get(property).and_then(Value::as_str)
    }
}
