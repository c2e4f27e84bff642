//! Properties owned by classes.

use serde::{Deserialize, Serialize};

use crate::{
    ClassId, CustomAttribute, Direction, EnumerationId, KindOfQuantityId, PropertyCategoryId,
    PropertyId,
};

/// Persisted property kind tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKindTag {
    Primitive,
    Struct,
    PrimitiveArray,
    StructArray,
    Navigation,
}

impl PropertyKindTag {
    pub fn as_i32(self) -> i32 {
        match self {
            PropertyKindTag::Primitive => 0,
            PropertyKindTag::Struct => 1,
            PropertyKindTag::PrimitiveArray => 2,
            PropertyKindTag::StructArray => 3,
            PropertyKindTag::Navigation => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(PropertyKindTag::Primitive),
            1 => Some(PropertyKindTag::Struct),
            2 => Some(PropertyKindTag::PrimitiveArray),
            3 => Some(PropertyKindTag::StructArray),
            4 => Some(PropertyKindTag::Navigation),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Binary,
    Boolean,
    DateTime,
    Double,
    Integer,
    Long,
    Point2d,
    Point3d,
    String,
    Geometry,
}

impl PrimitiveType {
    pub fn as_i32(self) -> i32 {
        match self {
            PrimitiveType::Binary => 0x101,
            PrimitiveType::Boolean => 0x201,
            PrimitiveType::DateTime => 0x301,
            PrimitiveType::Double => 0x401,
            PrimitiveType::Integer => 0x501,
            PrimitiveType::Long => 0x601,
            PrimitiveType::Point2d => 0x701,
            PrimitiveType::Point3d => 0x801,
            PrimitiveType::String => 0x901,
            PrimitiveType::Geometry => 0xa01,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0x101 => Some(PrimitiveType::Binary),
            0x201 => Some(PrimitiveType::Boolean),
            0x301 => Some(PrimitiveType::DateTime),
            0x401 => Some(PrimitiveType::Double),
            0x501 => Some(PrimitiveType::Integer),
            0x601 => Some(PrimitiveType::Long),
            0x701 => Some(PrimitiveType::Point2d),
            0x801 => Some(PrimitiveType::Point3d),
            0x901 => Some(PrimitiveType::String),
            0xa01 => Some(PrimitiveType::Geometry),
            _ => None,
        }
    }
}

/// Array bounds; `max == None` means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayBounds {
    pub min: u32,
    pub max: Option<u32>,
}

impl ArrayBounds {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self { min: 0, max: None }
    }
}

impl Default for ArrayBounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropertyKind {
    Primitive {
        primitive_type: PrimitiveType,
        enumeration: Option<EnumerationId>,
        extended_type: Option<String>,
    },
    Struct {
        struct_class: ClassId,
    },
    PrimitiveArray {
        primitive_type: PrimitiveType,
        enumeration: Option<EnumerationId>,
        extended_type: Option<String>,
        bounds: ArrayBounds,
    },
    StructArray {
        struct_class: ClassId,
        bounds: ArrayBounds,
    },
    /// Target relationship stays an unverified id until the whole requested
    /// graph has been loaded.
    Navigation {
        relationship: ClassId,
        direction: Direction,
    },
}

impl PropertyKind {
    pub fn tag(&self) -> PropertyKindTag {
        match self {
            PropertyKind::Primitive { .. } => PropertyKindTag::Primitive,
            PropertyKind::Struct { .. } => PropertyKindTag::Struct,
            PropertyKind::PrimitiveArray { .. } => PropertyKindTag::PrimitiveArray,
            PropertyKind::StructArray { .. } => PropertyKindTag::StructArray,
            PropertyKind::Navigation { .. } => PropertyKindTag::Navigation,
        }
    }

    pub fn bounds(&self) -> Option<ArrayBounds> {
        match self {
            PropertyKind::PrimitiveArray { bounds, .. } | PropertyKind::StructArray { bounds, .. } => {
                Some(*bounds)
            }
            _ => None,
        }
    }

    pub fn enumeration(&self) -> Option<EnumerationId> {
        match self {
            PropertyKind::Primitive { enumeration, .. }
            | PropertyKind::PrimitiveArray { enumeration, .. } => *enumeration,
            _ => None,
        }
    }

    pub fn struct_class(&self) -> Option<ClassId> {
        match self {
            PropertyKind::Struct { struct_class } | PropertyKind::StructArray { struct_class, .. } => {
                Some(*struct_class)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub id: PropertyId,
    pub class_id: ClassId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub is_readonly: bool,
    pub priority: i32,
    pub kind: PropertyKind,
    pub kind_of_quantity: Option<KindOfQuantityId>,
    pub category: Option<PropertyCategoryId>,
    pub custom_attributes: Vec<CustomAttribute>,
}

impl Property {
    pub fn label(&self) -> &str {
        self.display_label.as_deref().unwrap_or(&self.name)
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self.kind, PropertyKind::Navigation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_type_tags() {
        assert_eq!(PrimitiveType::from_i32(0x901), Some(PrimitiveType::String));
        assert_eq!(PrimitiveType::from_i32(0xb01), None);
        assert_eq!(PrimitiveType::Geometry.as_i32(), 0xa01);
    }

    #[test]
    fn test_kind_accessors() {
        let kind = PropertyKind::StructArray {
            struct_class: ClassId(3),
            bounds: ArrayBounds::new(1, Some(4)),
        };
        assert_eq!(kind.tag(), PropertyKindTag::StructArray);
        assert_eq!(kind.struct_class(), Some(ClassId(3)));
        assert_eq!(kind.bounds(), Some(ArrayBounds::new(1, Some(4))));
        assert_eq!(kind.enumeration(), None);
        assert_eq!(PropertyKindTag::from_i32(5), None);
    }
}
