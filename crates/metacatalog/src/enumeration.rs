//! Enumerations and property categories.

use serde::{Deserialize, Serialize};

use crate::{
    CatalogError, CatalogResult, EnumerationId, PrimitiveType, PropertyCategoryId, SchemaId,
};

/// Value of a single enumerator; its variant always matches the backing
/// type of the owning enumeration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumeratorValue {
    Integer(i32),
    String(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enumerator {
    pub name: String,
    pub value: EnumeratorValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Enumerator {
    pub fn integer(name: impl Into<String>, value: i32) -> Self {
        Self {
            name: name.into(),
            value: EnumeratorValue::Integer(value),
            display_label: None,
            description: None,
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: EnumeratorValue::String(value.into()),
            display_label: None,
            description: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.display_label = Some(label.into());
        self
    }
}

/// Parse the serialized enumerator list of an enumeration row and check
/// every value against the backing type.
pub fn parse_enumerators(
    backing_type: PrimitiveType,
    payload: &str,
) -> CatalogResult<Vec<Enumerator>> {
    let enumerators: Vec<Enumerator> = serde_json::from_str(payload)?;
    for enumerator in &enumerators {
        let matches = matches!(
            (&enumerator.value, backing_type),
            (EnumeratorValue::Integer(_), PrimitiveType::Integer)
                | (EnumeratorValue::String(_), PrimitiveType::String)
        );
        if !matches {
            return Err(CatalogError::malformed(format!(
                "enumerator '{}' does not match backing type {:?}",
                enumerator.name, backing_type
            )));
        }
    }
    Ok(enumerators)
}

/// Only integer and string backed enumerations exist.
pub fn check_backing_type(value: i32) -> CatalogResult<PrimitiveType> {
    match PrimitiveType::from_i32(value) {
        Some(ty @ (PrimitiveType::Integer | PrimitiveType::String)) => Ok(ty),
        _ => Err(CatalogError::unsupported("enumeration backing type", value)),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Enumeration {
    pub id: EnumerationId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub backing_type: PrimitiveType,
    pub is_strict: bool,
    pub enumerators: Vec<Enumerator>,
}

impl Enumeration {
    pub fn label(&self) -> &str {
        self.display_label.as_deref().unwrap_or(&self.name)
    }

    pub fn find_by_value(&self, value: &EnumeratorValue) -> Option<&Enumerator> {
        self.enumerators.iter().find(|e| &e.value == value)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Enumerator> {
        self.enumerators
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PropertyCategory {
    pub id: PropertyCategoryId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub priority: u32,
}

impl PropertyCategory {
    pub fn label(&self) -> &str {
        self.display_label.as_deref().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enumerators_checks_backing_type() {
        let payload = r#"[{"name":"Red","value":1,"displayLabel":"Red"},{"name":"Blue","value":2}]"#;
        let parsed = parse_enumerators(PrimitiveType::Integer, payload).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].display_label.as_deref(), Some("Red"));

        let err = parse_enumerators(PrimitiveType::String, payload).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedPayload(_)));
        assert!(parse_enumerators(PrimitiveType::Integer, "{").is_err());
    }

    #[test]
    fn test_backing_type_is_restricted() {
        assert_eq!(check_backing_type(0x501).unwrap(), PrimitiveType::Integer);
        assert!(matches!(
            check_backing_type(0x401),
            Err(CatalogError::UnsupportedValue { .. })
        ));
    }
}
