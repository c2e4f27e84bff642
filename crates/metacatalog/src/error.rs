//! Error types for the catalog.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unsupported {what} value {value}: the file was produced by a newer version")]
    UnsupportedValue { what: &'static str, value: i64 },
    #[error("Missing reference: {0}")]
    MissingReference(String),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Operation rejected: {0}")]
    Policy(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Entity '{0}' has no persisted id")]
    TransientEntity(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    pub fn unsupported(what: &'static str, value: impl Into<i64>) -> Self {
        Self::UnsupportedValue {
            what,
            value: value.into(),
        }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::MissingReference(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::Policy(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl From<serde_json::Error> for CatalogError {
    fn from(value: serde_json::Error) -> Self {
        CatalogError::MalformedPayload(value.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for CatalogError {
    fn from(value: rusqlite::Error) -> Self {
        CatalogError::Storage(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogError;

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(
            CatalogError::unsupported("class type", 9),
            CatalogError::UnsupportedValue { value: 9, .. }
        ));
        assert!(matches!(
            CatalogError::missing("x"),
            CatalogError::MissingReference(_)
        ));
        assert!(matches!(
            CatalogError::malformed("x"),
            CatalogError::MalformedPayload(_)
        ));
        assert!(matches!(CatalogError::policy("x"), CatalogError::Policy(_)));
        assert!(matches!(CatalogError::storage("x"), CatalogError::Storage(_)));
    }

    #[test]
    fn test_unsupported_message_mentions_newer_version() {
        let err = CatalogError::unsupported("primitive type", 77);
        assert!(err.to_string().contains("newer version"));
    }
}
