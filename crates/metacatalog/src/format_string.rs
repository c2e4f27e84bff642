//! Qualified names and presentation format strings.
//!
//! A presentation format is stored as
//! `alias:Format[(precision)][alias:Unit|label][alias:Unit]...`; the
//! persistence unit of a kind of quantity as `alias:Unit`.

use std::fmt;

use crate::{CatalogError, CatalogResult};

/// `alias:Name` or a bare `Name`. The qualifier may be a schema alias or a
/// schema name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub qualifier: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    pub fn parse(text: &str) -> CatalogResult<Self> {
        let text = text.trim();
        let (qualifier, name) = match text.split_once(':') {
            Some((qualifier, name)) => (Some(qualifier.trim()), name.trim()),
            None => (None, text),
        };
        if !is_identifier(name) || qualifier.map_or(false, |q| !is_identifier(q)) {
            return Err(CatalogError::malformed(format!(
                "invalid qualified name '{}'",
                text
            )));
        }
        Ok(Self {
            qualifier: qualifier.map(str::to_string),
            name: name.to_string(),
        })
    }
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}:{}", qualifier, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitOverride {
    pub unit: QualifiedName,
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatString {
    pub format: QualifiedName,
    pub precision: Option<u32>,
    pub units: Vec<UnitOverride>,
}

/// Composite formats and unit overrides hold at most this many units.
pub const MAX_COMPOSITE_UNITS: usize = 4;

impl FormatString {
    pub fn parse(text: &str) -> CatalogResult<Self> {
        let malformed = || CatalogError::malformed(format!("invalid format string '{}'", text));
        let text = text.trim();

        let head_end = text.find(['(', '[']).unwrap_or(text.len());
        let format = QualifiedName::parse(&text[..head_end])?;
        let mut rest = &text[head_end..];

        let mut precision = None;
        if let Some(after) = rest.strip_prefix('(') {
            let close = after.find(')').ok_or_else(malformed)?;
            let value = after[..close].trim();
            precision = Some(value.parse::<u32>().map_err(|_| malformed())?);
            rest = &after[close + 1..];
        }

        let mut units = Vec::new();
        while let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(malformed)?;
            let body = &after[..close];
            let (unit, label) = match body.split_once('|') {
                Some((unit, label)) => (unit, Some(label.to_string())),
                None => (body, None),
            };
            units.push(UnitOverride {
                unit: QualifiedName::parse(unit)?,
                label,
            });
            rest = after[close + 1..].trim_start();
        }

        if !rest.trim().is_empty() || units.len() > MAX_COMPOSITE_UNITS {
            return Err(malformed());
        }

        Ok(Self {
            format,
            precision,
            units,
        })
    }
}

impl fmt::Display for FormatString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format)?;
        if let Some(precision) = self.precision {
            write!(f, "({})", precision)?;
        }
        for unit in &self.units {
            match &unit.label {
                Some(label) => write!(f, "[{}|{}]", unit.unit, label)?,
                None => write!(f, "[{}]", unit.unit)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified_name() {
        let name = QualifiedName::parse("u:M").unwrap();
        assert_eq!(name.qualifier.as_deref(), Some("u"));
        assert_eq!(name.name, "M");
        assert_eq!(QualifiedName::parse("M").unwrap().qualifier, None);
        assert!(QualifiedName::parse(":M").is_err());
        assert!(QualifiedName::parse("a:b:c").is_err());
    }

    #[test]
    fn test_parse_full_format_string() {
        let parsed = FormatString::parse("f:AmerFI(8)[u:FT|'][u:IN|\"]").unwrap();
        assert_eq!(parsed.format, QualifiedName::new("f", "AmerFI"));
        assert_eq!(parsed.precision, Some(8));
        assert_eq!(parsed.units.len(), 2);
        assert_eq!(parsed.units[0].label.as_deref(), Some("'"));
        assert_eq!(parsed.to_string(), "f:AmerFI(8)[u:FT|'][u:IN|\"]");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(FormatString::parse("f:DefaultReal(x)").is_err());
        assert!(FormatString::parse("f:DefaultReal[u:M").is_err());
        assert!(FormatString::parse("f:DefaultReal trailing").is_err());
        assert!(FormatString::parse("f:X[u:A][u:B][u:C][u:D][u:E]").is_err());
    }
}
