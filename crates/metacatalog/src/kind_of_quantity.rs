//! Kinds of quantity.

use std::sync::Arc;

use crate::{Format, KindOfQuantityId, SchemaId, Unit};

/// A presentation format as used by a kind of quantity, with its optional
/// overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct FormatReference {
    pub format: Arc<Format>,
    pub precision: Option<u32>,
    pub unit_overrides: Vec<(Arc<Unit>, Option<String>)>,
}

impl FormatReference {
    pub fn effective_precision(&self) -> Option<u32> {
        self.precision.or(self.format.numeric_spec.precision)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KindOfQuantity {
    pub id: KindOfQuantityId,
    pub schema_id: SchemaId,
    pub name: String,
    pub display_label: Option<String>,
    pub description: Option<String>,
    pub persistence_unit: Arc<Unit>,
    pub presentation_formats: Vec<FormatReference>,
    pub relative_error: f64,
}

impl KindOfQuantity {
    pub fn label(&self) -> &str {
        self.display_label.as_deref().unwrap_or(&self.name)
    }

    /// The first presentation format is the default one.
    pub fn default_presentation_format(&self) -> Option<&FormatReference> {
        self.presentation_formats.first()
    }
}
