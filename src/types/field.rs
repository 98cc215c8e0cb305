//! Metadata field selectors and resolved field handles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::DuplicationError;

/// Schema used when no field is configured.
pub const DEFAULT_SCHEMA: &str = "dc";

/// Element used when no field is configured.
pub const DEFAULT_ELEMENT: &str = "title";

fn segment_pattern() -> &'static regex_lite::Regex {
    static PATTERN: OnceLock<regex_lite::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex_lite::Regex::new(r"^[A-Za-z0-9_\-]+$").expect("segment pattern is valid")
    })
}

/// Unparsed-but-validated `schema.element[.qualifier]` triple.
///
/// A missing qualifier is a wildcard only when looking the field up in
/// the catalog; resolved [`FieldHandle`]s compare qualifiers exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSelector {
    /// Schema short name, e.g. `dc`.
    pub schema: String,
    /// Element, e.g. `title`.
    pub element: String,
    /// Optional qualifier, e.g. `alternative`.
    pub qualifier: Option<String>,
}

impl FieldSelector {
    /// Create a selector from its parts.
    pub fn new(
        schema: impl Into<String>,
        element: impl Into<String>,
        qualifier: Option<impl Into<String>>,
    ) -> Self {
        Self {
            schema: schema.into(),
            element: element.into(),
            qualifier: qualifier.map(Into::into),
        }
    }

    /// Parse a dotted selector with two or three segments.
    pub fn parse(selector: &str) -> Result<Self, DuplicationError> {
        let invalid = |reason: &str| DuplicationError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        };

        let segments: Vec<&str> = selector.trim().split('.').collect();
        if segments.len() < 2 {
            return Err(invalid("must contain at least schema and element, separated by a dot"));
        }
        if segments.len() > 3 {
            return Err(invalid("must not contain more than schema, element and qualifier"));
        }
        if let Some(bad) = segments.iter().find(|s| !segment_pattern().is_match(s)) {
            return Err(invalid(&format!("segment '{}' is empty or contains illegal characters", bad)));
        }

        Ok(Self {
            schema: segments[0].to_string(),
            element: segments[1].to_string(),
            qualifier: segments.get(2).map(|q| q.to_string()),
        })
    }

    /// Parse a configured selector, falling back to `dc.title` when unset or blank.
    pub fn parse_or_default(selector: Option<&str>) -> Result<Self, DuplicationError> {
        match selector.map(str::trim) {
            Some(s) if !s.is_empty() => Self::parse(s),
            _ => Ok(Self::default()),
        }
    }
}

impl Default for FieldSelector {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            element: DEFAULT_ELEMENT.to_string(),
            qualifier: None,
        }
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.element)?;
        if let Some(q) = &self.qualifier {
            write!(f, ".{}", q)?;
        }
        Ok(())
    }
}

/// Catalog identifier of a metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldId(pub i32);

/// A field resolved against the field catalog.
///
/// Immutable once resolved and scoped to one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldHandle {
    /// Catalog identifier.
    pub id: FieldId,
    /// Schema short name.
    pub schema: String,
    /// Element.
    pub element: String,
    /// Qualifier, if the field has one.
    pub qualifier: Option<String>,
}

impl FieldHandle {
    /// Create a field handle.
    pub fn new(id: FieldId, selector: FieldSelector) -> Self {
        Self {
            id,
            schema: selector.schema,
            element: selector.element,
            qualifier: selector.qualifier,
        }
    }

    /// The selector naming this field.
    pub fn selector(&self) -> FieldSelector {
        FieldSelector {
            schema: self.schema.clone(),
            element: self.element.clone(),
            qualifier: self.qualifier.clone(),
        }
    }
}

impl fmt::Display for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.selector(), self.id.0)
    }
}
