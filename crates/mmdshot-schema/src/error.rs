//! Schema validation errors.

use std::fmt;

/// Why a single field failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    /// The field is not part of its namespace.
    UnknownField,
    /// The field is present but holds the wrong primitive type.
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// A required field is absent or `null`.
    MissingField,
    /// The field has the right type but an unacceptable value.
    InvalidValue(String),
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownField => f.write_str("unknown field"),
            Self::WrongType { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            Self::MissingField => f.write_str("missing required field"),
            Self::InvalidValue(reason) => write!(f, "invalid value: {reason}"),
        }
    }
}

/// A schema violation at a specific field path (e.g. `mmd[1].config.theme`).
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub path: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub(crate) fn new(path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.kind)
        } else {
            write!(f, "{}: {}", self.path, self.kind)
        }
    }
}

/// Batch request rejected by the schema.
///
/// Carries every violation found in the batch, in document order.
#[derive(Debug, thiserror::Error)]
#[error("schema validation failed: {}", join_violations(.violations))]
pub struct SchemaError {
    pub violations: Vec<Violation>,
}

impl SchemaError {
    /// First violation found, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Violation> {
        self.violations.first()
    }

    /// Whether any violation is reported at exactly `path`.
    #[must_use]
    pub fn has_path(&self, path: &str) -> bool {
        self.violations.iter().any(|v| v.path == path)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
