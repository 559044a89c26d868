//! Declarative schema tables.
//!
//! Every configuration namespace the renderer accepts is described here as a
//! closed list of fields. The validator walks raw JSON against these tables;
//! the typed records in [`crate::model`] mirror them field for field.

use serde_json::Value;

/// Primitive (or nested) type a field must hold.
///
/// Types are strict: `Int` rejects `5.0`, `Number` rejects booleans, and no
/// string is ever coerced into a number.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    Str,
    Int,
    Bool,
    /// Integer or floating-point number.
    Number,
    /// Nested closed record.
    Record(&'static Namespace),
    /// Ordered list of closed records.
    RecordList(&'static Namespace),
}

impl FieldType {
    /// Human-readable type name used in violation messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::Int => "integer",
            Self::Bool => "boolean",
            Self::Number => "number",
            Self::Record(_) => "object",
            Self::RecordList(_) => "array",
        }
    }
}

/// Default inserted when a default-bearing field is absent or `null`.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Int(i64),
    Number(f64),
    /// The nested record, validated from `{}` (so its own defaults apply).
    Record,
}

/// Whether a field must be present.
#[derive(Debug, Clone, Copy)]
pub enum Presence {
    Required,
    Optional,
    Default(DefaultValue),
}

/// Value range restriction applied after the type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// `>= 0`
    NonNegative,
    /// `> 0`
    Positive,
}

impl Constraint {
    /// Check a numeric value, returning the reason on failure.
    pub(crate) fn check(self, value: &Value) -> Result<(), String> {
        let Some(n) = value.as_f64() else {
            return Ok(());
        };
        match self {
            Self::NonNegative if n < 0.0 => Err(format!("must be >= 0, got {n}")),
            Self::Positive if n <= 0.0 => Err(format!("must be > 0, got {n}")),
            _ => Ok(()),
        }
    }
}

/// A single permitted field.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub presence: Presence,
    pub constraint: Option<Constraint>,
}

impl Field {
    const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            presence: Presence::Optional,
            constraint: None,
        }
    }

    const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            presence: Presence::Required,
            constraint: None,
        }
    }

    const fn defaulted(name: &'static str, ty: FieldType, default: DefaultValue) -> Self {
        Self {
            name,
            ty,
            presence: Presence::Default(default),
            constraint: None,
        }
    }

    const fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Default value as JSON, if this field is default-bearing.
    ///
    /// `DefaultValue::Record` is resolved by the validator, not here.
    pub(crate) fn scalar_default(&self) -> Option<Value> {
        match self.presence {
            Presence::Default(DefaultValue::Int(i)) => Some(Value::from(i)),
            Presence::Default(DefaultValue::Number(n)) => Some(Value::from(n)),
            _ => None,
        }
    }
}

/// A closed record: the complete set of fields allowed at one level.
#[derive(Debug)]
pub struct Namespace {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl Namespace {
    /// Look up a permitted field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `name` is a permitted field.
    #[must_use]
    pub fn permits(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Names of all permitted fields, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }
}

use FieldType::{Bool, Int, Number, Record, RecordList, Str};

/// Entity-relationship diagram knobs.
pub static ER: Namespace = Namespace {
    name: "er",
    fields: &[
        Field::optional("diagramPadding", Int),
        Field::optional("layoutDirection", Str),
        Field::optional("minEntityWidth", Int),
        Field::optional("minEntityHeight", Int),
        Field::optional("entityPadding", Int),
        Field::optional("stroke", Str),
        Field::optional("fill", Str),
        Field::optional("fontSize", Int),
        Field::optional("useMaxWidth", Bool),
    ],
};

/// Flowchart knobs.
pub static FLOWCHART: Namespace = Namespace {
    name: "flowchart",
    fields: &[
        Field::optional("diagramPadding", Int),
        Field::optional("htmlLabels", Bool),
        Field::optional("curve", Str),
    ],
};

/// Sequence diagram knobs.
pub static SEQUENCE: Namespace = Namespace {
    name: "sequence",
    fields: &[
        Field::optional("diagramMarginX", Int),
        Field::optional("diagramMarginY", Int),
        Field::optional("actorMargin", Int),
        Field::optional("width", Int),
        Field::optional("height", Int),
        Field::optional("boxMargin", Int),
        Field::optional("boxTextMargin", Int),
        Field::optional("noteMargin", Int),
        Field::optional("messageMargin", Int),
        Field::optional("messageAlign", Str),
        Field::optional("mirrorActors", Bool),
        Field::optional("bottomMarginAdj", Int),
        Field::optional("useMaxWidth", Bool),
        Field::optional("rightAngles", Bool),
        Field::optional("showSequenceNumbers", Bool),
    ],
};

/// Gantt chart knobs.
pub static GANTT: Namespace = Namespace {
    name: "gantt",
    fields: &[
        Field::optional("titleTopMargin", Int),
        Field::optional("barHeight", Int),
        Field::optional("barGap", Int),
        Field::optional("topPadding", Int),
        Field::optional("leftPadding", Int),
        Field::optional("gridLineStartPadding", Int),
        Field::optional("fontSize", Int),
        Field::optional("fontFamily", Str),
        Field::optional("numberSectionStyles", Int),
        Field::optional("axisFormat", Str),
        Field::optional("topAxis", Bool),
        Field::optional("displayMode", Str),
    ],
};

/// Mermaid configuration, used both globally (`mmd_config`) and per diagram.
pub static MERMAID: Namespace = Namespace {
    name: "mermaid",
    fields: &[
        Field::optional("theme", Str),
        Field::optional("logLevel", Str),
        Field::optional("securityLevel", Str),
        Field::optional("arrowMarkerAbsolute", Bool),
        Field::optional("er", Record(&ER)),
        Field::optional("flowchart", Record(&FLOWCHART)),
        Field::optional("sequence", Record(&SEQUENCE)),
        Field::optional("gantt", Record(&GANTT)),
    ],
};

/// One diagram in the batch.
pub static DIAGRAM: Namespace = Namespace {
    name: "diagram",
    fields: &[
        Field::required("code", Str),
        Field::optional("config", Record(&MERMAID)),
    ],
};

/// Application settings governing post-processing.
pub static APP: Namespace = Namespace {
    name: "app",
    fields: &[
        Field::defaulted("margin", Number, DefaultValue::Number(20.0))
            .with_constraint(Constraint::NonNegative),
        Field::defaulted("max_width", Int, DefaultValue::Int(-1)),
        Field::defaulted("width", Int, DefaultValue::Int(-1)),
        Field::defaulted("zoom", Number, DefaultValue::Number(1.0))
            .with_constraint(Constraint::Positive),
    ],
};

/// The whole batch request.
pub static BATCH: Namespace = Namespace {
    name: "batch",
    fields: &[
        Field::required("mmd", RecordList(&DIAGRAM)),
        Field::defaulted("mmd_config", Record(&MERMAID), DefaultValue::Record),
        Field::defaulted("config", Record(&APP), DefaultValue::Record),
    ],
};

/// Name of the per-diagram expected checksum, consumed before validation.
pub const CHECKSUM_FIELD: &str = "checksum";

/// Produce a sample object holding every field of `ns` with a value of the
/// right type. Used to check that the typed records mirror the tables.
#[cfg(test)]
pub(crate) fn sample_record(ns: &Namespace) -> serde_json::Map<String, Value> {
    ns.fields
        .iter()
        .map(|f| {
            let value = match f.ty {
                Str => Value::from("x"),
                Int => Value::from(3),
                Bool => Value::from(true),
                Number => Value::from(1.5),
                Record(inner) => Value::Object(sample_record(inner)),
                RecordList(inner) => Value::Array(vec![Value::Object(sample_record(inner))]),
            };
            (f.name.to_owned(), value)
        })
        .collect()
}

/// Human-readable JSON type name of a raw value.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_have_unique_field_names() {
        for ns in [&ER, &FLOWCHART, &SEQUENCE, &GANTT, &MERMAID, &DIAGRAM, &APP, &BATCH] {
            let mut names: Vec<_> = ns.field_names().collect();
            let total = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), total, "duplicate field in {}", ns.name);
        }
    }

    #[test]
    fn test_mermaid_namespace_nests_families() {
        for family in ["er", "flowchart", "sequence", "gantt"] {
            let field = MERMAID.field(family).unwrap();
            assert!(matches!(field.ty, FieldType::Record(_)));
        }
        assert!(!MERMAID.permits("checksum"));
    }

    #[test]
    fn test_app_defaults() {
        assert_eq!(APP.field("margin").unwrap().scalar_default(), Some(Value::from(20.0)));
        assert_eq!(APP.field("max_width").unwrap().scalar_default(), Some(Value::from(-1)));
        assert_eq!(APP.field("width").unwrap().scalar_default(), Some(Value::from(-1)));
        assert_eq!(APP.field("zoom").unwrap().scalar_default(), Some(Value::from(1.0)));
    }

    #[test]
    fn test_constraints() {
        assert!(Constraint::NonNegative.check(&Value::from(0)).is_ok());
        assert!(Constraint::NonNegative.check(&Value::from(-1)).is_err());
        assert!(Constraint::Positive.check(&Value::from(0.5)).is_ok());
        assert!(Constraint::Positive.check(&Value::from(0)).is_err());
    }

    #[test]
    fn test_json_type_name_distinguishes_float() {
        assert_eq!(json_type_name(&Value::from(5)), "integer");
        assert_eq!(json_type_name(&Value::from(5.0)), "float");
        assert_eq!(json_type_name(&Value::from("5")), "string");
    }
}
