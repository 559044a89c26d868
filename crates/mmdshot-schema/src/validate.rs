//! Batch request validation and normalization.
//!
//! [`validate_batch`] walks a raw JSON document against the [`schema`](crate::schema)
//! tables, collecting every violation rather than stopping at the first one.
//! On success the normalized document (defaults filled in, `null` dropped) is
//! converted into a typed [`BatchRequest`].

use serde_json::{Map, Value};

use crate::error::{SchemaError, Violation, ViolationKind};
use crate::model::BatchRequest;
use crate::schema::{
    BATCH, CHECKSUM_FIELD, DefaultValue, FieldType, Namespace, Presence, json_type_name,
};

/// A batch that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    /// Normalized request, ready to forward to the renderer.
    pub request: BatchRequest,
    /// Expected content checksum per diagram, by batch index.
    ///
    /// Extracted from each diagram's `checksum` field before validation, so it
    /// never reaches the renderer. Empty strings count as absent.
    pub expected_checksums: Vec<Option<String>>,
}

/// Validate a raw batch request.
///
/// The whole batch is checked before anything is returned: no part of an
/// invalid batch is ever handed on.
///
/// # Errors
///
/// Returns [`SchemaError`] listing every unknown field, wrongly typed value,
/// missing required field and out-of-range value, each with its field path.
pub fn validate_batch(raw: &Value) -> Result<ValidatedBatch, SchemaError> {
    let mut violations = Vec::new();

    let Value::Object(root) = raw else {
        return Err(SchemaError {
            violations: vec![Violation::new(
                "",
                ViolationKind::WrongType {
                    expected: "object",
                    found: json_type_name(raw),
                },
            )],
        });
    };

    let mut root = root.clone();
    let expected_checksums = take_checksums(&mut root, &mut violations);
    let normalized = normalize_record(&BATCH, &root, "", &mut violations);

    if !violations.is_empty() {
        tracing::debug!(count = violations.len(), "Batch request rejected");
        return Err(SchemaError { violations });
    }

    let request: BatchRequest =
        serde_json::from_value(Value::Object(normalized)).map_err(|e| SchemaError {
            violations: vec![Violation::new(
                "",
                ViolationKind::InvalidValue(e.to_string()),
            )],
        })?;

    tracing::debug!(diagrams = request.len(), "Batch request validated");

    Ok(ValidatedBatch {
        request,
        expected_checksums,
    })
}

/// Remove the `checksum` field from every diagram record.
///
/// Returns one entry per element of `mmd` (or nothing if `mmd` is not an array;
/// the schema pass reports that).
fn take_checksums(
    root: &mut Map<String, Value>,
    violations: &mut Vec<Violation>,
) -> Vec<Option<String>> {
    let Some(Value::Array(diagrams)) = root.get_mut("mmd") else {
        return Vec::new();
    };

    diagrams
        .iter_mut()
        .enumerate()
        .map(|(index, diagram)| {
            let Value::Object(diagram) = diagram else {
                return None;
            };
            match diagram.remove(CHECKSUM_FIELD) {
                Some(Value::String(s)) if !s.is_empty() => Some(s),
                Some(Value::String(_) | Value::Null) | None => None,
                Some(other) => {
                    violations.push(Violation::new(
                        format!("mmd[{index}].{CHECKSUM_FIELD}"),
                        ViolationKind::WrongType {
                            expected: "string",
                            found: json_type_name(&other),
                        },
                    ));
                    None
                }
            }
        })
        .collect()
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

/// Normalize one closed record.
fn normalize_record(
    ns: &Namespace,
    record: &Map<String, Value>,
    path: &str,
    violations: &mut Vec<Violation>,
) -> Map<String, Value> {
    for key in record.keys() {
        if !ns.permits(key) {
            violations.push(Violation::new(child_path(path, key), ViolationKind::UnknownField));
        }
    }

    let mut out = Map::new();
    for field in ns.fields {
        let field_path = child_path(path, field.name);
        match record.get(field.name) {
            None | Some(Value::Null) => match field.presence {
                Presence::Required => {
                    violations.push(Violation::new(field_path, ViolationKind::MissingField));
                }
                Presence::Optional => {}
                Presence::Default(DefaultValue::Record) => {
                    if let FieldType::Record(inner) = field.ty {
                        let value = normalize_record(inner, &Map::new(), &field_path, violations);
                        out.insert(field.name.to_owned(), Value::Object(value));
                    }
                }
                Presence::Default(_) => {
                    if let Some(value) = field.scalar_default() {
                        out.insert(field.name.to_owned(), value);
                    }
                }
            },
            Some(value) => {
                let Some(value) = normalize_value(field.ty, value, &field_path, violations) else {
                    continue;
                };
                if let Some(constraint) = field.constraint
                    && let Err(reason) = constraint.check(&value)
                {
                    violations.push(Violation::new(field_path, ViolationKind::InvalidValue(reason)));
                    continue;
                }
                out.insert(field.name.to_owned(), value);
            }
        }
    }
    out
}

/// Check a non-null value against its declared type.
///
/// Returns the normalized value, or `None` after recording a violation.
fn normalize_value(
    ty: FieldType,
    value: &Value,
    path: &str,
    violations: &mut Vec<Violation>,
) -> Option<Value> {
    if let (FieldType::Int, Value::Number(n)) = (ty, value)
        && n.as_i64().is_none()
        && n.is_u64()
    {
        violations.push(Violation::new(
            path,
            ViolationKind::InvalidValue(format!("integer {n} is out of range")),
        ));
        return None;
    }

    let accepted = match (ty, value) {
        (FieldType::Str, Value::String(_)) | (FieldType::Bool, Value::Bool(_)) => {
            Some(value.clone())
        }
        (FieldType::Int, Value::Number(n)) if n.as_i64().is_some() => Some(value.clone()),
        (FieldType::Number, Value::Number(_)) => Some(value.clone()),
        (FieldType::Record(inner), Value::Object(record)) => {
            Some(Value::Object(normalize_record(inner, record, path, violations)))
        }
        (FieldType::RecordList(inner), Value::Array(items)) => {
            let items = items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| {
                    normalize_value(
                        FieldType::Record(inner),
                        item,
                        &format!("{path}[{index}]"),
                        violations,
                    )
                })
                .collect();
            Some(Value::Array(items))
        }
        _ => None,
    };

    if accepted.is_none() {
        violations.push(Violation::new(
            path,
            ViolationKind::WrongType {
                expected: ty.name(),
                found: json_type_name(value),
            },
        ));
    }
    accepted
}
