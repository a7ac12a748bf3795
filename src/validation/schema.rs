use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use validator::ValidateEmail;

use super::error::{ValidationFailure, Violation, ViolationCode};

// ============================================================================
// Declarative Schemas
// ============================================================================
//
// A schema is a static, ordered list of fields. Validation walks the raw
// JSON in declaration order, collects every violation, and produces a
// normalized value: declared coercions applied, unknown fields stripped.
// Only a fully valid input is deserialized into the typed value.
//
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct StrRule {
    pub min_len: usize,
    pub max_len: Option<usize>,
    pub email: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct IntRule {
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Accept a numeric string ("3") and coerce it to a number
    pub coerce: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct NumRule {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub coerce: bool,
}

#[derive(Debug)]
pub enum Kind {
    Str(StrRule),
    Int(IntRule),
    Num(NumRule),
    OneOf(&'static [&'static str]),
    Object(&'static [Field]),
    Array { item: &'static Kind, min_items: usize },
}

impl Kind {
    pub const fn non_empty_string() -> Self {
        Kind::Str(StrRule { min_len: 1, max_len: None, email: false })
    }

    pub const fn email() -> Self {
        Kind::Str(StrRule { min_len: 1, max_len: Some(254), email: true })
    }
}

#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub required: bool,
    pub kind: Kind,
}

impl Field {
    pub const fn required(name: &'static str, kind: Kind) -> Self {
        Self { name, required: true, kind }
    }

    pub const fn optional(name: &'static str, kind: Kind) -> Self {
        Self { name, required: false, kind }
    }
}

/// Cross-field rule run after the per-field pass on the normalized object
pub type Refinement = fn(&Map<String, Value>) -> Option<Violation>;

pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [Field],
    pub refine: Option<Refinement>,
}

impl Schema {
    /// Validate and normalize without binding to a type
    pub fn normalize(&self, raw: &Value) -> Result<Value, ValidationFailure> {
        let mut violations = Vec::new();
        let normalized = check_object(self.fields, raw, "", &mut violations);

        if let (Some(refine), Value::Object(map)) = (self.refine, &normalized) {
            if violations.is_empty() {
                if let Some(v) = refine(map) {
                    violations.push(v);
                }
            }
        }

        if violations.is_empty() {
            Ok(normalized)
        } else {
            tracing::debug!(
                schema = self.name,
                violations = violations.len(),
                "Input rejected by schema"
            );
            Err(ValidationFailure { violations })
        }
    }
}

/// Validate untrusted input against `schema`, producing the typed value
/// or every violation found.
pub fn validate<T: DeserializeOwned>(schema: &Schema, raw: &Value) -> Result<T, ValidationFailure> {
    let normalized = schema.normalize(raw)?;
    serde_json::from_value(normalized).map_err(|e| {
        ValidationFailure::single(Violation::new("", ViolationCode::InvalidType, e.to_string()))
    })
}

/// Parse a raw request body and validate it in one step
pub fn validate_body<T: DeserializeOwned>(schema: &Schema, body: &[u8]) -> Result<T, ValidationFailure> {
    let raw = parse_json(body)?;
    validate(schema, &raw)
}

pub fn parse_json(body: &[u8]) -> Result<Value, ValidationFailure> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| {
        ValidationFailure::single(Violation::new(
            "",
            ViolationCode::InvalidJson,
            format!("Request body is not valid JSON: {}", e),
        ))
    })
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn invalid_type(path: &str, expected: &str, got: &Value, out: &mut Vec<Violation>) -> Value {
    out.push(Violation::new(
        path,
        ViolationCode::InvalidType,
        format!("Expected {}, received {}", expected, type_name(got)),
    ));
    Value::Null
}

fn check_object(fields: &[Field], raw: &Value, path: &str, out: &mut Vec<Violation>) -> Value {
    let input = match raw {
        Value::Object(map) => map,
        other => return invalid_type(path, "object", other, out),
    };

    let mut normalized = Map::new();
    for field in fields {
        let field_path = join(path, field.name);
        match input.get(field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    out.push(Violation::new(field_path, ViolationCode::Required, "Required"));
                }
            }
            Some(value) => {
                let checked = check_kind(&field.kind, value, &field_path, out);
                normalized.insert(field.name.to_string(), checked);
            }
        }
    }

    Value::Object(normalized)
}

fn check_kind(kind: &Kind, value: &Value, path: &str, out: &mut Vec<Violation>) -> Value {
    match kind {
        Kind::Str(rule) => check_str(rule, value, path, out),
        Kind::Int(rule) => check_int(rule, value, path, out),
        Kind::Num(rule) => check_num(rule, value, path, out),
        Kind::OneOf(allowed) => match value {
            Value::String(s) if allowed.contains(&s.as_str()) => value.clone(),
            Value::String(s) => {
                out.push(Violation::new(
                    path,
                    ViolationCode::InvalidEnumValue,
                    format!("Invalid value '{}', expected one of: {}", s, allowed.join(", ")),
                ));
                Value::Null
            }
            other => invalid_type(path, "string", other, out),
        },
        Kind::Object(fields) => check_object(fields, value, path, out),
        Kind::Array { item, min_items } => {
            let elements = match value {
                Value::Array(elements) => elements,
                other => return invalid_type(path, "array", other, out),
            };
            if elements.len() < *min_items {
                out.push(Violation::new(
                    path,
                    ViolationCode::TooSmall,
                    format!("Must contain at least {} item(s)", min_items),
                ));
            }
            let checked = elements
                .iter()
                .enumerate()
                .map(|(i, element)| check_kind(item, element, &join(path, &i.to_string()), out))
                .collect();
            Value::Array(checked)
        }
    }
}

fn check_str(rule: &StrRule, value: &Value, path: &str, out: &mut Vec<Violation>) -> Value {
    let s = match value {
        Value::String(s) => s,
        other => return invalid_type(path, "string", other, out),
    };

    let len = s.trim().chars().count();
    if len < rule.min_len {
        out.push(Violation::new(
            path,
            ViolationCode::TooSmall,
            if rule.min_len == 1 {
                "Must not be empty".to_string()
            } else {
                format!("Must contain at least {} character(s)", rule.min_len)
            },
        ));
    } else if rule.email && !s.as_str().validate_email() {
        out.push(Violation::new(path, ViolationCode::InvalidEmail, "Invalid email address"));
    }

    if let Some(max) = rule.max_len {
        if s.chars().count() > max {
            out.push(Violation::new(
                path,
                ViolationCode::TooBig,
                format!("Must contain at most {} character(s)", max),
            ));
        }
    }

    value.clone()
}

fn check_int(rule: &IntRule, value: &Value, path: &str, out: &mut Vec<Violation>) -> Value {
    let n = match value {
        Value::Number(n) => match n.as_i64() {
            Some(n) => n,
            None => return invalid_type(path, "integer", value, out),
        },
        Value::String(s) if rule.coerce => match s.trim().parse::<i64>() {
            Ok(n) => n,
            Err(_) => return invalid_type(path, "integer", value, out),
        },
        other => return invalid_type(path, "integer", other, out),
    };

    if let Some(min) = rule.min {
        if n < min {
            out.push(Violation::new(
                path,
                ViolationCode::TooSmall,
                format!("Must be greater than or equal to {}", min),
            ));
        }
    }
    if let Some(max) = rule.max {
        if n > max {
            out.push(Violation::new(
                path,
                ViolationCode::TooBig,
                format!("Must be less than or equal to {}", max),
            ));
        }
    }

    Value::Number(n.into())
}

fn check_num(rule: &NumRule, value: &Value, path: &str, out: &mut Vec<Violation>) -> Value {
    let n = match value {
        Value::Number(n) => match n.as_f64() {
            Some(n) => n,
            None => return invalid_type(path, "number", value, out),
        },
        Value::String(s) if rule.coerce => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => n,
            _ => return invalid_type(path, "number", value, out),
        },
        other => return invalid_type(path, "number", other, out),
    };

    if let Some(min) = rule.min {
        if n < min {
            out.push(Violation::new(
                path,
                ViolationCode::TooSmall,
                format!("Must be greater than or equal to {}", min),
            ));
        }
    }
    if let Some(max) = rule.max {
        if n > max {
            out.push(Violation::new(
                path,
                ViolationCode::TooBig,
                format!("Must be less than or equal to {}", max),
            ));
        }
    }

    // Keep the original number untouched when no coercion happened
    match value {
        Value::Number(_) => value.clone(),
        _ => Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
    }
}
