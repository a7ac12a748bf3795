use serde::{Deserialize, Serialize};

// ============================================================================
// Validation Failures
// ============================================================================

/// Machine-readable reason attached to every violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    Required,
    InvalidType,
    TooSmall,
    TooBig,
    InvalidEmail,
    InvalidEnumValue,
    InvalidJson,
    EmptyPatch,
}

/// A single field-level problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Dot-joined path, array indices included (`items.0.quantity`)
    pub field: String,
    pub message: String,
    pub code: ViolationCode,
}

impl Violation {
    pub fn new(field: impl Into<String>, code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }
}

/// Every violation found in one pass, in schema declaration order
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Validation failed with {} violation(s)", violations.len())]
pub struct ValidationFailure {
    pub violations: Vec<Violation>,
}

impl ValidationFailure {
    pub fn single(violation: Violation) -> Self {
        Self {
            violations: vec![violation],
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    /// First violation's message, used as the envelope summary
    pub fn summary(&self) -> String {
        match self.violations.first() {
            Some(v) if v.field.is_empty() => v.message.clone(),
            Some(v) => format!("{}: {}", v.field, v.message),
            None => "Validation failed".to_string(),
        }
    }
}
