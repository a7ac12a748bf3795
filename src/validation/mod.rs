// ============================================================================
// Validation Layer
// ============================================================================
//
// Pure functions that turn untrusted JSON into typed values or a complete,
// ordered list of field-level violations.
//
// ============================================================================

pub mod error;
pub mod schema;

pub use error::{ValidationFailure, Violation, ViolationCode};
pub use schema::{
    parse_json, validate, validate_body, Field, IntRule, Kind, NumRule, Refinement, Schema,
    StrRule,
};
