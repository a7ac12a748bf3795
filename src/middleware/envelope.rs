use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::errors::{ErrorCode, ServiceError};
use crate::validation::{Schema, Violation};

// ============================================================================
// Request / Response shapes seen by the middleware chain
// ============================================================================

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Where a route's declared schema reads its input from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Body,
    Query,
}

/// Route-declared input contract, checked by the validation stage
#[derive(Clone, Copy)]
pub struct Input {
    pub schema: &'static Schema,
    pub source: InputSource,
}

impl Input {
    pub const fn body(schema: &'static Schema) -> Self {
        Self {
            schema,
            source: InputSource::Body,
        }
    }

    pub const fn query(schema: &'static Schema) -> Self {
        Self {
            schema,
            source: InputSource::Query,
        }
    }
}

#[derive(Clone, Default)]
pub struct ApiRequest {
    /// Upper-case HTTP method
    pub method: String,
    pub path: String,
    pub path_params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    /// Lower-case header names
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,

    pub input: Option<Input>,
    /// Normalized input, set once the validation stage accepted it
    pub validated: Option<Value>,
    /// Set by the correlation stage
    pub correlation_id: String,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    pub fn with_input(mut self, input: Input) -> Self {
        self.input = Some(input);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn path_param(&self, name: &str) -> Result<&str, ServiceError> {
        self.path_params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ServiceError::Internal(format!("route is missing path parameter '{}'", name)))
    }

    /// Typed view of the validated input
    pub fn input_as<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        let value = self
            .validated
            .clone()
            .ok_or_else(|| ServiceError::Internal("handler ran without validated input".to_string()))?;
        serde_json::from_value(value).map_err(|e| ServiceError::Internal(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Data(Value),
    Error {
        message: String,
        code: ErrorCode,
        details: Option<Vec<Violation>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub payload: Payload,
    pub metadata: Map<String, Value>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [Violation]>,
}

impl ApiResponse {
    pub fn data(status: u16, data: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            payload: Payload::Data(data),
            metadata: Map::new(),
        }
    }

    pub fn json<T: Serialize>(status: u16, data: &T) -> Result<Self, ServiceError> {
        let value = serde_json::to_value(data).map_err(|e| ServiceError::Internal(e.to_string()))?;
        Ok(Self::data(status, value))
    }

    pub fn from_error(err: &ServiceError) -> Self {
        Self {
            status: err.status(),
            headers: Vec::new(),
            payload: Payload::Error {
                message: err.public_message(),
                code: err.code(),
                details: err.violations().map(<[Violation]>::to_vec),
            },
            metadata: Map::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(existing) => existing.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.payload, Payload::Data(_))
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match &self.payload {
            Payload::Error { code, .. } => Some(*code),
            Payload::Data(_) => None,
        }
    }

    /// `{ success, data, metadata? }` or `{ success, error, code, metadata? }`
    pub fn envelope(&self) -> Value {
        let mut body = Map::new();

        match &self.payload {
            Payload::Data(data) => {
                body.insert("success".into(), Value::Bool(true));
                body.insert("data".into(), data.clone());
            }
            Payload::Error {
                message,
                code,
                details,
            } => {
                body.insert("success".into(), Value::Bool(false));
                let error = ErrorBody {
                    message,
                    code: *code,
                    details: details.as_deref(),
                };
                body.insert(
                    "error".into(),
                    serde_json::to_value(error).unwrap_or(Value::Null),
                );
                body.insert("code".into(), Value::String(code.as_str().to_string()));
            }
        }

        if !self.metadata.is_empty() {
            body.insert("metadata".into(), Value::Object(self.metadata.clone()));
        }
        Value::Object(body)
    }
}
