use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::envelope::{ApiRequest, ApiResponse, InputSource, CORRELATION_HEADER};
use super::{Middleware, Next};
use crate::errors::ServiceError;
use crate::metrics::Metrics;
use crate::validation::parse_json;

// ============================================================================
// Correlation Id
// ============================================================================

/// Adopts `x-correlation-id` or mints one, opens the request span and tags
/// the response header and `metadata.correlationId`.
pub struct CorrelationId;

#[async_trait]
impl Middleware for CorrelationId {
    fn name(&self) -> &'static str {
        "correlation_id"
    }

    async fn handle(&self, mut request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ServiceError> {
        let correlation_id = request
            .header(CORRELATION_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        request.correlation_id = correlation_id.clone();

        let span = tracing::info_span!(
            "request",
            correlation_id = %correlation_id,
            method = %request.method,
            path = %request.path,
        );

        let mut response = next.run(request).instrument(span).await?;
        response.set_header(CORRELATION_HEADER, correlation_id.as_str());
        response
            .metadata
            .insert("correlationId".to_string(), Value::String(correlation_id));
        Ok(response)
    }
}

// ============================================================================
// CORS
// ============================================================================

pub struct Cors {
    allow_origin: String,
}

const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Correlation-Id";
const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";

impl Cors {
    pub fn new(allow_origin: impl Into<String>) -> Self {
        Self {
            allow_origin: allow_origin.into(),
        }
    }

    fn decorate(&self, response: &mut ApiResponse) {
        response.set_header("Access-Control-Allow-Origin", self.allow_origin.as_str());
        response.set_header("Access-Control-Allow-Headers", ALLOW_HEADERS);
        response.set_header("Access-Control-Allow-Methods", ALLOW_METHODS);
    }
}

#[async_trait]
impl Middleware for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ServiceError> {
        // Pre-flight: answer here
        if request.method == "OPTIONS" {
            let mut response = ApiResponse::data(200, Value::Null);
            self.decorate(&mut response);
            return Ok(response);
        }

        let mut response = next.run(request).await?;
        self.decorate(&mut response);
        Ok(response)
    }
}

// ============================================================================
// Body Validation
// ============================================================================

/// Checks the route's declared input and stores the normalized value on the
/// request. On failure answers 400 without calling the handler.
pub struct BodyValidation;

fn query_value(query: &std::collections::HashMap<String, String>) -> Value {
    let map: Map<String, Value> = query
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}

#[async_trait]
impl Middleware for BodyValidation {
    fn name(&self) -> &'static str {
        "body_validation"
    }

    async fn handle(&self, mut request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ServiceError> {
        let Some(input) = request.input else {
            return next.run(request).await;
        };

        let raw = match input.source {
            InputSource::Body => parse_json(&request.body),
            InputSource::Query => Ok(query_value(&request.query)),
        };

        match raw.and_then(|raw| input.schema.normalize(&raw)) {
            Ok(normalized) => {
                request.validated = Some(normalized);
                next.run(request).await
            }
            Err(failure) => {
                tracing::info!(
                    schema = input.schema.name,
                    fields = ?failure.fields(),
                    "Request rejected by validation"
                );
                Ok(ApiResponse::from_error(&ServiceError::Validation(failure)))
            }
        }
    }
}

// ============================================================================
// Error Translation
// ============================================================================

/// The one place a `ServiceError` becomes a response envelope
pub struct ErrorTranslation;

#[async_trait]
impl Middleware for ErrorTranslation {
    fn name(&self) -> &'static str {
        "error_translation"
    }

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ServiceError> {
        match next.run(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                match &e {
                    ServiceError::StoreUnavailable(detail) | ServiceError::Internal(detail) => {
                        tracing::error!(error = %detail, "❌ Internal error while handling request")
                    }
                    other => tracing::info!(code = %other.code(), error = %other, "Request failed"),
                }
                Ok(ApiResponse::from_error(&e))
            }
        }
    }
}

// ============================================================================
// Response Logging
// ============================================================================

pub struct ResponseLogging {
    metrics: Arc<Metrics>,
}

impl ResponseLogging {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Middleware for ResponseLogging {
    fn name(&self) -> &'static str {
        "response_logging"
    }

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ServiceError> {
        let method = request.method.clone();
        let path = request.path.clone();
        let started = Instant::now();

        let result = next.run(request).await;
        let elapsed = started.elapsed();
        let status = match &result {
            Ok(response) => response.status,
            Err(e) => e.status(),
        };

        self.metrics
            .record_http(&method, status, elapsed.as_secs_f64());
        tracing::info!(
            method = %method,
            path = %path,
            status = status,
            duration_ms = elapsed.as_millis() as u64,
            "Request completed"
        );
        result
    }
}
