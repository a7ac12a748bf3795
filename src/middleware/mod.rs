use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::metrics::Metrics;

pub mod envelope;
pub mod stages;

pub use envelope::{ApiRequest, ApiResponse, Input, InputSource, Payload, CORRELATION_HEADER};
pub use stages::{BodyValidation, CorrelationId, Cors, ErrorTranslation, ResponseLogging};

// ============================================================================
// Middleware Chain
// ============================================================================
//
// Stages are objects run in a fixed order around an endpoint. Each receives
// the request and a `Next` for the rest of the chain; it may answer without
// calling `next` (short-circuit) or post-process what `next` returned.
//
// Standard order, outermost first:
//   CorrelationId -> ResponseLogging -> Cors -> ErrorTranslation
//     -> BodyValidation -> endpoint
//
// Everything inside ErrorTranslation may fail with a `ServiceError`;
// everything outside it only ever sees enveloped responses.
//
// ============================================================================

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ServiceError>;
}

/// Terminal handler of a chain
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse, ServiceError>;
}

/// Remainder of the chain after the current stage
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub async fn run(self, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    endpoint: self.endpoint,
                };
                stage.handle(request, next).await
            }
            None => self.endpoint.call(request).await,
        }
    }
}

pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self { stages }
    }

    pub fn standard(metrics: Arc<Metrics>, cors_allow_origin: impl Into<String>) -> Self {
        Self::new(vec![
            Arc::new(CorrelationId),
            Arc::new(ResponseLogging::new(metrics)),
            Arc::new(Cors::new(cors_allow_origin)),
            Arc::new(ErrorTranslation),
            Arc::new(BodyValidation),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run `request` through every stage to `endpoint`. Always yields an
    /// enveloped response.
    pub async fn run(&self, request: ApiRequest, endpoint: &dyn Endpoint) -> ApiResponse {
        let next = Next {
            stages: &self.stages,
            endpoint,
        };

        match next.run(request).await {
            Ok(response) => response,
            Err(e) => {
                // Only reachable for chains built without ErrorTranslation
                tracing::error!(error = %e, "Unhandled error escaped the middleware chain");
                ApiResponse::from_error(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::CREATE_ORDER_SCHEMA;
    use crate::errors::ErrorCode;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEndpoint {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Endpoint for CountingEndpoint {
        async fn call(&self, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ApiResponse::data(200, json!({ "path": request.path })))
        }
    }

    struct FailingEndpoint(ServiceError);

    #[async_trait]
    impl Endpoint for FailingEndpoint {
        async fn call(&self, _request: ApiRequest) -> Result<ApiResponse, ServiceError> {
            Err(self.0.clone())
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::standard(Arc::new(Metrics::new().unwrap()), "*")
    }

    #[test]
    fn test_standard_stage_order() {
        assert_eq!(
            pipeline().stage_names(),
            vec![
                "correlation_id",
                "response_logging",
                "cors",
                "error_translation",
                "body_validation"
            ]
        );
    }

    #[tokio::test]
    async fn test_success_carries_correlation_and_cors() {
        let endpoint = CountingEndpoint::default();
        let request = ApiRequest::new("GET", "/orders/o-1").with_header(CORRELATION_HEADER, "corr-1");

        let response = pipeline().run(request, &endpoint).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.header(CORRELATION_HEADER), Some("corr-1"));
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        assert_eq!(response.envelope()["metadata"]["correlationId"], "corr-1");
    }

    #[tokio::test]
    async fn test_missing_correlation_id_is_generated() {
        let endpoint = CountingEndpoint::default();
        let response = pipeline().run(ApiRequest::new("GET", "/x"), &endpoint).await;

        let id = response.header(CORRELATION_HEADER).unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_eq!(response.envelope()["metadata"]["correlationId"], Value::String(id));
    }

    #[tokio::test]
    async fn test_validation_failure_short_circuits_handler() {
        let endpoint = CountingEndpoint::default();
        let request = ApiRequest::new("POST", "/orders")
            .with_body(r#"{ "customerId": "c-1" }"#)
            .with_input(Input::body(&CREATE_ORDER_SCHEMA));

        let response = pipeline().run(request, &endpoint).await;

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
        assert_eq!(response.status, 400);
        assert_eq!(response.error_code(), Some(ErrorCode::ValidationError));
        assert!(response.header(CORRELATION_HEADER).is_some());
        assert!(response.header("access-control-allow-origin").is_some());
    }

    #[tokio::test]
    async fn test_handler_error_is_translated_and_tagged() {
        let endpoint = FailingEndpoint(ServiceError::VersionConflict {
            id: "o-1".into(),
            expected: 1,
            actual: Some(2),
        });
        let request = ApiRequest::new("PUT", "/orders/o-1").with_header(CORRELATION_HEADER, "c-9");

        let response = pipeline().run(request, &endpoint).await;
        let body = response.envelope();

        assert_eq!(response.status, 409);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VERSION_CONFLICT");
        assert_eq!(body["metadata"]["correlationId"], "c-9");
    }

    #[tokio::test]
    async fn test_preflight_never_reaches_handler() {
        let endpoint = CountingEndpoint::default();
        let response = pipeline().run(ApiRequest::new("OPTIONS", "/orders"), &endpoint).await;

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
        assert!(response.is_success());
        assert!(response.header("access-control-allow-methods").is_some());
    }

    #[tokio::test]
    async fn test_bare_pipeline_still_envelopes_errors() {
        let endpoint = FailingEndpoint(ServiceError::Internal("disk on fire".into()));
        let response = Pipeline::new(Vec::new())
            .run(ApiRequest::new("GET", "/"), &endpoint)
            .await;

        assert_eq!(response.status, 500);
        assert_eq!(response.envelope()["error"]["message"], "Internal server error");
    }
}
