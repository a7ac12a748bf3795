use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use std::collections::HashMap;
use std::sync::Arc;

use super::handlers::{NoRouteEndpoint, OrderEndpoint};
use super::routes::match_route;
use crate::metrics::Metrics;
use crate::middleware::{ApiRequest, ApiResponse, Pipeline};
use crate::service::OrderService;

// ============================================================================
// HTTP Server
// ============================================================================
//
// `Api` is the framework-free entry point: route match, then the middleware
// chain. The actix-web layer only converts requests and responses, and
// serves /health and /metrics next to it.
//
// ============================================================================

pub struct Api {
    service: Arc<OrderService>,
    pipeline: Pipeline,
}

impl Api {
    pub fn new(service: Arc<OrderService>, pipeline: Pipeline) -> Self {
        Self { service, pipeline }
    }

    pub async fn handle(&self, mut request: ApiRequest) -> ApiResponse {
        match match_route(&request.method, &request.path) {
            Some(matched) => {
                request.path_params = matched.params;
                request.input = matched.route.input;
                let endpoint = OrderEndpoint::new(self.service.clone(), matched.route.action);
                self.pipeline.run(request, &endpoint).await
            }
            None => self.pipeline.run(request, &NoRouteEndpoint).await,
        }
    }
}

pub struct AppState {
    pub api: Api,
    pub metrics: Arc<Metrics>,
}

pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    tracing::info!("🌐 Starting HTTP server on http://{}:{}", host, port);

    let data = web::Data::from(state);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/health", web::get().to(health_handler))
            .route("/metrics", web::get().to(metrics_handler))
            .default_service(web::to(dispatch))
    })
    .bind((host, port))?
    .run()
    .await
}

async fn dispatch(req: HttpRequest, body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    let request = to_api_request(&req, &body);
    let response = state.api.handle(request).await;
    to_http_response(&response)
}

fn to_api_request(req: &HttpRequest, body: &[u8]) -> ApiRequest {
    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Unparsable query string, ignoring");
            HashMap::new()
        });

    ApiRequest {
        headers,
        query,
        body: body.to_vec(),
        ..ApiRequest::new(req.method().as_str(), req.path())
    }
}

fn to_http_response(response: &ApiResponse) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);
    for (name, value) in &response.headers {
        builder.insert_header((name.as_str(), value.as_str()));
    }
    builder.json(response.envelope())
}

async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    match state.metrics.render() {
        Ok(text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(text),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": crate::events::EVENT_SOURCE
    }))
}
