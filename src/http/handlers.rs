use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::routes::Action;
use crate::domain::order::{CreateOrderRequest, ListOrdersQuery, UpdateOrderRequest};
use crate::errors::ServiceError;
use crate::middleware::{ApiRequest, ApiResponse, Endpoint};
use crate::service::OrderService;

// ============================================================================
// Order Handlers
// ============================================================================
//
// Handlers read typed input the validation stage already accepted and
// return `ServiceError`s as-is; the chain turns them into envelopes.
//
// ============================================================================

pub struct OrderEndpoint {
    service: Arc<OrderService>,
    action: Action,
}

impl OrderEndpoint {
    pub fn new(service: Arc<OrderService>, action: Action) -> Self {
        Self { service, action }
    }
}

#[async_trait]
impl Endpoint for OrderEndpoint {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
        match self.action {
            Action::CreateOrder => create_order(&self.service, request).await,
            Action::ListOrders => list_orders(&self.service, request).await,
            Action::GetOrder => get_order(&self.service, request).await,
            Action::UpdateOrder => update_order(&self.service, request).await,
            Action::DeleteOrder => delete_order(&self.service, request).await,
        }
    }
}

/// Endpoint for requests no route matched
pub struct NoRouteEndpoint;

#[async_trait]
impl Endpoint for NoRouteEndpoint {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
        Err(ServiceError::NoRoute {
            method: request.method,
            path: request.path,
        })
    }
}

async fn create_order(service: &OrderService, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
    let input: CreateOrderRequest = request.input_as()?;
    let order = service.create_order(input, &request.correlation_id).await?;
    ApiResponse::json(201, &order)
}

async fn list_orders(service: &OrderService, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
    let query: ListOrdersQuery = request.input_as()?;
    let page = service.list_orders(query).await?;

    let count = page.items.len();
    let mut response = ApiResponse::json(200, &page.items)?.with_metadata("count", count);
    if let Some(token) = page.next_token {
        response = response.with_metadata("nextToken", token);
    }
    Ok(response)
}

async fn get_order(service: &OrderService, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
    let order = service.get_order(request.path_param("orderId")?).await?;
    ApiResponse::json(200, &order)
}

async fn update_order(service: &OrderService, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
    let input: UpdateOrderRequest = request.input_as()?;
    let order_id = request.path_param("orderId")?;
    let order = service
        .update_order(order_id, input, &request.correlation_id)
        .await?;
    ApiResponse::json(200, &order)
}

async fn delete_order(service: &OrderService, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
    let order_id = request.path_param("orderId")?;
    service.delete_order(order_id, &request.correlation_id).await?;
    Ok(ApiResponse::data(200, json!({ "orderId": order_id, "deleted": true })))
}
