use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::value_objects::{OrderItem, OrderStatus, ShippingAddress};
use crate::validation::{Field, IntRule, Kind, NumRule, Schema, Violation, ViolationCode};

// ============================================================================
// Order Requests - validated input shapes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    #[serde(flatten)]
    pub patch: OrderPatch,
    /// Version the caller read; absent means "whatever is current"
    pub expected_version: Option<i64>,
}

/// Mutable subset of an order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// `GET /orders` query parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub customer_id: Option<String>,
    pub status: Option<OrderStatus>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub next_token: Option<String>,
}

fn default_limit() -> u32 {
    20
}

// ============================================================================
// Schemas
// ============================================================================

/// Keeps every order total finite: u32 quantities times this cap stay far
/// below f64 overflow.
pub const MAX_UNIT_PRICE: f64 = 1_000_000.0;

const ITEM_FIELDS: &[Field] = &[
    Field::required("productId", Kind::non_empty_string()),
    Field::required("name", Kind::non_empty_string()),
    Field::required(
        "quantity",
        Kind::Int(IntRule { min: Some(1), max: Some(u32::MAX as i64), coerce: false }),
    ),
    Field::required(
        "price",
        Kind::Num(NumRule { min: Some(0.0), max: Some(MAX_UNIT_PRICE), coerce: false }),
    ),
];

const ADDRESS_FIELDS: &[Field] = &[
    Field::required("street", Kind::non_empty_string()),
    Field::required("city", Kind::non_empty_string()),
    Field::required("state", Kind::non_empty_string()),
    Field::required("postalCode", Kind::non_empty_string()),
];

const ITEM: Kind = Kind::Object(ITEM_FIELDS);

pub static CREATE_ORDER_SCHEMA: Schema = Schema {
    name: "CreateOrderRequest",
    fields: &[
        Field::required("customerId", Kind::non_empty_string()),
        Field::required("customerEmail", Kind::email()),
        Field::required("items", Kind::Array { item: &ITEM, min_items: 1 }),
        Field::required("shippingAddress", Kind::Object(ADDRESS_FIELDS)),
    ],
    refine: None,
};

pub static UPDATE_ORDER_SCHEMA: Schema = Schema {
    name: "UpdateOrderRequest",
    fields: &[
        Field::optional("status", Kind::OneOf(&OrderStatus::ALL)),
        Field::optional("items", Kind::Array { item: &ITEM, min_items: 1 }),
        Field::optional("shippingAddress", Kind::Object(ADDRESS_FIELDS)),
        Field::optional("customerEmail", Kind::email()),
        Field::optional(
            "expectedVersion",
            Kind::Int(IntRule { min: Some(1), max: None, coerce: true }),
        ),
    ],
    refine: Some(require_patch_field),
};

pub static LIST_ORDERS_SCHEMA: Schema = Schema {
    name: "ListOrdersQuery",
    fields: &[
        Field::optional("customerId", Kind::non_empty_string()),
        Field::optional("status", Kind::OneOf(&OrderStatus::ALL)),
        Field::optional("limit", Kind::Int(IntRule { min: Some(1), max: Some(100), coerce: true })),
        Field::optional("nextToken", Kind::non_empty_string()),
    ],
    refine: None,
};

fn require_patch_field(map: &Map<String, Value>) -> Option<Violation> {
    let mutable = ["status", "items", "shippingAddress", "customerEmail"];
    if mutable.iter().any(|name| map.contains_key(*name)) {
        None
    } else {
        Some(Violation::new(
            "",
            ViolationCode::EmptyPatch,
            "At least one of status, items, shippingAddress, customerEmail is required",
        ))
    }
}
