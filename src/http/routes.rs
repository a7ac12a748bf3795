use std::collections::HashMap;

use crate::domain::order::{CREATE_ORDER_SCHEMA, LIST_ORDERS_SCHEMA, UPDATE_ORDER_SCHEMA};
use crate::middleware::Input;

// ============================================================================
// Route Table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateOrder,
    ListOrders,
    GetOrder,
    UpdateOrder,
    DeleteOrder,
}

pub struct Route {
    pub method: &'static str,
    /// Segments; `{name}` captures a path parameter
    pub pattern: &'static str,
    pub action: Action,
    pub input: Option<Input>,
}

pub static ROUTES: &[Route] = &[
    Route {
        method: "POST",
        pattern: "/orders",
        action: Action::CreateOrder,
        input: Some(Input::body(&CREATE_ORDER_SCHEMA)),
    },
    Route {
        method: "GET",
        pattern: "/orders",
        action: Action::ListOrders,
        input: Some(Input::query(&LIST_ORDERS_SCHEMA)),
    },
    Route {
        method: "GET",
        pattern: "/orders/{orderId}",
        action: Action::GetOrder,
        input: None,
    },
    Route {
        method: "PUT",
        pattern: "/orders/{orderId}",
        action: Action::UpdateOrder,
        input: Some(Input::body(&UPDATE_ORDER_SCHEMA)),
    },
    Route {
        method: "DELETE",
        pattern: "/orders/{orderId}",
        action: Action::DeleteOrder,
        input: None,
    },
];

pub struct RouteMatch {
    pub route: &'static Route,
    pub params: HashMap<String, String>,
}

/// Find the route for `method` + `path`; trailing slashes are ignored
pub fn match_route(method: &str, path: &str) -> Option<RouteMatch> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    ROUTES
        .iter()
        .filter(|route| route.method.eq_ignore_ascii_case(method))
        .find_map(|route| {
            let pattern: Vec<&str> = route.pattern.split('/').filter(|s| !s.is_empty()).collect();
            if pattern.len() != segments.len() {
                return None;
            }

            let mut params = HashMap::new();
            for (expected, actual) in pattern.iter().zip(&segments) {
                match expected.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                    Some(name) => {
                        params.insert(name.to_string(), (*actual).to_string());
                    }
                    None if expected == actual => {}
                    None => return None,
                }
            }

            Some(RouteMatch { route, params })
        })
}
