// ============================================================================
// Order Service
// ============================================================================
//
// Order management with optimistic concurrency:
// - HTTP entry points behind a fixed middleware chain
// - version-checked conditional writes against ScyllaDB
// - best-effort domain events on Redpanda
// - batch queue consumer with per-message failure isolation
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod http;
pub mod messaging;
pub mod metrics;
pub mod middleware;
pub mod queue;
pub mod repository;
pub mod service;
pub mod utils;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;
