// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Pure domain types and rules. Persistence and messaging live elsewhere.
//
// ============================================================================

pub mod order;
