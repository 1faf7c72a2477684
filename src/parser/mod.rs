// Aggregate expression parser module

pub mod aggregate;
pub mod lexer;

// Public API re-exports
pub use aggregate::parse_aggregate_expr;
