//! Core engine: value model, template loading, expressions, scope,
//! group expansion and the lifecycle driver.

pub mod error;
pub mod executor;
pub mod expander;
pub mod expr;
pub mod parser;
pub mod scope;
pub mod types;
