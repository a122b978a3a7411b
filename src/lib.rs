//! stackform: template-driven provisioning for storage clusters.
//!
//! A JSON template declares typed parameters, an ordered list of resources
//! whose properties are expressions over earlier results, and named nested
//! templates expanded once per context binding. Every completed resource is
//! journaled so an interrupted run resumes where it stopped.

pub mod cli;
pub mod core;
pub mod journal;
pub mod resources;
pub mod transport;
