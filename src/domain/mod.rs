//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod experiments;
pub mod generated;
pub mod sampling;
pub mod types;
