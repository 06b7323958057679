//! Application services: feed serving, interactions, experiments, auth, generation.

pub mod ai_queue;
pub mod auth;
pub mod error;
pub mod experiments;
pub mod feed;
pub mod generation;
pub mod interactions;
pub mod repos;
pub mod sampling;
