//! Study backend serving a mixed feed of archived and generated posts.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
