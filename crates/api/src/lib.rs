//! Family Ledger backend API.
//!
//! HTTP surface, configuration and background jobs for the family
//! membership and join-request lifecycle.

pub mod app;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod middleware;
pub mod routes;
