//! Domain layer for the Family Ledger backend.
//!
//! This crate contains:
//! - Domain models (Family, JoinRequest, FamilyUser)
//! - The join-request lifecycle core: throttle engine, orchestrator, sweeper
//! - Store traits with in-memory implementations for tests
//! - Notification dispatch abstraction

pub mod models;
pub mod services;
