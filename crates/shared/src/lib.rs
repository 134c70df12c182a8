//! Shared utilities and common types for the Family Ledger backend.
//!
//! This crate provides common functionality used across all other crates:
//! - JWT access token verification
//! - Common validation logic (family names, aliases, emails)
//! - The injectable clock used by all time-dependent domain logic

pub mod clock;
pub mod jwt;
pub mod validation;
