//! Repository implementations of the domain store traits.
//!
//! Each repository wraps a `PgPool` and hides its SQL behind the trait
//! the domain services consume. Query durations are recorded through
//! `QueryTimer`.

pub mod family;
pub mod join_request;
pub mod user;

pub use family::FamilyRepository;
pub use join_request::JoinRequestRepository;
pub use user::UserRepository;

use domain::services::StoreError;

/// Maps a database error into the domain-facing store error.
pub(crate) fn store_error(operation: &str, err: sqlx::Error) -> StoreError {
    tracing::error!(operation = operation, error = %err, "Database operation failed");
    StoreError::Unavailable(format!("{}: {}", operation, err))
}
