//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod family;
pub mod join_request;
pub mod user;

pub use family::FamilyEntity;
pub use join_request::{JoinRequestEntity, JoinRequestStatusDb};
pub use user::FamilyUserEntity;
