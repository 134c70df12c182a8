//! Domain models for the Family Ledger backend.

pub mod family;
pub mod join_request;
pub mod user;

pub use family::Family;
pub use join_request::{JoinRequest, JoinRequestStatus};
pub use user::FamilyUser;
