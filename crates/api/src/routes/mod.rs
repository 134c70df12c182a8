//! HTTP route handlers.

pub mod families;
pub mod health;
pub mod invitations;
pub mod join_requests;
