//! Domain services for the Family Ledger backend.
//!
//! Services contain the business logic that operates on domain models:
//! the join throttle, the lifecycle orchestrator, the expiry sweeper and
//! the notification dispatch abstraction.

pub mod expiry;
pub mod lifecycle;
pub mod notification;
pub mod stores;
pub mod throttle;

pub use expiry::{JoinRequestSweeper, SweepReport};
pub use lifecycle::{FamilyError, FamilyService};
pub use notification::{
    FamilyNotification, FamilyNotifier, LoggingNotifier, NotificationKind, NotificationResult,
};
pub use stores::{
    FamilyStore, InMemoryFamilyStore, InMemoryJoinRequestStore, InMemoryUserStore,
    JoinRequestStore, StoreError, UserStore,
};
pub use throttle::{ThrottleDecision, ThrottleDenial, ThrottlePolicy, ThrottleReason};
