//! Background job scheduler and job implementations.

mod expire_join_requests;
mod pool_metrics;
mod scheduler;

pub use expire_join_requests::ExpireJoinRequestsJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::JobScheduler;
