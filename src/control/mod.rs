//! Coordination primitives shared by download jobs.
//!
//! - [`PermitPool`] - counting limiter bounding concurrently active jobs
//! - [`ResourceLocks`] - per-item mutual exclusion with fail-fast acquisition
//! - [`PauseGate`] - per-job suspend/resume switch driven by an operator
//!
//! Every blocking call takes the job's [`CancellationToken`](tokio_util::sync::CancellationToken)
//! and returns [`JobError::Cancelled`](crate::JobError::Cancelled) when it fires.

pub mod cancel;
mod pause_gate;
mod permit_pool;
mod resource_lock;

pub use pause_gate::PauseGate;
pub use permit_pool::{PermitPool, PoolPermit};
pub use resource_lock::{ResourceGuard, ResourceLocks};
