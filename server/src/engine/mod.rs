//! Bulk membership job engine.
//!
//! - `types`: requests, user references, tallies and job reports
//! - `resolver`: per-user resolution and membership changes
//! - `job`: the engine that validates, locks and runs jobs in the background

pub mod job;
pub mod resolver;
pub mod types;

pub use job::{Engine, FinishHook};
pub use resolver::MembershipResolver;
pub use types::{
    BulkOperationRequest, JobAccepted, JobId, JobOutcome, JobReport, ResultTally, UserOutcome,
    UserRef,
};
