//! The bounded job pipeline: job types, the capacity-limited FIFO queue, and
//! the lifecycle tracker that owns every job's state machine.

pub mod job;
pub mod queue;
pub mod tracker;

pub use job::{
    ConvertOptions, ConvertOutput, ConvertRequest, FailureKind, Job, JobHandle, JobOutcome,
    JobState,
};
pub use queue::{EnqueueResult, JobQueue};
pub use tracker::JobTracker;
