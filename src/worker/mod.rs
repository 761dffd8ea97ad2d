//! Worker-side execution: process-isolated conversion and the fixed-size pool.
//!
//! Each conversion runs in a freshly spawned child process so the untrusted,
//! CPU-bound converter can be killed unconditionally. The pool keeps exactly
//! `worker_count` dispatch loops alive; a dead converter process never costs
//! a slot because the next dispatch spawns a new one.

pub mod executor;
pub mod pool;

pub use executor::{ConvertExecutor, ExecOutcome, ExecutionResult};
pub use pool::{SlotState, WorkerPool};
