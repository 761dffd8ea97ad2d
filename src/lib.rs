//! convertd: a bounded concurrent job pipeline for file-to-markdown conversion.
//!
//! Jobs pass through admission control (size, type, and per-client rate
//! checks), a capacity-limited FIFO queue, and a fixed-size worker pool that
//! runs each conversion in a separate OS process so a hung or crashing
//! converter can always be killed without taking the service down with it.
//!
//! The HTTP layer that feeds this pipeline lives outside the crate; it
//! consumes [`service::ConvertService::submit`] and
//! [`service::ConvertService::await_result`].

pub mod admission;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod service;
pub mod shutdown;
pub mod worker;

/// Initialize tracing output from `RUST_LOG`. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
