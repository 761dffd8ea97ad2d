//! Admission control: the synchronous gate in front of the queue.
//!
//! Every check here is immediate; nothing on this path blocks. Payload size
//! and file type are plain comparisons, and the per-client rate budget is a
//! keyed GCRA limiter, so concurrent submissions cannot over-admit a client.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tokio::time::Instant;

use crate::config::ServiceConfig;
use crate::error::{ConvertError, RejectionReason, Result};
use crate::pipeline::job::{ConvertRequest, Job};

type ClientLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

pub struct AdmissionController {
    max_payload_bytes: usize,
    allowed_extensions: HashSet<String>,
    job_deadline: Duration,
    limiter: ClientLimiter,
}

impl AdmissionController {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let burst = NonZeroU32::new(config.rate_limit)
            .ok_or_else(|| ConvertError::InvalidConfig("rate_limit must be at least 1".into()))?;
        let period = config
            .rate_window
            .checked_div(config.rate_limit)
            .filter(|p| !p.is_zero())
            .ok_or_else(|| {
                ConvertError::InvalidConfig(
                    "rate_window is too short for the configured rate_limit".into(),
                )
            })?;
        let quota = Quota::with_period(period)
            .ok_or_else(|| ConvertError::InvalidConfig("rate quota period must be non-zero".into()))?
            .allow_burst(burst);

        Ok(Self {
            max_payload_bytes: config.max_payload_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            job_deadline: config.job_deadline,
            limiter: RateLimiter::keyed(quota),
        })
    }

    /// Evaluate one submission. On success the job is constructed with its id
    /// and deadline assigned; on rejection nothing is registered anywhere.
    ///
    /// The rate budget is charged when the limit is evaluated, regardless of
    /// what happens to the job downstream.
    pub fn admit(
        &self,
        request: ConvertRequest,
        client: &str,
    ) -> std::result::Result<Job, RejectionReason> {
        if request.bytes.len() > self.max_payload_bytes {
            return Err(RejectionReason::PayloadTooLarge {
                size: request.bytes.len(),
                max: self.max_payload_bytes,
            });
        }

        let extension = declared_extension(&request);
        match &extension {
            Some(ext) if self.allowed_extensions.contains(ext) => {}
            _ => {
                return Err(RejectionReason::UnsupportedType {
                    extension: extension.unwrap_or_else(|| "(none)".to_string()),
                });
            }
        }

        if self.limiter.check_key(&client.to_string()).is_err() {
            return Err(RejectionReason::RateLimited {
                client: client.to_string(),
            });
        }

        Ok(Job::new(request, Instant::now() + self.job_deadline))
    }
}

/// Extension declared for the payload: the explicit option wins, otherwise it
/// is derived from the filename. Normalized to lower case without the dot.
fn declared_extension(request: &ConvertRequest) -> Option<String> {
    let raw = match &request.options.file_extension {
        Some(ext) => ext.as_str(),
        None => {
            let (_, ext) = request.filename.rsplit_once('.')?;
            ext
        }
    };
    let normalized = raw.trim_start_matches('.').to_ascii_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}
