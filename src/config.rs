use std::time::Duration;

use crate::error::{ConvertError, Result};

/// Command used to run one conversion in an isolated child process.
///
/// The worker writes the payload to the child's stdin and reads a single JSON
/// object (`markdown`, `title`, `metadata`) from its stdout. Conversion hints
/// travel in `CONVERTD_*` environment variables so the command line stays
/// fixed.
#[derive(Debug, Clone)]
pub struct ConverterCommand {
    /// Program to spawn for each conversion
    pub program: String,
    /// Fixed arguments passed before any job-specific environment
    pub args: Vec<String>,
}

impl Default for ConverterCommand {
    fn default() -> Self {
        Self {
            program: "markitdown-worker".to_string(),
            args: Vec::new(),
        }
    }
}

impl ConverterCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Configuration surface consumed by the pipeline at startup.
///
/// Concurrency, queue depth, payload size, rate budget, and the job deadline
/// are all fixed here; none of them are elastic at runtime.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Number of worker slots; one conversion process runs per busy slot
    pub worker_count: usize,
    /// Maximum jobs waiting for a free slot; admission rejects beyond this
    pub queue_capacity: usize,
    /// Largest accepted payload in bytes
    pub max_payload_bytes: usize,
    /// Requests allowed per client identity within `rate_window`
    pub rate_limit: u32,
    /// Window over which `rate_limit` applies
    pub rate_window: Duration,
    /// Deadline per job, measured from admission
    pub job_deadline: Duration,
    /// How long a graceful shutdown waits for in-flight conversions
    pub shutdown_grace: Duration,
    /// Lower-case file extensions (no dot) accepted at admission
    pub allowed_extensions: Vec<String>,
    /// Converter child-process command
    pub converter: ConverterCommand,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 100,
            max_payload_bytes: 100 * 1024 * 1024,
            rate_limit: 60,
            rate_window: Duration::from_secs(60),
            job_deadline: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(10),
            allowed_extensions: default_extensions(),
            converter: ConverterCommand::default(),
        }
    }
}

impl ServiceConfig {
    pub fn with_workers(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    pub fn with_rate_limit(mut self, limit: u32, window: Duration) -> Self {
        self.rate_limit = limit;
        self.rate_window = window;
        self
    }

    pub fn with_job_deadline(mut self, deadline: Duration) -> Self {
        self.job_deadline = deadline;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_converter(mut self, converter: ConverterCommand) -> Self {
        self.converter = converter;
        self
    }

    /// Check the configuration before any component is built from it.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(ConvertError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConvertError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_payload_bytes must be at least 1".to_string(),
            ));
        }
        if self.rate_limit == 0 {
            return Err(ConvertError::InvalidConfig(
                "rate_limit must be at least 1".to_string(),
            ));
        }
        if self.rate_window.is_zero() {
            return Err(ConvertError::InvalidConfig(
                "rate_window must be non-zero".to_string(),
            ));
        }
        if self.job_deadline.is_zero() {
            return Err(ConvertError::InvalidConfig(
                "job_deadline must be non-zero".to_string(),
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err(ConvertError::InvalidConfig(
                "allowed_extensions must not be empty".to_string(),
            ));
        }
        if self.converter.program.is_empty() {
            return Err(ConvertError::InvalidConfig(
                "converter program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// File types the stock converter understands.
fn default_extensions() -> Vec<String> {
    [
        "pdf", "docx", "doc", "pptx", "ppt", "xlsx", "xls", "csv", "html", "htm", "epub", "msg",
        "mp3", "m4a", "wav", "jpg", "jpeg", "png", "gif", "bmp", "xml", "rss", "txt", "md", "json",
        "ipynb", "zip",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
