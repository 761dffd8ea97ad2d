use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

/// Conversion knobs carried with each request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Preserve embedded `data:` URIs in the generated markdown
    pub keep_data_uris: bool,
    /// Override the extension derived from the filename
    pub file_extension: Option<String>,
    /// Override the declared MIME type
    pub mimetype: Option<String>,
}

/// One file submitted for conversion.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub options: ConvertOptions,
}

impl ConvertRequest {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            options: ConvertOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }
}

/// What the converter process hands back on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOutput {
    pub markdown: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Job states, in transition order. Transitions are monotonic and
/// one-directional; the tracker is the sole writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum JobState {
    Admitted,
    Queued,
    Dispatched,
    Running,
    Completed,
    Failed,
    TimedOut,
    /// Turned away at admission. Rejected submissions never get a tracked
    /// job, so this state is reported outward only and never stored.
    Rejected,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::TimedOut | JobState::Rejected
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Admitted => write!(f, "admitted"),
            JobState::Queued => write!(f, "queued"),
            JobState::Dispatched => write!(f, "dispatched"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::TimedOut => write!(f, "timed_out"),
            JobState::Rejected => write!(f, "rejected"),
        }
    }
}

/// Broad classification of a failed job, surfaced alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// The converter ran and reported an error for this input
    Conversion,
    /// The converter process died; surfaced with a generic message
    Internal,
    /// The service shut down before the job finished
    ShuttingDown,
}

/// Terminal result delivered to the submitting caller. Exactly one outcome is
/// produced per admitted job.
#[derive(Debug, Clone, Serialize)]
pub enum JobOutcome {
    Completed(ConvertOutput),
    Failed { kind: FailureKind, message: String },
    TimedOut,
}

/// The unit of work flowing through the pipeline. After admission a job lives
/// either in the queue or on exactly one worker slot, never both.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub request: ConvertRequest,
    pub submitted_at: DateTime<Utc>,
    /// Absolute deadline; the tracker kills the conversion when it elapses
    pub deadline: Instant,
}

impl Job {
    pub fn new(request: ConvertRequest, deadline: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            submitted_at: Utc::now(),
            deadline,
        }
    }
}

/// Caller-side handle for one submitted job.
#[derive(Debug)]
pub struct JobHandle {
    pub id: Uuid,
    pub(crate) rx: oneshot::Receiver<JobOutcome>,
}
