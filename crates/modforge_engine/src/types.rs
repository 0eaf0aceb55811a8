use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type LocalId = u64;
pub type PollTicket = u64;

/// Job status strings used by the API service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    Uploaded,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl RemoteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Local file to send in an upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSource {
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    pub job_id: String,
    pub status: RemoteStatus,
    #[serde(default)]
    pub mod_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresetRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub credit_cost: u32,
    #[serde(default)]
    pub game_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRequest {
    pub preset_id: String,
    pub prompt: String,
    pub model_config: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobStatusReport {
    pub status: RemoteStatus,
    #[serde(default)]
    pub processed_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    #[serde(default)]
    pub credits_used: Option<u32>,
}

/// A server-side job as listed by the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteJob {
    pub id: String,
    pub status: RemoteStatus,
    #[serde(default)]
    pub mod_type: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub original_file_size: Option<u64>,
    #[serde(default)]
    pub processed_url: Option<String>,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    #[serde(default)]
    pub credits_used: Option<u32>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct JobPage {
    #[serde(default)]
    pub jobs: Vec<RemoteJob>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    InvalidUrl,
    Transport,
    Timeout,
    /// Non-success HTTP status; the message carries the server's error text.
    ServerRejected(u16),
    Malformed,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::InvalidUrl => write!(f, "invalid url"),
            ApiErrorKind::Transport => write!(f, "network error"),
            ApiErrorKind::Timeout => write!(f, "timeout"),
            ApiErrorKind::ServerRejected(code) => write!(f, "rejected with http status {code}"),
            ApiErrorKind::Malformed => write!(f, "malformed response"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transport-level failures, as opposed to an answer from the server.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Transport | ApiErrorKind::Timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    PresetsLoaded(Result<Vec<PresetRecord>, ApiError>),
    UploadStarted {
        local_id: LocalId,
    },
    UploadCompleted {
        local_id: LocalId,
        result: Result<UploadReceipt, ApiError>,
    },
    ProcessingAccepted {
        local_id: LocalId,
        ticket: PollTicket,
    },
    ProcessingRejected {
        local_id: LocalId,
        ticket: PollTicket,
        error: ApiError,
    },
    StatusPolled {
        local_id: LocalId,
        ticket: PollTicket,
        report: JobStatusReport,
    },
    /// A status query failed; the poller keeps going.
    PollFailed {
        local_id: LocalId,
        ticket: PollTicket,
        error: ApiError,
        consecutive: u32,
    },
    PollTimedOut {
        local_id: LocalId,
        ticket: PollTicket,
        reason: String,
    },
    /// `local_id` is None when the job was picked from history.
    DownloadResolved {
        local_id: Option<LocalId>,
        server_job_id: String,
        result: Result<String, ApiError>,
    },
    HistoryLoaded(Result<JobPage, ApiError>),
}
