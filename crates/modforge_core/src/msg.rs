use crate::{JobStatus, LocalId, ModFile, PollTicket, Preset};

/// Fields of one status query response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: JobStatus,
    pub processed_url: Option<String>,
    pub error_message: Option<String>,
    pub tokens_used: Option<u32>,
    pub credits_used: Option<u32>,
}

impl StatusReport {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            processed_url: None,
            error_message: None,
            tokens_used: None,
            credits_used: None,
        }
    }
}

/// A server-side job listed by the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJobSummary {
    pub server_job_id: String,
    pub status: Option<JobStatus>,
    pub mod_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size_bytes: Option<u64>,
    pub credits_used: Option<u32>,
    pub error_message: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryPage {
    pub page: u32,
    pub limit: u32,
    pub jobs: Vec<RemoteJobSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// UI is up; load the preset catalog.
    Started,
    /// User dropped or selected files.
    FilesDropped(Vec<ModFile>),
    /// User picked a preset (None clears the selection).
    PresetSelected(Option<String>),
    /// User edited the custom instructions.
    PromptChanged(String),
    /// User asked to process a job with the current preset and prompt.
    ProcessClicked { local_id: LocalId },
    DownloadClicked { local_id: LocalId },
    RemoveClicked { local_id: LocalId },
    ClearFinishedClicked,
    HistoryRequested {
        page: u32,
        limit: u32,
        status: Option<JobStatus>,
    },
    /// User asked for the result of a job listed in history.
    HistoryDownloadClicked { server_job_id: String },
    /// Tear the session down, cancelling every poll handle.
    ShutdownRequested,
    Tick,

    PresetsLoaded(Vec<Preset>),
    PresetsFailed { message: String },
    UploadStarted { local_id: LocalId },
    UploadSucceeded {
        local_id: LocalId,
        server_job_id: String,
        status: JobStatus,
        mod_type: Option<String>,
        error_message: Option<String>,
    },
    UploadFailed { local_id: LocalId, message: String },
    ProcessingAccepted { local_id: LocalId, ticket: PollTicket },
    ProcessingRejected {
        local_id: LocalId,
        ticket: PollTicket,
        message: String,
    },
    StatusPolled {
        local_id: LocalId,
        ticket: PollTicket,
        report: StatusReport,
    },
    /// Poll handle hit its ceiling without a terminal status.
    PollTimedOut {
        local_id: LocalId,
        ticket: PollTicket,
        message: String,
    },
    DownloadResolved { local_id: LocalId, location: String },
    DownloadFailed { local_id: LocalId, message: String },
    HistoryLoaded(HistoryPage),
    HistoryFailed { message: String },
    HistoryDownloadResolved {
        server_job_id: String,
        location: String,
    },
    HistoryDownloadFailed {
        server_job_id: String,
        message: String,
    },
}
