use crate::{JobStatus, LocalId, ModFile, PollTicket, ProcessingRequest};

/// IO the UI layer must hand to the engine after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    LoadPresets,
    Upload {
        local_id: LocalId,
        file: ModFile,
    },
    /// Send the processing request and, once accepted, poll under `ticket`.
    RequestProcessing {
        local_id: LocalId,
        server_job_id: String,
        ticket: PollTicket,
        request: ProcessingRequest,
    },
    CancelPoll {
        local_id: LocalId,
    },
    /// `local_id` is None for a job picked from history.
    ResolveDownload {
        local_id: Option<LocalId>,
        server_job_id: String,
    },
    FetchHistory {
        page: u32,
        limit: u32,
        status: Option<JobStatus>,
    },
    Shutdown,
}
