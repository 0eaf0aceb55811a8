use crate::{CatalogState, HistoryPage, Job, JobStatus, LocalId, Notice, Preset, SessionState};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub session: SessionState,
    pub job_count: usize,
    pub active_polls: usize,
    pub jobs: Vec<JobRowView>,
    pub presets: Vec<Preset>,
    pub catalog_state: CatalogState,
    pub catalog_warning: Option<String>,
    pub selected_preset: Option<String>,
    pub custom_prompt: String,
    pub history: Option<HistoryPage>,
    pub notices: Vec<Notice>,
    pub stale_events: u64,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRowView {
    pub local_id: LocalId,
    pub file_name: String,
    pub size_bytes: u64,
    pub mod_type: Option<String>,
    pub status: JobStatus,
    pub server_job_id: Option<String>,
    pub error_message: Option<String>,
    pub download_ref: Option<String>,
    pub tokens_used: Option<u32>,
    pub credits_used: Option<u32>,
    pub can_process: bool,
    pub can_download: bool,
}

impl JobRowView {
    pub(crate) fn from_job(job: &Job) -> Self {
        Self {
            local_id: job.local_id,
            file_name: job.file_name().to_string(),
            size_bytes: job.file_size_bytes(),
            mod_type: job.mod_type.clone(),
            status: job.status,
            server_job_id: job.server_job_id.clone(),
            error_message: job.error_message.clone(),
            download_ref: job.download_ref.clone(),
            tokens_used: job.tokens_used,
            credits_used: job.credits_used,
            can_process: job.status == JobStatus::Uploaded
                && job.server_job_id.is_some()
                && !job.has_active_poll(),
            can_download: job.status == JobStatus::Completed,
        }
    }

    /// Size in MiB with one decimal, as shown next to the file name.
    pub fn size_label(&self) -> String {
        format!("{:.1} MB", self.size_bytes as f64 / (1024.0 * 1024.0))
    }
}
