use crate::view_model::{AppViewModel, JobRowView};
use crate::{
    Effect, FilePolicy, HistoryPage, Job, JobPatch, JobRegistry, JobStatus, LocalId, ModFile,
    OrchestratorError, PollTicket, Preset, PresetCatalog, ProcessingRequest, RemoteJobSummary,
    StatusReport,
};

const UPLOAD_FAILED: &str = "Upload failed";
const DEFAULT_HISTORY_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Running,
    Closed,
}

/// Something the UI should show inline once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Rejected(OrchestratorError),
    CatalogUnavailable(String),
    DownloadFailed { local_id: LocalId, message: String },
    HistoryFailed(String),
    HistoryDownloadFailed { server_job_id: String, message: String },
}

/// A freshly resolved, possibly single-use download location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReady {
    /// None when the job was picked from history rather than uploaded here.
    pub local_id: Option<LocalId>,
    pub server_job_id: String,
    pub file_name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    registry: JobRegistry,
    catalog: PresetCatalog,
    policy: FilePolicy,
    session: SessionState,
    selected_preset: Option<String>,
    custom_prompt: String,
    history: Option<HistoryPage>,
    notices: Vec<Notice>,
    downloads: Vec<DownloadReady>,
    stale_events: u64,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: FilePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &PresetCatalog {
        &self.catalog
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn get_job(&self, local_id: LocalId) -> Option<&Job> {
        self.registry.get_job(local_id)
    }

    pub fn list_jobs(&self) -> impl Iterator<Item = &Job> + '_ {
        self.registry.list_jobs()
    }

    pub fn get_preset(&self, id: &str) -> Option<&Preset> {
        self.catalog.get_preset(id)
    }

    pub fn selected_preset(&self) -> Option<&str> {
        self.selected_preset.as_deref()
    }

    pub fn custom_prompt(&self) -> &str {
        &self.custom_prompt
    }

    /// Number of engine results dropped because their job or ticket was gone.
    pub fn stale_events(&self) -> u64 {
        self.stale_events
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            session: self.session,
            job_count: self.registry.len(),
            active_polls: self.registry.active_polls(),
            jobs: self.registry.list_jobs().map(JobRowView::from_job).collect(),
            presets: self.catalog.presets().to_vec(),
            catalog_state: self.catalog.state(),
            catalog_warning: self.catalog.warning().map(str::to_string),
            selected_preset: self.selected_preset.clone(),
            custom_prompt: self.custom_prompt.clone(),
            history: self.history.clone(),
            notices: self.notices.clone(),
            stale_events: self.stale_events,
            dirty: self.dirty,
        }
    }

    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn take_downloads(&mut self) -> Vec<DownloadReady> {
        std::mem::take(&mut self.downloads)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
        self.mark_dirty();
    }

    pub(crate) fn set_selected_preset(&mut self, preset_id: Option<String>) {
        self.selected_preset = preset_id.filter(|id| !id.trim().is_empty());
        self.mark_dirty();
    }

    pub(crate) fn set_custom_prompt(&mut self, prompt: String) {
        self.custom_prompt = prompt;
        self.mark_dirty();
    }

    fn ensure_running(&self) -> Result<(), OrchestratorError> {
        match self.session {
            SessionState::Running => Ok(()),
            SessionState::Closed => Err(OrchestratorError::SessionClosed),
        }
    }

    /// Starts the one catalog load of the session. Later calls are no-ops.
    pub fn load_presets(&mut self) -> Vec<Effect> {
        if self.session == SessionState::Closed || !self.catalog.begin_load() {
            return Vec::new();
        }
        self.mark_dirty();
        vec![Effect::LoadPresets]
    }

    /// Registers a queued job for `file` and returns the upload to perform.
    pub fn submit(&mut self, file: ModFile) -> Result<(LocalId, Effect), OrchestratorError> {
        self.ensure_running()?;
        self.policy.check(&file)?;
        let local_id = self.registry.create_job(file.clone());
        self.mark_dirty();
        Ok((local_id, Effect::Upload { local_id, file }))
    }

    pub fn request_processing(
        &mut self,
        local_id: LocalId,
        preset_id: Option<&str>,
        custom_prompt: &str,
    ) -> Result<Effect, OrchestratorError> {
        self.ensure_running()?;
        let job = self
            .registry
            .get_job(local_id)
            .ok_or(OrchestratorError::NotFound(local_id))?;
        if job.has_active_poll() || job.status == JobStatus::Processing {
            return Err(OrchestratorError::AlreadyInProgress(local_id));
        }
        let server_job_id = job.server_job_id.clone().ok_or_else(|| {
            OrchestratorError::InvalidState(format!("job {local_id} has not been uploaded"))
        })?;
        if job.status != JobStatus::Uploaded {
            return Err(OrchestratorError::InvalidState(format!(
                "job {local_id} is {}, expected uploaded",
                job.status
            )));
        }

        let ticket = self.registry.issue_ticket(local_id)?;
        self.mark_dirty();
        Ok(Effect::RequestProcessing {
            local_id,
            server_job_id,
            ticket,
            request: ProcessingRequest::new(preset_id, custom_prompt),
        })
    }

    pub fn resolve_download(&mut self, local_id: LocalId) -> Result<Effect, OrchestratorError> {
        self.ensure_running()?;
        let job = self
            .registry
            .get_job(local_id)
            .ok_or(OrchestratorError::NotFound(local_id))?;
        if job.status != JobStatus::Completed {
            return Err(OrchestratorError::InvalidState(format!(
                "job {local_id} is {}, expected completed",
                job.status
            )));
        }
        let server_job_id = job.server_job_id.clone().ok_or_else(|| {
            OrchestratorError::InvalidState(format!("job {local_id} has no server job id"))
        })?;
        Ok(Effect::ResolveDownload {
            local_id: Some(local_id),
            server_job_id,
        })
    }

    /// Resolves the result of a server-side job that need not be tracked
    /// locally. A job the loaded history page lists with a status other than
    /// completed is refused.
    pub fn resolve_history_download(
        &mut self,
        server_job_id: &str,
    ) -> Result<Effect, OrchestratorError> {
        self.ensure_running()?;
        let server_job_id = server_job_id.trim();
        if server_job_id.is_empty() {
            return Err(OrchestratorError::InvalidState("server job id is empty".to_string()));
        }
        if let Some(status) = self
            .history_entry(server_job_id)
            .and_then(|entry| entry.status)
            .filter(|status| *status != JobStatus::Completed)
        {
            return Err(OrchestratorError::InvalidState(format!(
                "server job {server_job_id} is {status}, expected completed"
            )));
        }
        Ok(Effect::ResolveDownload {
            local_id: None,
            server_job_id: server_job_id.to_string(),
        })
    }

    fn history_entry(&self, server_job_id: &str) -> Option<&RemoteJobSummary> {
        self.history
            .as_ref()?
            .jobs
            .iter()
            .find(|entry| entry.server_job_id == server_job_id)
    }

    /// Removes the job; a live poll handle is cancelled along with it.
    pub fn remove_job(&mut self, local_id: LocalId) -> Result<Vec<Effect>, OrchestratorError> {
        let removed = self.registry.remove_job(local_id)?;
        self.mark_dirty();
        Ok(if removed.has_active_poll() {
            vec![Effect::CancelPoll { local_id }]
        } else {
            Vec::new()
        })
    }

    pub fn clear_finished(&mut self) -> Vec<LocalId> {
        let cleared = self.registry.clear_finished();
        if !cleared.is_empty() {
            self.mark_dirty();
        }
        cleared
    }

    /// `limit` 0 means the server default page size. `status` narrows the
    /// listing to one job status.
    pub fn fetch_history(
        &mut self,
        page: u32,
        limit: u32,
        status: Option<JobStatus>,
    ) -> Result<Effect, OrchestratorError> {
        self.ensure_running()?;
        Ok(Effect::FetchHistory {
            page: page.max(1),
            limit: if limit == 0 { DEFAULT_HISTORY_LIMIT } else { limit },
            status,
        })
    }

    /// Closes the session. Every live poll handle is cancelled and any result
    /// still in flight is discarded on arrival.
    pub fn shutdown(&mut self) -> Vec<Effect> {
        if self.session == SessionState::Closed {
            return Vec::new();
        }
        self.session = SessionState::Closed;
        self.mark_dirty();
        let mut effects: Vec<Effect> = self
            .registry
            .release_all_tickets()
            .into_iter()
            .map(|local_id| Effect::CancelPoll { local_id })
            .collect();
        effects.push(Effect::Shutdown);
        effects
    }

    fn discard(&mut self) {
        self.stale_events += 1;
    }

    /// Accepts an engine result only while the session is open.
    fn accepting(&mut self) -> bool {
        if self.session == SessionState::Closed {
            self.discard();
            return false;
        }
        true
    }

    fn patch(&mut self, local_id: LocalId, patch: JobPatch) {
        match self.registry.update_job(local_id, patch) {
            Ok(()) => self.mark_dirty(),
            Err(_) => self.discard(),
        }
    }

    fn ticket_is_live(&mut self, local_id: LocalId, ticket: PollTicket) -> bool {
        if self.accepting() && self.registry.holds_ticket(local_id, ticket) {
            return true;
        }
        if self.session == SessionState::Running {
            self.discard();
        }
        false
    }

    pub(crate) fn apply_presets_loaded(&mut self, presets: Vec<Preset>) {
        if self.accepting() {
            self.catalog.apply_loaded(presets);
            self.mark_dirty();
        }
    }

    pub(crate) fn apply_presets_failed(&mut self, message: String) {
        if self.accepting() {
            self.catalog.apply_failed(message.clone());
            self.push_notice(Notice::CatalogUnavailable(message));
        }
    }

    pub(crate) fn apply_upload_started(&mut self, local_id: LocalId) {
        if self.accepting() {
            self.patch(local_id, JobPatch::status(JobStatus::Uploading));
        }
    }

    fn catch_up_to_uploading(&mut self, local_id: LocalId) {
        if self
            .registry
            .get_job(local_id)
            .is_some_and(|job| job.status == JobStatus::Queued)
        {
            let _ = self
                .registry
                .update_job(local_id, JobPatch::status(JobStatus::Uploading));
        }
    }

    pub(crate) fn apply_upload_succeeded(
        &mut self,
        local_id: LocalId,
        server_job_id: String,
        status: JobStatus,
        mod_type: Option<String>,
        error_message: Option<String>,
    ) {
        if !self.accepting() {
            return;
        }
        self.catch_up_to_uploading(local_id);
        let patch = if status == JobStatus::Failed {
            JobPatch::failed(error_message.unwrap_or_else(|| UPLOAD_FAILED.to_string()))
        } else {
            JobPatch::status(JobStatus::Uploaded)
        };
        self.patch(
            local_id,
            patch.with_server_job_id(server_job_id).with_mod_type(mod_type),
        );
    }

    pub(crate) fn apply_upload_failed(&mut self, local_id: LocalId, message: String) {
        if !self.accepting() {
            return;
        }
        self.catch_up_to_uploading(local_id);
        let message = if message.trim().is_empty() {
            UPLOAD_FAILED.to_string()
        } else {
            message
        };
        self.patch(local_id, JobPatch::failed(message));
    }

    pub(crate) fn apply_processing_accepted(&mut self, local_id: LocalId, ticket: PollTicket) {
        if self.ticket_is_live(local_id, ticket) {
            self.patch(local_id, JobPatch::status(JobStatus::Processing));
        }
    }

    pub(crate) fn apply_processing_rejected(
        &mut self,
        local_id: LocalId,
        ticket: PollTicket,
        message: String,
    ) {
        if self.ticket_is_live(local_id, ticket) {
            self.registry.release_ticket(local_id);
            self.patch(local_id, JobPatch::failed(message));
        }
    }

    pub(crate) fn apply_status(
        &mut self,
        local_id: LocalId,
        ticket: PollTicket,
        report: StatusReport,
    ) {
        if !self.ticket_is_live(local_id, ticket) {
            return;
        }
        let patch = JobPatch::status(report.status)
            .with_error_message(report.error_message)
            .with_download_ref(report.processed_url)
            .with_usage(report.tokens_used, report.credits_used);
        self.patch(local_id, patch);
    }

    pub(crate) fn apply_poll_timed_out(
        &mut self,
        local_id: LocalId,
        ticket: PollTicket,
        message: String,
    ) {
        if self.ticket_is_live(local_id, ticket) {
            self.registry.release_ticket(local_id);
            self.patch(local_id, JobPatch::failed(message));
        }
    }

    pub(crate) fn apply_download_resolved(&mut self, local_id: LocalId, location: String) {
        if !self.accepting() {
            return;
        }
        match self.registry.get_job(local_id) {
            Some(job) => {
                let ready = DownloadReady {
                    local_id: Some(local_id),
                    server_job_id: job.server_job_id.clone().unwrap_or_default(),
                    file_name: job.file_name().to_string(),
                    location,
                };
                self.downloads.push(ready);
                self.mark_dirty();
            }
            None => self.discard(),
        }
    }

    pub(crate) fn apply_download_failed(&mut self, local_id: LocalId, message: String) {
        if self.accepting() {
            self.push_notice(Notice::DownloadFailed { local_id, message });
        }
    }

    pub(crate) fn apply_history(&mut self, page: HistoryPage) {
        if self.accepting() {
            self.history = Some(page);
            self.mark_dirty();
        }
    }

    pub(crate) fn apply_history_failed(&mut self, message: String) {
        if self.accepting() {
            self.push_notice(Notice::HistoryFailed(message));
        }
    }

    pub(crate) fn apply_history_download_resolved(
        &mut self,
        server_job_id: String,
        location: String,
    ) {
        if !self.accepting() {
            return;
        }
        let file_name = self
            .history_entry(&server_job_id)
            .and_then(|entry| entry.file_name.clone())
            .unwrap_or_else(|| server_job_id.clone());
        self.downloads.push(DownloadReady {
            local_id: None,
            server_job_id,
            file_name,
            location,
        });
        self.mark_dirty();
    }

    pub(crate) fn apply_history_download_failed(&mut self, server_job_id: String, message: String) {
        if self.accepting() {
            self.push_notice(Notice::HistoryDownloadFailed {
                server_job_id,
                message,
            });
        }
    }
}
