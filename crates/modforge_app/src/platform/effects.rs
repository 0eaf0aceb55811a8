use std::sync::Arc;
use std::time::Duration;

use forge_logging::{forge_debug, forge_info, forge_warn};
use modforge_core::{Effect, HistoryPage, JobStatus, Msg, Preset, RemoteJobSummary, StatusReport};
use modforge_engine::{
    EngineEvent, EngineHandle, JobPage, JobStatusReport, ModApi, PollSettings, PollTarget,
    PresetRecord, ProcessRequest, RemoteJob, RemoteStatus, UploadSource,
};

/// Hands core effects to the engine and turns engine events back into
/// messages for `update`.
pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(api: Arc<dyn ModApi>, poll: PollSettings) -> std::io::Result<Self> {
        Ok(Self {
            engine: EngineHandle::new(api, poll)?,
        })
    }

    pub fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::LoadPresets => self.engine.load_presets(),
                Effect::Upload { local_id, file } => {
                    forge_info!(
                        "Upload job_id={} file={} bytes={}",
                        local_id,
                        file.file_name,
                        file.size_bytes
                    );
                    self.engine.upload(
                        local_id,
                        UploadSource {
                            path: file.path,
                            file_name: file.file_name,
                        },
                    );
                }
                Effect::RequestProcessing {
                    local_id,
                    server_job_id,
                    ticket,
                    request,
                } => {
                    forge_info!(
                        "Process job_id={} server_job_id={} preset={} ticket={}",
                        local_id,
                        server_job_id,
                        request.preset_id,
                        ticket
                    );
                    self.engine.request_processing(
                        PollTarget {
                            local_id,
                            server_job_id,
                            ticket,
                        },
                        ProcessRequest {
                            preset_id: request.preset_id,
                            prompt: request.prompt,
                            model_config: request.model_config,
                        },
                    );
                }
                Effect::CancelPoll { local_id } => {
                    if !self.engine.cancel_poll(local_id) {
                        forge_debug!("No live poll for job_id={}", local_id);
                    }
                }
                Effect::ResolveDownload {
                    local_id,
                    server_job_id,
                } => self.engine.resolve_download(local_id, server_job_id),
                Effect::FetchHistory {
                    page,
                    limit,
                    status,
                } => self
                    .engine
                    .fetch_history(page, limit, status.and_then(remote_status)),
                Effect::Shutdown => self.engine.shutdown(),
            }
        }
    }

    /// Waits up to `timeout` for the first event, then drains whatever else
    /// is already queued.
    pub fn pump(&self, timeout: Duration) -> Vec<Msg> {
        let mut msgs = Vec::new();
        let Some(first) = self.engine.recv_timeout(timeout) else {
            return msgs;
        };
        msgs.extend(event_to_msg(first));
        while let Some(event) = self.engine.try_recv() {
            msgs.extend(event_to_msg(event));
        }
        msgs
    }
}

pub fn event_to_msg(event: EngineEvent) -> Option<Msg> {
    let msg = match event {
        EngineEvent::PresetsLoaded(Ok(records)) => {
            Msg::PresetsLoaded(records.into_iter().map(map_preset).collect())
        }
        EngineEvent::PresetsLoaded(Err(err)) => Msg::PresetsFailed {
            message: err.message,
        },
        EngineEvent::UploadStarted { local_id } => Msg::UploadStarted { local_id },
        EngineEvent::UploadCompleted {
            local_id,
            result: Ok(receipt),
        } => {
            let status = map_upload_status(receipt.status);
            Msg::UploadSucceeded {
                local_id,
                server_job_id: receipt.job_id,
                status,
                mod_type: receipt.mod_type,
                error_message: receipt.message.filter(|_| status == JobStatus::Failed),
            }
        }
        EngineEvent::UploadCompleted {
            local_id,
            result: Err(err),
        } => Msg::UploadFailed {
            local_id,
            message: err.message,
        },
        EngineEvent::ProcessingAccepted { local_id, ticket } => {
            Msg::ProcessingAccepted { local_id, ticket }
        }
        EngineEvent::ProcessingRejected {
            local_id,
            ticket,
            error,
        } => Msg::ProcessingRejected {
            local_id,
            ticket,
            message: error.message,
        },
        EngineEvent::StatusPolled {
            local_id,
            ticket,
            report,
        } => Msg::StatusPolled {
            local_id,
            ticket,
            report: map_report(report)?,
        },
        EngineEvent::PollFailed {
            local_id,
            error,
            consecutive,
            ..
        } => {
            forge_warn!(
                "Status check for job_id={} failed ({} in a row, {}): {}",
                local_id,
                consecutive,
                error.kind,
                error
            );
            return None;
        }
        EngineEvent::PollTimedOut {
            local_id,
            ticket,
            reason,
        } => Msg::PollTimedOut {
            local_id,
            ticket,
            message: reason,
        },
        EngineEvent::DownloadResolved {
            local_id: Some(local_id),
            result: Ok(location),
            ..
        } => Msg::DownloadResolved { local_id, location },
        EngineEvent::DownloadResolved {
            local_id: Some(local_id),
            result: Err(err),
            ..
        } => Msg::DownloadFailed {
            local_id,
            message: err.message,
        },
        EngineEvent::DownloadResolved {
            local_id: None,
            server_job_id,
            result: Ok(location),
        } => Msg::HistoryDownloadResolved {
            server_job_id,
            location,
        },
        EngineEvent::DownloadResolved {
            local_id: None,
            server_job_id,
            result: Err(err),
        } => Msg::HistoryDownloadFailed {
            server_job_id,
            message: err.message,
        },
        EngineEvent::HistoryLoaded(Ok(page)) => Msg::HistoryLoaded(map_history(page)),
        EngineEvent::HistoryLoaded(Err(err)) => Msg::HistoryFailed {
            message: err.message,
        },
    };
    Some(msg)
}

/// Upload responses only distinguish failure; any other status means the
/// file is stored and ready for processing.
fn map_upload_status(status: RemoteStatus) -> JobStatus {
    match status {
        RemoteStatus::Failed => JobStatus::Failed,
        RemoteStatus::Pending
        | RemoteStatus::Uploaded
        | RemoteStatus::Processing
        | RemoteStatus::Completed
        | RemoteStatus::Unknown => JobStatus::Uploaded,
    }
}

fn map_status(status: RemoteStatus) -> Option<JobStatus> {
    match status {
        RemoteStatus::Pending | RemoteStatus::Uploaded => Some(JobStatus::Uploaded),
        RemoteStatus::Processing => Some(JobStatus::Processing),
        RemoteStatus::Completed => Some(JobStatus::Completed),
        RemoteStatus::Failed => Some(JobStatus::Failed),
        RemoteStatus::Unknown => None,
    }
}

/// Local statuses the server has a name for; queued and uploading jobs
/// never exist server-side.
fn remote_status(status: JobStatus) -> Option<RemoteStatus> {
    match status {
        JobStatus::Uploaded => Some(RemoteStatus::Uploaded),
        JobStatus::Processing => Some(RemoteStatus::Processing),
        JobStatus::Completed => Some(RemoteStatus::Completed),
        JobStatus::Failed => Some(RemoteStatus::Failed),
        JobStatus::Queued | JobStatus::Uploading => None,
    }
}

fn map_report(report: JobStatusReport) -> Option<StatusReport> {
    let Some(status) = map_status(report.status) else {
        forge_warn!("Dropping status report with unknown status");
        return None;
    };
    Some(StatusReport {
        status,
        processed_url: report.processed_url,
        error_message: report.error_message,
        tokens_used: report.tokens_used,
        credits_used: report.credits_used,
    })
}

fn map_preset(record: PresetRecord) -> Preset {
    Preset {
        id: record.id,
        name: record.name,
        description: record.description,
        credit_cost: record.credit_cost,
        game_type: record.game_type,
    }
}

fn map_history(page: JobPage) -> HistoryPage {
    HistoryPage {
        page: page.page,
        limit: page.limit,
        jobs: page.jobs.into_iter().map(map_remote_job).collect(),
    }
}

fn map_remote_job(job: RemoteJob) -> RemoteJobSummary {
    RemoteJobSummary {
        server_job_id: job.id,
        status: map_status(job.status),
        mod_type: job.mod_type,
        file_name: job.original_filename,
        file_size_bytes: job.original_file_size,
        credits_used: job.credits_used,
        error_message: job.error_message,
        created_at: job.created_at,
    }
}
