use crate::{AppState, Effect, Msg, Notice, OrchestratorError};

/// Pure update function: applies a message to state and returns any effects.
///
/// UI messages that the orchestrator refuses (wrong state, duplicate
/// processing, unknown job) leave a `Notice::Rejected` for inline display.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::Started => state.load_presets(),
        Msg::FilesDropped(files) => {
            let mut effects = Vec::with_capacity(files.len());
            for file in files {
                match state.submit(file) {
                    Ok((_, effect)) => effects.push(effect),
                    Err(err) => state.push_notice(Notice::Rejected(err)),
                }
            }
            effects
        }
        Msg::PresetSelected(preset_id) => {
            state.set_selected_preset(preset_id);
            Vec::new()
        }
        Msg::PromptChanged(prompt) => {
            state.set_custom_prompt(prompt);
            Vec::new()
        }
        Msg::ProcessClicked { local_id } => {
            let preset_id = state.selected_preset().map(str::to_string);
            let prompt = state.custom_prompt().to_string();
            let result = state.request_processing(local_id, preset_id.as_deref(), &prompt);
            single(&mut state, result)
        }
        Msg::DownloadClicked { local_id } => {
            let result = state.resolve_download(local_id);
            single(&mut state, result)
        }
        Msg::RemoveClicked { local_id } => match state.remove_job(local_id) {
            Ok(effects) => effects,
            Err(err) => {
                state.push_notice(Notice::Rejected(err));
                Vec::new()
            }
        },
        Msg::ClearFinishedClicked => {
            state.clear_finished();
            Vec::new()
        }
        Msg::HistoryRequested {
            page,
            limit,
            status,
        } => {
            let result = state.fetch_history(page, limit, status);
            single(&mut state, result)
        }
        Msg::HistoryDownloadClicked { server_job_id } => {
            let result = state.resolve_history_download(&server_job_id);
            single(&mut state, result)
        }
        Msg::ShutdownRequested => state.shutdown(),
        Msg::PresetsLoaded(presets) => {
            state.apply_presets_loaded(presets);
            Vec::new()
        }
        Msg::PresetsFailed { message } => {
            state.apply_presets_failed(message);
            Vec::new()
        }
        Msg::UploadStarted { local_id } => {
            state.apply_upload_started(local_id);
            Vec::new()
        }
        Msg::UploadSucceeded {
            local_id,
            server_job_id,
            status,
            mod_type,
            error_message,
        } => {
            state.apply_upload_succeeded(local_id, server_job_id, status, mod_type, error_message);
            Vec::new()
        }
        Msg::UploadFailed { local_id, message } => {
            state.apply_upload_failed(local_id, message);
            Vec::new()
        }
        Msg::ProcessingAccepted { local_id, ticket } => {
            state.apply_processing_accepted(local_id, ticket);
            Vec::new()
        }
        Msg::ProcessingRejected {
            local_id,
            ticket,
            message,
        } => {
            state.apply_processing_rejected(local_id, ticket, message);
            Vec::new()
        }
        Msg::StatusPolled {
            local_id,
            ticket,
            report,
        } => {
            state.apply_status(local_id, ticket, report);
            Vec::new()
        }
        Msg::PollTimedOut {
            local_id,
            ticket,
            message,
        } => {
            state.apply_poll_timed_out(local_id, ticket, message);
            Vec::new()
        }
        Msg::DownloadResolved { local_id, location } => {
            state.apply_download_resolved(local_id, location);
            Vec::new()
        }
        Msg::DownloadFailed { local_id, message } => {
            state.apply_download_failed(local_id, message);
            Vec::new()
        }
        Msg::HistoryLoaded(page) => {
            state.apply_history(page);
            Vec::new()
        }
        Msg::HistoryFailed { message } => {
            state.apply_history_failed(message);
            Vec::new()
        }
        Msg::HistoryDownloadResolved {
            server_job_id,
            location,
        } => {
            state.apply_history_download_resolved(server_job_id, location);
            Vec::new()
        }
        Msg::HistoryDownloadFailed {
            server_job_id,
            message,
        } => {
            state.apply_history_download_failed(server_job_id, message);
            Vec::new()
        }
        Msg::Tick => Vec::new(),
    };

    (state, effects)
}

fn single(state: &mut AppState, result: Result<Effect, OrchestratorError>) -> Vec<Effect> {
    match result {
        Ok(effect) => vec![effect],
        Err(err) => {
            state.push_notice(Notice::Rejected(err));
            Vec::new()
        }
    }
}
