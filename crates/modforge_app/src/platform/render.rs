use chrono::{DateTime, Local};
use modforge_core::{
    AppViewModel, CatalogState, DownloadReady, HistoryPage, JobRowView, Notice, RemoteJobSummary,
};

/// Lines describing the current jobs, preceded by a one-line summary.
pub fn render(view: &AppViewModel) -> Vec<String> {
    let catalog = match view.catalog_state {
        CatalogState::Unloaded => "presets: not loaded".to_string(),
        CatalogState::Loading => "presets: loading".to_string(),
        CatalogState::Loaded => format!("presets: {}", view.presets.len()),
        CatalogState::Failed => "presets: unavailable".to_string(),
    };
    let mut lines = vec![format!(
        "Jobs: {} | Polling: {} | {}",
        view.job_count, view.active_polls, catalog
    )];
    lines.extend(view.jobs.iter().map(job_line));
    lines
}

pub fn job_line(row: &JobRowView) -> String {
    let mut line = format!(
        "  #{} {} ({}) [{}]",
        row.local_id,
        row.file_name,
        row.size_label(),
        row.status
    );
    if let Some(mod_type) = &row.mod_type {
        line.push_str(&format!(" {mod_type}"));
    }
    if let Some(server_job_id) = &row.server_job_id {
        line.push_str(&format!(" job={server_job_id}"));
    }
    if let Some(credits) = row.credits_used {
        line.push_str(&format!(" credits={credits}"));
    }
    if let Some(tokens) = row.tokens_used {
        line.push_str(&format!(" tokens={tokens}"));
    }
    if let Some(message) = &row.error_message {
        line.push_str(&format!(" - {message}"));
    }
    line
}

pub fn notice_line(notice: &Notice) -> String {
    match notice {
        Notice::Rejected(err) => format!("! {err}"),
        Notice::CatalogUnavailable(message) => {
            format!("! Preset catalog unavailable, using defaults: {message}")
        }
        Notice::DownloadFailed { local_id, message } => {
            format!("! Download for #{local_id} failed: {message}")
        }
        Notice::HistoryFailed(message) => format!("! Job history unavailable: {message}"),
        Notice::HistoryDownloadFailed {
            server_job_id,
            message,
        } => format!("! Download for job {server_job_id} failed: {message}"),
    }
}

pub fn download_line(ready: &DownloadReady) -> String {
    let label = match ready.local_id {
        Some(local_id) => format!("#{local_id}"),
        None => format!("job={}", ready.server_job_id),
    };
    format!("Download {label} {}: {}", ready.file_name, ready.location)
}

pub fn history_lines(page: &HistoryPage) -> Vec<String> {
    let mut lines = vec![format!(
        "History page {} ({} of up to {})",
        page.page,
        page.jobs.len(),
        page.limit
    )];
    lines.extend(page.jobs.iter().map(history_line));
    lines
}

fn history_line(job: &RemoteJobSummary) -> String {
    let status = job
        .status
        .map(|status| status.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let mut line = format!(
        "  {} {} [{}]",
        job.server_job_id,
        job.file_name.as_deref().unwrap_or("-"),
        status
    );
    if let Some(created) = job.created_at.as_deref() {
        line.push_str(&format!(" {}", format_timestamp(created)));
    }
    if let Some(credits) = job.credits_used {
        line.push_str(&format!(" credits={credits}"));
    }
    if let Some(message) = &job.error_message {
        line.push_str(&format!(" - {message}"));
    }
    line
}

/// RFC 3339 server timestamps shown in local time; anything else verbatim.
fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use modforge_core::{JobStatus, OrchestratorError};

    use super::*;

    fn row() -> JobRowView {
        JobRowView {
            local_id: 3,
            file_name: "cool.jar".to_string(),
            size_bytes: 5 * 1024 * 1024,
            mod_type: Some("minecraft".to_string()),
            status: JobStatus::Failed,
            server_job_id: Some("J3".to_string()),
            error_message: Some("model overloaded".to_string()),
            download_ref: None,
            tokens_used: None,
            credits_used: Some(2),
            can_process: false,
            can_download: false,
        }
    }

    #[test]
    fn job_line_shows_status_and_error() {
        assert_eq!(
            job_line(&row()),
            "  #3 cool.jar (5.0 MB) [failed] minecraft job=J3 credits=2 - model overloaded"
        );
    }

    #[test]
    fn summary_reflects_catalog_state() {
        let view = AppViewModel {
            job_count: 1,
            catalog_state: CatalogState::Failed,
            jobs: vec![row()],
            ..AppViewModel::default()
        };
        let lines = render(&view);
        assert_eq!(lines[0], "Jobs: 1 | Polling: 0 | presets: unavailable");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn rejected_notice_uses_error_text() {
        let line = notice_line(&Notice::Rejected(OrchestratorError::NotFound(9)));
        assert!(line.starts_with("! "));
        assert!(line.contains('9'));
    }

    #[test]
    fn history_download_is_labelled_by_server_job() {
        let ready = DownloadReady {
            local_id: None,
            server_job_id: "J7".to_string(),
            file_name: "cool.jar".to_string(),
            location: "https://cdn.example/J7.jar".to_string(),
        };
        assert_eq!(
            download_line(&ready),
            "Download job=J7 cool.jar: https://cdn.example/J7.jar"
        );
        assert_eq!(
            download_line(&DownloadReady {
                local_id: Some(2),
                ..ready
            }),
            "Download #2 cool.jar: https://cdn.example/J7.jar"
        );
    }

    #[test]
    fn unparsable_timestamp_is_shown_verbatim() {
        assert_eq!(format_timestamp("yesterday"), "yesterday");
        assert_ne!(format_timestamp("2026-01-02T03:04:05Z"), "2026-01-02T03:04:05Z");
    }
}
