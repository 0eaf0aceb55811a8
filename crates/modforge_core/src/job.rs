use std::fmt;
use std::path::{Path, PathBuf};

/// Client-assigned job identity. Allocated at drop time and never reused.
pub type LocalId = u64;

/// Sequence number stamped on every processing request and its poll events.
pub type PollTicket = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobStatus {
    #[default]
    Queued,
    Uploading,
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the job lifecycle. A same-status
    /// patch is always allowed.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Queued, Uploading)
                | (Uploading, Uploaded)
                | (Uploading, Failed)
                | (Uploaded, Processing)
                | (Uploaded, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file picked by the user, as seen by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
}

impl ModFile {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let path = path.into();
        let file_name = display_name(&path);
        Self {
            path,
            file_name,
            size_bytes,
        }
    }

    /// Lower-cased extension including the leading dot, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// One file's journey through upload, processing and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub local_id: LocalId,
    pub server_job_id: Option<String>,
    pub file: ModFile,
    pub mod_type: Option<String>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub download_ref: Option<String>,
    pub tokens_used: Option<u32>,
    pub credits_used: Option<u32>,
    pub(crate) ticket: Option<PollTicket>,
}

impl Job {
    pub(crate) fn new(local_id: LocalId, file: ModFile) -> Self {
        Self {
            local_id,
            server_job_id: None,
            file,
            mod_type: None,
            status: JobStatus::Queued,
            error_message: None,
            download_ref: None,
            tokens_used: None,
            credits_used: None,
            ticket: None,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file.file_name
    }

    pub fn file_size_bytes(&self) -> u64 {
        self.file.size_bytes
    }

    /// True while a processing request or its poll handle is live.
    pub fn has_active_poll(&self) -> bool {
        self.ticket.is_some()
    }

    pub fn active_ticket(&self) -> Option<PollTicket> {
        self.ticket
    }
}

/// Partial field update merged into a job by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub server_job_id: Option<String>,
    pub mod_type: Option<String>,
    pub error_message: Option<String>,
    pub download_ref: Option<String>,
    pub tokens_used: Option<u32>,
    pub credits_used: Option<u32>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_server_job_id(mut self, id: impl Into<String>) -> Self {
        self.server_job_id = Some(id.into());
        self
    }

    pub fn with_mod_type(mut self, mod_type: Option<String>) -> Self {
        self.mod_type = mod_type;
        self
    }

    pub fn with_error_message(mut self, message: Option<String>) -> Self {
        self.error_message = message;
        self
    }

    pub fn with_download_ref(mut self, download_ref: Option<String>) -> Self {
        self.download_ref = download_ref;
        self
    }

    pub fn with_usage(mut self, tokens_used: Option<u32>, credits_used: Option<u32>) -> Self {
        self.tokens_used = tokens_used;
        self.credits_used = credits_used;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_edges_are_the_only_transitions() {
        use JobStatus::*;
        let all = [Queued, Uploading, Uploaded, Processing, Completed, Failed];
        let allowed = [
            (Queued, Uploading),
            (Uploading, Uploaded),
            (Uploading, Failed),
            (Uploaded, Processing),
            (Uploaded, Failed),
            (Processing, Completed),
            (Processing, Failed),
        ];
        for from in all {
            for to in all {
                let expected = from == to || allowed.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn mod_file_derives_name_and_extension() {
        let file = ModFile::new("/tmp/mods/Cool.JAR", 12);
        assert_eq!(file.file_name, "Cool.JAR");
        assert_eq!(file.extension().as_deref(), Some(".jar"));
        assert_eq!(ModFile::new("README", 1).extension(), None);
    }
}
