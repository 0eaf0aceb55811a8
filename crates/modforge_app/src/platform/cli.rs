use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use modforge_core::JobStatus;

/// Job statuses the history listing can be narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HistoryStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl From<HistoryStatus> for JobStatus {
    fn from(status: HistoryStatus) -> Self {
        match status {
            HistoryStatus::Uploaded => JobStatus::Uploaded,
            HistoryStatus::Processing => JobStatus::Processing,
            HistoryStatus::Completed => JobStatus::Completed,
            HistoryStatus::Failed => JobStatus::Failed,
        }
    }
}

/// Upload Minecraft mods to the enhancement service and collect the results.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "modforge")]
#[command(about = "Drive mod files through upload, AI processing and download", long_about = None)]
pub struct Cli {
    /// RON configuration file (default: ./modforge.ron when present)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Preset used for processing (default: minecraft_balance)
    #[arg(long = "preset", value_name = "ID")]
    pub preset: Option<String>,

    /// Custom processing instructions
    #[arg(long = "prompt", value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Upload only; leave jobs in the uploaded state
    #[arg(long = "no-process")]
    pub no_process: bool,

    /// Do not resolve download links for completed jobs
    #[arg(long = "no-download")]
    pub no_download: bool,

    /// Also list the account's server-side job history
    #[arg(long = "history")]
    pub history: bool,

    /// History page to list (with --history)
    #[arg(long = "page", default_value_t = 1, requires = "history")]
    pub page: u32,

    /// Only list history jobs with this status (with --history)
    #[arg(long = "status", value_enum, requires = "history")]
    pub status: Option<HistoryStatus>,

    /// Resolve a download link for a completed server job (repeatable)
    #[arg(long = "download", value_name = "JOB_ID")]
    pub download: Vec<String>,

    /// Log debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Mod files (.jar, .zip, .json, .mcmeta)
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

impl Cli {
    pub fn has_work(&self) -> bool {
        self.history || !self.files.is_empty() || !self.download.is_empty()
    }
}
