//! Modforge core: job registry, preset catalog and the pure update loop.
//!
//! Nothing here performs IO. The UI layer feeds user input and engine
//! results in as [`Msg`]s (or calls the [`AppState`] command methods
//! directly) and hands the returned [`Effect`]s to the engine.
mod catalog;
mod effect;
mod error;
mod job;
mod msg;
mod policy;
mod registry;
mod state;
mod update;
mod view_model;

pub use catalog::{
    CatalogState, Preset, PresetCatalog, ProcessingRequest, DEFAULT_MODEL_CONFIG,
    DEFAULT_PRESET_ID, DEFAULT_PROMPT,
};
pub use effect::Effect;
pub use error::OrchestratorError;
pub use job::{Job, JobPatch, JobStatus, LocalId, ModFile, PollTicket};
pub use msg::{HistoryPage, Msg, RemoteJobSummary, StatusReport};
pub use policy::{FilePolicy, ACCEPTED_EXTENSIONS, MAX_FILE_BYTES};
pub use registry::JobRegistry;
pub use state::{AppState, DownloadReady, Notice, SessionState};
pub use update::update;
pub use view_model::{AppViewModel, JobRowView};
