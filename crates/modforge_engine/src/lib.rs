//! Modforge engine: HTTP client for the enhancement service, the status
//! poller and the background runtime that executes effects.
mod api;
mod engine;
mod poller;
mod types;

pub use api::{ApiSettings, ModApi, ReqwestModApi};
pub use engine::EngineHandle;
pub use poller::{run_poller, ChannelEventSink, EventSink, PollExit, PollSettings, PollTarget};
pub use types::{
    ApiError, ApiErrorKind, EngineEvent, JobPage, JobStatusReport, LocalId, PollTicket,
    PresetRecord, ProcessRequest, RemoteJob, RemoteStatus, UploadReceipt, UploadSource,
};
