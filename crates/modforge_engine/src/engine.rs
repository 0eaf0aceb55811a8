use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc as tokio_mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::ModApi;
use crate::poller::{run_poller, ChannelEventSink, EventSink, PollSettings, PollTarget};
use crate::{EngineEvent, LocalId, PollTicket, ProcessRequest, RemoteStatus, UploadSource};

type PollMap = HashMap<LocalId, (PollTicket, CancellationToken)>;
type PollRegistry = Arc<Mutex<PollMap>>;

enum EngineCommand {
    LoadPresets,
    Upload {
        local_id: LocalId,
        source: UploadSource,
    },
    Process {
        target: PollTarget,
        request: ProcessRequest,
        cancel: CancellationToken,
    },
    ResolveDownload {
        local_id: Option<LocalId>,
        server_job_id: String,
    },
    FetchHistory {
        page: u32,
        limit: u32,
        status: Option<RemoteStatus>,
    },
}

struct Worker {
    api: Arc<dyn ModApi>,
    settings: PollSettings,
    sink: ChannelEventSink,
    polls: PollRegistry,
    shutdown: CancellationToken,
}

/// Runs network work on a single-threaded runtime owned by a background
/// thread. Results come back as [`EngineEvent`]s on a std channel so the
/// caller can drain them from any loop.
pub struct EngineHandle {
    cmd_tx: Option<tokio_mpsc::UnboundedSender<EngineCommand>>,
    event_rx: mpsc::Receiver<EngineEvent>,
    polls: PollRegistry,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn new(api: Arc<dyn ModApi>, settings: PollSettings) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (cmd_tx, mut cmd_rx) = tokio_mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();
        let polls: PollRegistry = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let worker = Arc::new(Worker {
            api,
            settings,
            sink: ChannelEventSink::new(event_tx),
            polls: Arc::clone(&polls),
            shutdown: shutdown.clone(),
        });

        let thread = thread::Builder::new()
            .name("modforge-engine".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(command) = cmd_rx.recv().await {
                        let worker = Arc::clone(&worker);
                        tokio::spawn(async move { worker.handle(command).await });
                    }
                });
                runtime.shutdown_timeout(Duration::from_secs(1));
                forge_logging::forge_debug!("engine thread stopped");
            })?;

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            event_rx,
            polls,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn load_presets(&self) {
        self.send(EngineCommand::LoadPresets);
    }

    pub fn upload(&self, local_id: LocalId, source: UploadSource) {
        self.send(EngineCommand::Upload { local_id, source });
    }

    /// Sends the processing request and, once accepted, polls under
    /// `target.ticket` until the job is terminal or [`cancel_poll`] is called.
    /// A previous poll for the same job is cancelled first.
    ///
    /// [`cancel_poll`]: EngineHandle::cancel_poll
    pub fn request_processing(&self, target: PollTarget, request: ProcessRequest) {
        let cancel = self.shutdown.child_token();
        let previous = self
            .lock_polls()
            .insert(target.local_id, (target.ticket, cancel.clone()));
        if let Some((_, token)) = previous {
            token.cancel();
        }
        self.send(EngineCommand::Process {
            target,
            request,
            cancel,
        });
    }

    /// Stops the poll for `local_id`. No new status query starts once this
    /// returns, but an event already past its cancellation check may still
    /// arrive; the core drops it because the ticket was released.
    pub fn cancel_poll(&self, local_id: LocalId) -> bool {
        match self.lock_polls().remove(&local_id) {
            Some((ticket, token)) => {
                token.cancel();
                forge_logging::forge_debug!("job {} poll {} cancelled", local_id, ticket);
                true
            }
            None => false,
        }
    }

    pub fn active_polls(&self) -> usize {
        self.lock_polls().len()
    }

    /// Asks for a fresh download location. `local_id` is echoed back in the
    /// event and is None for jobs picked from history.
    pub fn resolve_download(&self, local_id: Option<LocalId>, server_job_id: impl Into<String>) {
        self.send(EngineCommand::ResolveDownload {
            local_id,
            server_job_id: server_job_id.into(),
        });
    }

    pub fn fetch_history(&self, page: u32, limit: u32, status: Option<RemoteStatus>) {
        self.send(EngineCommand::FetchHistory {
            page,
            limit,
            status,
        });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Cancels all outstanding work and joins the engine thread.
    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        self.lock_polls().clear();
        self.cmd_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                forge_logging::forge_error!("engine thread panicked");
            }
        }
    }

    fn send(&self, command: EngineCommand) {
        let delivered = self
            .cmd_tx
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok());
        if !delivered {
            forge_logging::forge_warn!("engine is shut down; command dropped");
        }
    }

    fn lock_polls(&self) -> MutexGuard<'_, PollMap> {
        self.polls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Worker {
    async fn handle(&self, command: EngineCommand) {
        match command {
            EngineCommand::LoadPresets => {
                let result = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return,
                    result = self.api.presets() => result,
                };
                if let Err(err) = &result {
                    forge_logging::forge_warn!("preset catalog unavailable: {}", err);
                }
                self.emit(EngineEvent::PresetsLoaded(result));
            }
            EngineCommand::Upload { local_id, source } => {
                forge_logging::forge_info!("uploading {} as job {}", source.file_name, local_id);
                self.emit(EngineEvent::UploadStarted { local_id });
                let result = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return,
                    result = self.api.upload(&source) => result,
                };
                match &result {
                    Ok(receipt) => forge_logging::forge_info!(
                        "job {} uploaded as {} ({})",
                        local_id,
                        receipt.job_id,
                        receipt.status
                    ),
                    Err(err) => {
                        forge_logging::forge_warn!("job {} upload failed: {}", local_id, err)
                    }
                }
                self.emit(EngineEvent::UploadCompleted { local_id, result });
            }
            EngineCommand::Process {
                target,
                request,
                cancel,
            } => {
                self.process(&target, &request, &cancel).await;
                self.release(target.local_id, target.ticket);
            }
            EngineCommand::ResolveDownload {
                local_id,
                server_job_id,
            } => {
                let result = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return,
                    result = self.api.download_location(&server_job_id) => result,
                };
                self.emit(EngineEvent::DownloadResolved {
                    local_id,
                    server_job_id,
                    result,
                });
            }
            EngineCommand::FetchHistory {
                page,
                limit,
                status,
            } => {
                let result = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return,
                    result = self.api.job_history(page, limit, status) => result,
                };
                self.emit(EngineEvent::HistoryLoaded(result));
            }
        }
    }

    async fn process(
        &self,
        target: &PollTarget,
        request: &ProcessRequest,
        cancel: &CancellationToken,
    ) {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = self.api.request_processing(&target.server_job_id, request) => result,
        };
        if cancel.is_cancelled() {
            return;
        }

        match result {
            Ok(()) => {
                forge_logging::forge_info!(
                    "job {} processing accepted with preset {}",
                    target.local_id,
                    request.preset_id
                );
                self.sink.emit(EngineEvent::ProcessingAccepted {
                    local_id: target.local_id,
                    ticket: target.ticket,
                });
                let exit =
                    run_poller(self.api.as_ref(), target, &self.settings, cancel, &self.sink)
                        .await;
                forge_logging::forge_debug!("job {} poller exited: {:?}", target.local_id, exit);
            }
            Err(error) => {
                forge_logging::forge_warn!(
                    "job {} processing rejected: {}",
                    target.local_id,
                    error
                );
                self.sink.emit(EngineEvent::ProcessingRejected {
                    local_id: target.local_id,
                    ticket: target.ticket,
                    error,
                });
            }
        }
    }

    /// Drops the registry entry unless a newer ticket replaced it.
    fn release(&self, local_id: LocalId, ticket: PollTicket) {
        let mut polls = self.polls.lock().unwrap_or_else(PoisonError::into_inner);
        if polls.get(&local_id).is_some_and(|(held, _)| *held == ticket) {
            polls.remove(&local_id);
        }
    }

    fn emit(&self, event: EngineEvent) {
        if !self.shutdown.is_cancelled() {
            self.sink.emit(event);
        }
    }
}
