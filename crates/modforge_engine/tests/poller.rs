use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modforge_engine::{
    run_poller, ApiError, ApiErrorKind, EngineEvent, EventSink, JobPage, JobStatusReport, ModApi,
    PollExit, PollSettings, PollTarget, PresetRecord, ProcessRequest, RemoteStatus, UploadReceipt,
    UploadSource,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

/// Answers status queries from a script; once the script runs dry it keeps
/// repeating `fallback`.
struct ScriptedApi {
    script: Mutex<VecDeque<Result<JobStatusReport, ApiError>>>,
    fallback: Option<Result<JobStatusReport, ApiError>>,
}

impl ScriptedApi {
    fn new(
        script: Vec<Result<JobStatusReport, ApiError>>,
        fallback: Option<Result<JobStatusReport, ApiError>>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
        }
    }
}

fn unused<T>() -> Result<T, ApiError> {
    Err(ApiError::new(ApiErrorKind::Transport, "not scripted"))
}

#[async_trait::async_trait]
impl ModApi for ScriptedApi {
    async fn upload(&self, _source: &UploadSource) -> Result<UploadReceipt, ApiError> {
        unused()
    }

    async fn presets(&self) -> Result<Vec<PresetRecord>, ApiError> {
        unused()
    }

    async fn request_processing(
        &self,
        _server_job_id: &str,
        _request: &ProcessRequest,
    ) -> Result<(), ApiError> {
        unused()
    }

    async fn job_status(&self, _server_job_id: &str) -> Result<JobStatusReport, ApiError> {
        let next = self.script.lock().unwrap().pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }

    async fn download_location(&self, _server_job_id: &str) -> Result<String, ApiError> {
        unused()
    }

    async fn job_history(
        &self,
        _page: u32,
        _limit: u32,
        _status: Option<RemoteStatus>,
    ) -> Result<JobPage, ApiError> {
        unused()
    }
}

#[derive(Default)]
struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl EventSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn report(status: RemoteStatus) -> JobStatusReport {
    JobStatusReport {
        status,
        processed_url: None,
        error_message: None,
        tokens_used: None,
        credits_used: None,
    }
}

fn transient() -> ApiError {
    ApiError::new(ApiErrorKind::Transport, "connection reset")
}

fn fast_settings() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(2),
        max_elapsed: Duration::from_secs(5),
        max_consecutive_failures: 10,
        backoff_ceiling: Duration::from_millis(8),
    }
}

fn target() -> PollTarget {
    PollTarget {
        local_id: 4,
        server_job_id: "J4".to_string(),
        ticket: 11,
    }
}

fn polled_statuses(events: &[EngineEvent]) -> Vec<RemoteStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::StatusPolled { report, .. } => Some(report.status),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn polls_until_completed() {
    let completed = JobStatusReport {
        processed_url: Some("https://cdn.example/J4.jar".to_string()),
        ..report(RemoteStatus::Completed)
    };
    let api = ScriptedApi::new(
        vec![
            Ok(report(RemoteStatus::Processing)),
            Ok(report(RemoteStatus::Processing)),
            Ok(completed),
        ],
        None,
    );
    let sink = TestSink::default();

    let cancel = CancellationToken::new();
    let exit = run_poller(&api, &target(), &fast_settings(), &cancel, &sink).await;

    assert_eq!(exit, PollExit::Terminal);
    let events = sink.take();
    assert_eq!(
        polled_statuses(&events),
        vec![
            RemoteStatus::Processing,
            RemoteStatus::Processing,
            RemoteStatus::Completed
        ]
    );
    assert!(events.iter().all(|event| matches!(
        event,
        EngineEvent::StatusPolled { local_id: 4, ticket: 11, .. }
    )));
}

#[tokio::test]
async fn server_failure_is_terminal() {
    let failed = JobStatusReport {
        error_message: Some("model overloaded".to_string()),
        ..report(RemoteStatus::Failed)
    };
    let api = ScriptedApi::new(vec![Ok(failed)], None);
    let sink = TestSink::default();

    let cancel = CancellationToken::new();
    let exit = run_poller(&api, &target(), &fast_settings(), &cancel, &sink).await;

    assert_eq!(exit, PollExit::Terminal);
    assert_eq!(polled_statuses(&sink.take()), vec![RemoteStatus::Failed]);
}

#[tokio::test]
async fn transient_failures_do_not_stop_polling() {
    let api = ScriptedApi::new(
        vec![
            Err(transient()),
            Err(transient()),
            Ok(report(RemoteStatus::Completed)),
        ],
        None,
    );
    let sink = TestSink::default();

    let cancel = CancellationToken::new();
    let exit = run_poller(&api, &target(), &fast_settings(), &cancel, &sink).await;

    assert_eq!(exit, PollExit::Terminal);
    let events = sink.take();
    let counts: Vec<u32> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::PollFailed { consecutive, .. } => Some(*consecutive),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![1, 2]);
    assert_eq!(polled_statuses(&events), vec![RemoteStatus::Completed]);
}

#[tokio::test]
async fn unknown_status_counts_as_a_failure() {
    let api = ScriptedApi::new(
        vec![
            Ok(report(RemoteStatus::Unknown)),
            Ok(report(RemoteStatus::Completed)),
        ],
        None,
    );
    let sink = TestSink::default();

    run_poller(&api, &target(), &fast_settings(), &CancellationToken::new(), &sink).await;

    let events = sink.take();
    assert!(matches!(
        &events[0],
        EngineEvent::PollFailed { error, consecutive: 1, .. }
            if error.kind == ApiErrorKind::Malformed
    ));
    assert_eq!(polled_statuses(&events), vec![RemoteStatus::Completed]);
}

#[tokio::test]
async fn gives_up_after_consecutive_failure_ceiling() {
    let api = ScriptedApi::new(Vec::new(), Some(Err(transient())));
    let sink = TestSink::default();
    let settings = PollSettings {
        max_consecutive_failures: 3,
        ..fast_settings()
    };

    let exit = run_poller(&api, &target(), &settings, &CancellationToken::new(), &sink).await;

    assert_eq!(exit, PollExit::TooManyFailures);
    let events = sink.take();
    assert_eq!(events.len(), 4);
    assert!(matches!(
        events.last(),
        Some(EngineEvent::PollTimedOut { local_id: 4, ticket: 11, reason })
            if reason.contains("3 times")
    ));
}

#[tokio::test]
async fn gives_up_after_elapsed_ceiling() {
    let api = ScriptedApi::new(Vec::new(), Some(Ok(report(RemoteStatus::Processing))));
    let sink = TestSink::default();
    let settings = PollSettings {
        max_elapsed: Duration::from_millis(30),
        ..fast_settings()
    };

    let exit = run_poller(&api, &target(), &settings, &CancellationToken::new(), &sink).await;

    assert_eq!(exit, PollExit::TimedOut);
    let events = sink.take();
    assert!(!polled_statuses(&events).is_empty());
    assert!(matches!(events.last(), Some(EngineEvent::PollTimedOut { .. })));
}

#[tokio::test]
async fn cancelled_poll_emits_nothing() {
    let api = ScriptedApi::new(vec![Ok(report(RemoteStatus::Completed))], None);
    let sink = TestSink::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let exit = run_poller(&api, &target(), &fast_settings(), &cancel, &sink).await;

    assert_eq!(exit, PollExit::Cancelled);
    assert!(sink.take().is_empty());
}

#[tokio::test]
async fn cancel_interrupts_an_in_flight_query() {
    let api = Arc::new(ScriptedApi::new(Vec::new(), None));
    let sink = Arc::new(TestSink::default());
    let cancel = CancellationToken::new();

    let task = {
        let api = Arc::clone(&api);
        let sink = Arc::clone(&sink);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            run_poller(api.as_ref(), &target(), &fast_settings(), &cancel, sink.as_ref()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let exit = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("poller stops")
        .unwrap();
    assert_eq!(exit, PollExit::Cancelled);
    assert!(sink.take().is_empty());
}
