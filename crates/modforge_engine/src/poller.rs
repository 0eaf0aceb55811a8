use std::sync::mpsc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::ModApi;
use crate::{ApiError, ApiErrorKind, EngineEvent, LocalId, PollTicket, RemoteStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Wall-clock budget for one processing request.
    pub max_elapsed: Duration,
    pub max_consecutive_failures: u32,
    pub backoff_ceiling: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_elapsed: Duration::from_secs(30 * 60),
            max_consecutive_failures: 10,
            backoff_ceiling: Duration::from_secs(30),
        }
    }
}

impl PollSettings {
    /// Wait before the next query. Doubles per consecutive failure, capped at
    /// `backoff_ceiling` (never below `interval`).
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.interval;
        }
        let factor = 1u32 << failures.min(16);
        let ceiling = self.backoff_ceiling.max(self.interval);
        self.interval.saturating_mul(factor).min(ceiling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub local_id: LocalId,
    pub server_job_id: String,
    pub ticket: PollTicket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Terminal,
    Cancelled,
    TimedOut,
    TooManyFailures,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Queries the job status until it turns terminal, the token is cancelled or
/// one of the ceilings in `settings` is hit. The first query goes out
/// immediately. Nothing is emitted once `cancel` fires.
pub async fn run_poller(
    api: &dyn ModApi,
    target: &PollTarget,
    settings: &PollSettings,
    cancel: &CancellationToken,
    sink: &dyn EventSink,
) -> PollExit {
    let started = Instant::now();
    let mut failures: u32 = 0;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollExit::Cancelled,
            outcome = api.job_status(&target.server_job_id) => outcome,
        };

        let outcome = outcome.and_then(|report| {
            if report.status == RemoteStatus::Unknown {
                Err(ApiError::new(
                    ApiErrorKind::Malformed,
                    "Status check returned an unknown status",
                ))
            } else {
                Ok(report)
            }
        });

        match outcome {
            Ok(report) => {
                failures = 0;
                let terminal = report.status.is_terminal();
                forge_logging::forge_debug!(
                    "job {} ({}) polled: {}",
                    target.local_id,
                    target.server_job_id,
                    report.status
                );
                if !emit(
                    cancel,
                    sink,
                    EngineEvent::StatusPolled {
                        local_id: target.local_id,
                        ticket: target.ticket,
                        report,
                    },
                ) {
                    return PollExit::Cancelled;
                }
                if terminal {
                    return PollExit::Terminal;
                }
            }
            Err(error) => {
                failures += 1;
                forge_logging::forge_warn!(
                    "job {} status check failed ({} in a row): {}",
                    target.local_id,
                    failures,
                    error
                );
                if !emit(
                    cancel,
                    sink,
                    EngineEvent::PollFailed {
                        local_id: target.local_id,
                        ticket: target.ticket,
                        error,
                        consecutive: failures,
                    },
                ) {
                    return PollExit::Cancelled;
                }
                if failures >= settings.max_consecutive_failures {
                    let reason = format!("Status check failed {failures} times in a row");
                    give_up(cancel, sink, target, reason);
                    return PollExit::TooManyFailures;
                }
            }
        }

        if started.elapsed() >= settings.max_elapsed {
            let reason = format!(
                "Processing did not finish within {} seconds",
                settings.max_elapsed.as_secs()
            );
            give_up(cancel, sink, target, reason);
            return PollExit::TimedOut;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollExit::Cancelled,
            _ = tokio::time::sleep(settings.delay_after(failures)) => {}
        }
    }
}

fn give_up(cancel: &CancellationToken, sink: &dyn EventSink, target: &PollTarget, reason: String) {
    forge_logging::forge_warn!("job {} polling stopped: {}", target.local_id, reason);
    emit(
        cancel,
        sink,
        EngineEvent::PollTimedOut {
            local_id: target.local_id,
            ticket: target.ticket,
            reason,
        },
    );
}

fn emit(cancel: &CancellationToken, sink: &dyn EventSink, event: EngineEvent) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    sink.emit(event);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_ceiling() {
        let settings = PollSettings::default();
        assert_eq!(settings.delay_after(0), Duration::from_secs(3));
        assert_eq!(settings.delay_after(1), Duration::from_secs(6));
        assert_eq!(settings.delay_after(2), Duration::from_secs(12));
        assert_eq!(settings.delay_after(4), Duration::from_secs(30));
        assert_eq!(settings.delay_after(40), Duration::from_secs(30));
    }

    #[test]
    fn ceiling_below_interval_keeps_the_interval() {
        let settings = PollSettings {
            interval: Duration::from_secs(5),
            backoff_ceiling: Duration::from_secs(1),
            ..PollSettings::default()
        };
        assert_eq!(settings.delay_after(3), Duration::from_secs(5));
    }
}
