use super::{JobHandle, JobResult, PollStatus, VideoBackend};
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 90;

/// How long and how often to check a long-running job.
///
/// At least one of `max_attempts` or `deadline` should be set; with both
/// unset the poller falls back to [`DEFAULT_MAX_ATTEMPTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            deadline: None,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn attempt_limit(&self) -> Option<u32> {
        match (self.max_attempts, self.deadline) {
            (None, None) => Some(DEFAULT_MAX_ATTEMPTS),
            (attempts, _) => attempts,
        }
    }
}

/// Where a polled job currently stands. Starts `Pending`; every other
/// state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    DoneOk,
    DoneError,
    PollFailed,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollState::Pending)
    }

    /// State after one status query.
    pub fn after(outcome: &Result<PollStatus>) -> Self {
        match outcome {
            Err(_) => PollState::PollFailed,
            Ok(PollStatus::Pending) => PollState::Pending,
            Ok(PollStatus::Done(_)) => PollState::DoneOk,
            Ok(PollStatus::Failed(_)) => PollState::DoneError,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Poller {
    policy: PollPolicy,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Queries `handle` until the job reaches a terminal state.
    ///
    /// A transport failure ends polling immediately; only "not done yet"
    /// leads to another query.
    pub async fn poll(&self, backend: &dyn VideoBackend, handle: &JobHandle) -> Result<JobResult> {
        let started = Instant::now();
        let limit = self.policy.attempt_limit();
        let mut attempts = 0u32;
        let mut state = PollState::Pending;

        info!(operation = %handle, ?state, "waiting for video generation to complete");

        while !state.is_terminal() {
            attempts += 1;
            let outcome = backend.fetch_status(handle).await;
            state = PollState::after(&outcome);

            match outcome {
                Err(err) => {
                    let detail = match err {
                        Error::Fetch(msg) | Error::Auth(msg) => msg,
                        other => other.to_string(),
                    };
                    error!(operation = %handle, ?state, "error polling for completion: {}", detail);
                    return Err(Error::PollFailure {
                        operation: handle.to_string(),
                        detail,
                    });
                }
                Ok(PollStatus::Done(result)) => {
                    info!(operation = %handle, attempts, ?state, "operation completed");
                    return Ok(result);
                }
                Ok(PollStatus::Failed(detail)) => {
                    error!(operation = %handle, ?state, "error in operation: {}", detail);
                    return Err(Error::OperationFailed {
                        operation: handle.to_string(),
                        detail: detail.to_string(),
                    });
                }
                Ok(PollStatus::Pending) => {}
            }

            let out_of_attempts = limit.is_some_and(|max| attempts >= max);
            let past_deadline = self
                .policy
                .deadline
                .is_some_and(|deadline| started.elapsed() + self.policy.interval > deadline);

            if out_of_attempts || past_deadline {
                state = PollState::TimedOut;
                continue;
            }

            info!(
                operation = %handle,
                "operation still in progress, waiting {}s",
                self.policy.interval.as_secs()
            );
            tokio::time::sleep(self.policy.interval).await;
        }

        error!(operation = %handle, attempts, ?state, "giving up on operation");
        Err(Error::Timeout {
            operation: handle.to_string(),
            attempts,
        })
    }
}
