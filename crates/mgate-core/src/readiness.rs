//! Deadline-bounded readiness loop.
//!
//! Probe the backend until it answers, then run an ensure cycle. Any
//! retryable failure pauses for the fixed backoff and starts over from the
//! probe. The deadline is fixed when the loop starts.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::ModelBackend;
use crate::config::RequiredModels;
use crate::ensure::{ensure_all, EnsureReport};
use crate::error::{ErrorKind, GateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Probing,
    Ensuring,
    Ready,
    Failed,
}

impl ReadinessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadinessState::Probing => "probing",
            ReadinessState::Ensuring => "ensuring",
            ReadinessState::Ready => "ready",
            ReadinessState::Failed => "failed",
        }
    }
}

pub struct ReadinessLoop<'a, B: ?Sized> {
    backend: &'a B,
    required: &'a RequiredModels,
    startup_limit: Duration,
    backoff: Duration,
}

impl<'a, B> ReadinessLoop<'a, B>
where
    B: ModelBackend + ?Sized,
{
    pub fn new(
        backend: &'a B,
        required: &'a RequiredModels,
        startup_limit: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            backend,
            required,
            startup_limit,
            backoff,
        }
    }

    /// Run until every required model is installed, the startup limit passes,
    /// or `cancel` fires.
    ///
    /// A deadline failure carries the most recent attempt error, if any
    /// attempt ran.
    pub async fn wait_until_ready(
        &self,
        cancel: &CancellationToken,
    ) -> Result<EnsureReport, GateError> {
        let deadline = Instant::now() + self.startup_limit;
        let mut last: Option<GateError> = None;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(GateError::Cancelled);
            }
            if Instant::now() >= deadline {
                let err = GateError::DeadlineExceeded {
                    limit: self.startup_limit,
                    last: last.map(Box::new),
                };
                warn!(
                    target: "mgate::engine",
                    state = ReadinessState::Failed.as_str(),
                    attempts = attempt,
                    error = %err,
                    "backend not ready"
                );
                return Err(err);
            }

            attempt += 1;
            let (state, err) = match self.attempt(attempt, cancel).await {
                Ok(report) => {
                    info!(
                        target: "mgate::engine",
                        state = ReadinessState::Ready.as_str(),
                        attempts = attempt,
                        pulled = report.pulled.len(),
                        "required models present"
                    );
                    return Ok(report);
                }
                Err(failed) => failed,
            };

            let kind = err.kind();
            if !kind.is_retryable() {
                return Err(match kind {
                    ErrorKind::Cancelled => GateError::Cancelled,
                    _ => err,
                });
            }
            match state {
                ReadinessState::Probing => debug!(
                    target: "mgate::engine",
                    attempt,
                    error = %err,
                    "probe failed"
                ),
                _ => warn!(
                    target: "mgate::engine",
                    attempt,
                    kind = kind.as_str(),
                    error = %err,
                    "ensure failed; back to probing"
                ),
            }
            last = Some(err);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GateError::Cancelled),
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
    }

    /// One probe followed straight away by an ensure cycle. The deadline is
    /// only consulted before the probe, so a backend that answers late still
    /// gets its ensure cycle.
    async fn attempt(
        &self,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<EnsureReport, (ReadinessState, GateError)> {
        self.backend
            .probe(cancel)
            .await
            .map_err(|err| (ReadinessState::Probing, GateError::Probe(err)))?;
        debug!(
            target: "mgate::engine",
            endpoint = self.backend.endpoint(),
            attempt,
            state = ReadinessState::Ensuring.as_str(),
            "backend responding"
        );
        ensure_all(self.backend, self.required, cancel)
            .await
            .map_err(|err| (ReadinessState::Ensuring, err))
    }
}
