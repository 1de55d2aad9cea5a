//! Streamed pull progress.
//!
//! A pull answers with newline-delimited JSON progress records. Records are
//! decoded lazily as body chunks arrive; the consumer stops at the first
//! `success` status without draining the rest of the body.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::BackendError;
use crate::ndjson::NdjsonReader;
use crate::transport::bounded;

/// Status label that marks a finished pull.
pub const PULL_SUCCESS_STATUS: &str = "success";

/// One progress record of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PullEvent {
    pub status: Option<String>,
    pub error: Option<String>,
    pub digest: Option<String>,
    pub total: Option<u64>,
    pub completed: Option<u64>,
}

/// Lazy, finite sequence of pull events read from a byte stream.
///
/// Every chunk read is bounded by `idle` and observes `cancel`.
pub struct PullEvents<S> {
    stream: S,
    reader: NdjsonReader,
    idle: Duration,
    cancel: CancellationToken,
    ended: bool,
}

impl<S, E> PullEvents<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BackendError>,
{
    pub fn new(stream: S, idle: Duration, cancel: CancellationToken) -> Self {
        Self {
            stream,
            reader: NdjsonReader::default(),
            idle,
            cancel,
            ended: false,
        }
    }

    /// Next decoded event; `None` once the body has ended.
    pub async fn next_event(&mut self) -> Option<Result<PullEvent, BackendError>> {
        loop {
            if let Some(record) = self.reader.next_record::<PullEvent>() {
                return Some(record.map_err(BackendError::Decode));
            }
            if self.ended {
                return self
                    .reader
                    .finish::<PullEvent>()
                    .map(|record| record.map_err(BackendError::Decode));
            }
            let stream = &mut self.stream;
            let next = bounded(self.idle, &self.cancel, async move {
                Ok(stream.next().await)
            })
            .await;
            match next {
                Ok(Some(Ok(chunk))) => self.reader.push(&chunk),
                Ok(Some(Err(err))) => return Some(Err(err.into())),
                Ok(None) => self.ended = true,
                Err(err) => return Some(Err(err)),
            }
        }
    }

    /// Consume events until the pull of `model` succeeds or fails.
    ///
    /// An embedded `error` fails at once; the body ending without a
    /// `success` status is a failure too.
    pub async fn drive(mut self, model: &str) -> Result<(), BackendError> {
        let mut last_status: Option<String> = None;
        while let Some(event) = self.next_event().await {
            let event = event?;
            if let Some(message) = event
                .error
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
            {
                return Err(BackendError::Rejected(message.to_string()));
            }
            let Some(status) = event.status.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };
            if last_status.as_deref() == Some(status) {
                debug!(
                    target: "mgate::pull",
                    model = %model,
                    status,
                    completed = ?event.completed,
                    total = ?event.total,
                    digest = event.digest.as_deref().unwrap_or(""),
                    "pull progress"
                );
            } else {
                info!(target: "mgate::pull", model = %model, status, "pull status");
                last_status = Some(status.to_string());
            }
            if status == PULL_SUCCESS_STATUS {
                return Ok(());
            }
        }
        Err(BackendError::StreamEnded)
    }
}
