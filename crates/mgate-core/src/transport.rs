//! HTTP client construction and per-call budgets.
//!
//! A single timeout value bounds connection setup (TCP and TLS), the wait for
//! response headers, whole unary requests, and each read from a streamed body.
//! Nothing here retries.

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;

pub const USER_AGENT: &str = concat!("mgate/", env!("CARGO_PKG_VERSION"));

/// Bytes of an error response body kept for diagnostics.
pub const ERROR_BODY_LIMIT: usize = 8 * 1024;

pub fn build_client(timeout: Duration) -> Result<Client, BackendError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout)
        .pool_idle_timeout(timeout)
        .build()
        .map_err(BackendError::Transport)
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BackendError::Cancelled),
        res = fut => res,
    }
}

/// Run `fut` within `budget` unless `cancel` fires first.
pub async fn bounded<T, F>(
    budget: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    cancellable(cancel, async move {
        tokio::time::timeout(budget, fut)
            .await
            .unwrap_or(Err(BackendError::Timeout(budget)))
    })
    .await
}

/// Read at most `limit` bytes of `response` for an error message.
///
/// Read failures end the prefix early instead of masking the status error the
/// caller is about to report.
pub async fn read_prefix(
    response: Response,
    limit: usize,
    budget: Duration,
    cancel: &CancellationToken,
) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    while buf.len() < limit {
        let next = bounded(budget, cancel, async { Ok(stream.next().await) }).await;
        match next {
            Ok(Some(Ok(chunk))) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }
    buf.truncate(limit);
    String::from_utf8_lossy(&buf).trim().to_string()
}
