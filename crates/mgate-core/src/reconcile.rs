use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backend::ModelBackend;
use crate::config::RequiredModels;
use crate::ensure::{ensure_all, EnsureReport};
use crate::error::{ErrorKind, GateError};

/// Run a single ensure cycle and log what it did.
pub async fn reconcile_once<B>(
    backend: &B,
    required: &RequiredModels,
    cancel: &CancellationToken,
) -> Result<EnsureReport, GateError>
where
    B: ModelBackend + ?Sized,
{
    let report = ensure_all(backend, required, cancel).await?;
    if report.was_noop() {
        debug!(target: "mgate::engine", "reconcile: nothing to pull");
    } else {
        info!(
            target: "mgate::engine",
            pulled = ?report.pulled,
            "reconcile: pulled missing models"
        );
    }
    Ok(report)
}

/// Re-run the ensure cycle every `interval` until `cancel` fires.
///
/// Failures are logged and the next cycle runs on schedule; nothing here gives
/// up. Returns the number of cycles that ran.
pub async fn reconcile_forever<B>(
    backend: &B,
    required: &RequiredModels,
    interval: Duration,
    cancel: &CancellationToken,
) -> u64
where
    B: ModelBackend + ?Sized,
{
    let mut cycles: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return cycles,
            _ = tokio::time::sleep(interval) => {}
        }
        cycles += 1;
        match reconcile_once(backend, required, cancel).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::Cancelled => return cycles,
            Err(err) => {
                error!(
                    target: "mgate::engine",
                    cycle = cycles,
                    kind = err.kind().as_str(),
                    error = %err,
                    "reconcile failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{required, FakeBackend};

    fn cancel_after(delay: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.cancel();
        });
        cancel
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_loop() {
        let backend = FakeBackend::with_installed(&[]).failing_inventory(1);
        let models = required("a");
        let cancel = cancel_after(Duration::from_secs(35));
        let cycles = reconcile_forever(&backend, &models, Duration::from_secs(10), &cancel).await;
        assert_eq!(cycles, 3);
        assert_eq!(backend.inventory_calls(), 3);
        assert_eq!(backend.pulls(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_models_are_pulled_again() {
        let backend = FakeBackend::with_installed(&["a"]);
        let models = required("a");
        let cancel = cancel_after(Duration::from_secs(25));
        backend.uninstall("a");
        let cycles = reconcile_forever(&backend, &models, Duration::from_secs(10), &cancel).await;
        assert_eq!(cycles, 2);
        assert_eq!(backend.pulls(), vec!["a"]);
    }

    #[tokio::test]
    async fn single_pass_reports_pulls_and_failures() {
        let backend = FakeBackend::with_installed(&["a"]).failing_inventory(1);
        let models = required("a,b");
        let cancel = CancellationToken::new();
        let err = reconcile_once(&backend, &models, &cancel).await.unwrap_err();
        assert!(matches!(err, GateError::Inventory(_)));
        let report = reconcile_once(&backend, &models, &cancel).await.unwrap();
        assert_eq!(report.pulled, vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_before_first_cycle_runs_nothing() {
        let backend = FakeBackend::with_installed(&["a"]);
        let models = required("a");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cycles = reconcile_forever(&backend, &models, Duration::from_secs(10), &cancel).await;
        assert_eq!(cycles, 0);
        assert_eq!(backend.inventory_calls(), 0);
    }
}
