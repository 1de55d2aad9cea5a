use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backend::{InstalledModels, ModelBackend};
use crate::config::RequiredModels;
use crate::error::BackendError;

/// In-memory backend that installs models as they are pulled.
#[derive(Default)]
pub(crate) struct FakeBackend {
    installed: Mutex<Vec<String>>,
    unreachable_for: AtomicUsize,
    inventory_failures: AtomicUsize,
    pull_failures: Mutex<HashMap<String, usize>>,
    stall_pulls: AtomicBool,
    probe_delay: Mutex<Duration>,
    probe_calls: AtomicUsize,
    inventory_calls: AtomicUsize,
    pulls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub(crate) fn with_installed(models: &[&str]) -> Self {
        let backend = Self::default();
        *backend.installed.lock().unwrap() = models.iter().map(|m| m.to_string()).collect();
        backend
    }

    /// The first `n` probes time out.
    pub(crate) fn unreachable_for(self, n: usize) -> Self {
        self.unreachable_for.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_inventory(self, n: usize) -> Self {
        self.inventory_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The first `n` pulls of `model` are rejected in-stream.
    pub(crate) fn failing_pull(self, model: &str, n: usize) -> Self {
        self.pull_failures
            .lock()
            .unwrap()
            .insert(model.to_string(), n);
        self
    }

    /// Every probe answers only after `delay`.
    pub(crate) fn slow_probes(self, delay: Duration) -> Self {
        *self.probe_delay.lock().unwrap() = delay;
        self
    }

    /// Pulls never finish on their own.
    pub(crate) fn stalling_pulls(self) -> Self {
        self.stall_pulls.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn inventory_calls(&self) -> usize {
        self.inventory_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn pulls(&self) -> Vec<String> {
        self.pulls.lock().unwrap().clone()
    }

    pub(crate) fn uninstall(&self, model: &str) {
        self.installed.lock().unwrap().retain(|m| m != model);
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ModelBackend for FakeBackend {
    fn endpoint(&self) -> &str {
        "fake://backend"
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<(), BackendError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.probe_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        if take_one(&self.unreachable_for) {
            return Err(BackendError::Timeout(Duration::from_secs(1)));
        }
        Ok(())
    }

    async fn installed_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<InstalledModels, BackendError> {
        self.inventory_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        if take_one(&self.inventory_failures) {
            return Err(BackendError::Timeout(Duration::from_secs(1)));
        }
        Ok(self.installed.lock().unwrap().iter().cloned().collect())
    }

    async fn pull(&self, model: &str, cancel: &CancellationToken) -> Result<(), BackendError> {
        self.pulls.lock().unwrap().push(model.to_string());
        if self.stall_pulls.load(Ordering::SeqCst) {
            cancel.cancelled().await;
        }
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        {
            let mut failures = self.pull_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(model).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(BackendError::Rejected(format!("pull {model} refused")));
            }
        }
        self.installed.lock().unwrap().push(model.to_string());
        Ok(())
    }
}

pub(crate) fn required(raw: &str) -> RequiredModels {
    RequiredModels::parse(raw).unwrap()
}
