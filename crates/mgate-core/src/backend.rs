use std::collections::HashSet;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;

/// Model identifiers installed on a backend at the time of one inventory query.
///
/// Names compare exactly (case-sensitive). A fresh set is fetched on every
/// ensure cycle; nothing caches it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledModels(HashSet<String>);

impl InstalledModels {
    pub fn contains(&self, model: &str) -> bool {
        self.0.contains(model)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for InstalledModels {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A model-serving backend the engine probes, lists and pulls from.
///
/// Every call observes `cancel` and returns [`BackendError::Cancelled`] once
/// it fires.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Where the backend lives, for log context.
    fn endpoint(&self) -> &str;

    /// Liveness only: succeeds when the backend answers without an error status.
    async fn probe(&self, cancel: &CancellationToken) -> Result<(), BackendError>;

    async fn installed_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<InstalledModels, BackendError>;

    /// Pull `model` and wait for the backend to report success.
    async fn pull(&self, model: &str, cancel: &CancellationToken) -> Result<(), BackendError>;
}
