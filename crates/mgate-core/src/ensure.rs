//! One ensure cycle: list what is installed, pull what is missing.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{InstalledModels, ModelBackend};
use crate::config::RequiredModels;
use crate::error::GateError;

/// What a successful ensure cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureReport {
    /// Models pulled during the cycle, in pull order.
    pub pulled: Vec<String>,
    pub already_present: usize,
}

impl EnsureReport {
    pub fn was_noop(&self) -> bool {
        self.pulled.is_empty()
    }
}

/// Required models absent from `installed`, in required order.
pub fn missing_models<'a>(
    required: &'a RequiredModels,
    installed: &InstalledModels,
) -> Vec<&'a str> {
    required.iter().filter(|m| !installed.contains(m)).collect()
}

/// Query the inventory once and report which required models are missing.
/// Never pulls.
pub async fn check_present<B>(
    backend: &B,
    required: &RequiredModels,
    cancel: &CancellationToken,
) -> Result<Vec<String>, GateError>
where
    B: ModelBackend + ?Sized,
{
    let installed = backend
        .installed_models(cancel)
        .await
        .map_err(GateError::Inventory)?;
    Ok(missing_models(required, &installed)
        .into_iter()
        .map(str::to_string)
        .collect())
}

/// Pull every missing required model, one at a time.
///
/// The inventory is fetched fresh on every call. The first failed pull ends
/// the cycle; models pulled before it stay installed and are skipped next time.
pub async fn ensure_all<B>(
    backend: &B,
    required: &RequiredModels,
    cancel: &CancellationToken,
) -> Result<EnsureReport, GateError>
where
    B: ModelBackend + ?Sized,
{
    let installed = backend
        .installed_models(cancel)
        .await
        .map_err(GateError::Inventory)?;
    let mut report = EnsureReport::default();
    for model in required.iter() {
        if installed.contains(model) {
            debug!(target: "mgate::engine", model = %model, "present");
            report.already_present += 1;
            continue;
        }
        info!(target: "mgate::engine", model = %model, "missing; pulling");
        backend
            .pull(model, cancel)
            .await
            .map_err(|err| GateError::pull(model, err))?;
        info!(target: "mgate::engine", model = %model, "pulled");
        report.pulled.push(model.to_string());
    }
    Ok(report)
}
