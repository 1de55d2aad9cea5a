//! Readiness-and-ensure engine for a model-serving backend.
//!
//! Given a required model set, [`ReadinessLoop`] waits for the backend to
//! answer, pulls whatever is missing and reports readiness before a deadline.
//! [`check_present`] is the one-shot variant and [`reconcile_forever`] keeps
//! the set installed after startup.

pub mod backend;
pub mod config;
pub mod ensure;
pub mod error;
pub mod ndjson;
pub mod ollama;
pub mod pull;
pub mod readiness;
pub mod reconcile;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use backend::{InstalledModels, ModelBackend};
pub use config::{parse_duration, ConfigError, GateConfig, Mode, RawSettings, RequiredModels};
pub use ensure::{check_present, ensure_all, missing_models, EnsureReport};
pub use error::{BackendError, ErrorKind, GateError};
pub use ollama::OllamaBackend;
pub use pull::{PullEvent, PullEvents, PULL_SUCCESS_STATUS};
pub use readiness::{ReadinessLoop, ReadinessState};
pub use reconcile::{reconcile_forever, reconcile_once};
