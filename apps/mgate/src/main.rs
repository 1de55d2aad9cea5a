use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use mgate_core::{
    check_present, reconcile_forever, reconcile_once, ErrorKind, GateConfig, GateError, Mode,
    OllamaBackend, RawSettings, ReadinessLoop,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

fn exit_status(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::ConfigurationInvalid => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}

#[derive(Parser)]
#[command(
    name = "mgate",
    version,
    about = "Make sure a model backend holds the required models before dependents start"
)]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BackendArgs {
    /// Backend base URL, e.g. http://ollama:11434
    #[arg(long, global = true, env = "OLLAMA_BASE_URL")]
    base_url: Option<String>,
    /// Required models, separated by commas or whitespace
    #[arg(long, global = true, env = "REQUIRED_MODELS")]
    models: Option<String>,
    /// Budget for each backend call (e.g. 10s, 1m30s)
    #[arg(long, global = true, env = "REQUEST_TIMEOUT")]
    request_timeout: Option<String>,
    /// Pause between readiness attempts (default 2s)
    #[arg(long, global = true, env = "RETRY_BACKOFF")]
    retry_backoff: Option<String>,
}

#[derive(Args)]
struct StartupArgs {
    /// Overall deadline for reaching readiness
    #[arg(long, env = "STARTUP_TIMEOUT")]
    startup_timeout: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the backend once; exit non-zero if any required model is missing
    Probe,
    /// Wait until the required models are installed, then idle until signalled
    Gate(StartupArgs),
    /// Gate, then re-ensure the required models periodically
    Reconcile {
        #[command(flatten)]
        startup: StartupArgs,
        /// Period between ensure cycles
        #[arg(long, env = "LOOP_INTERVAL")]
        loop_interval: Option<String>,
    },
}

impl Cli {
    fn mode(&self) -> Mode {
        match self.command {
            Commands::Probe => Mode::Probe,
            Commands::Gate(_) => Mode::Gate,
            Commands::Reconcile { .. } => Mode::Reconcile,
        }
    }

    fn settings(&self) -> RawSettings {
        let (startup_timeout, loop_interval) = match &self.command {
            Commands::Probe => (None, None),
            Commands::Gate(startup) => (startup.startup_timeout.clone(), None),
            Commands::Reconcile {
                startup,
                loop_interval,
            } => (startup.startup_timeout.clone(), loop_interval.clone()),
        };
        RawSettings {
            base_url: self.backend.base_url.clone(),
            required_models: self.backend.models.clone(),
            request_timeout: self.backend.request_timeout.clone(),
            startup_timeout,
            retry_backoff: self.backend.retry_backoff.clone(),
            loop_interval,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    mgate_otel::init("mgate");
    let cli = Cli::parse();
    let mode = cli.mode();
    let config = match GateConfig::from_settings(&cli.settings(), mode).map_err(GateError::from) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(exit_status(err.kind()));
        }
    };
    match run(mode, config).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            let status = err
                .downcast_ref::<GateError>()
                .map_or(EXIT_FAILURE, |gate| exit_status(gate.kind()));
            ExitCode::from(status)
        }
    }
}

async fn run(mode: Mode, config: GateConfig) -> Result<ExitCode> {
    let backend = OllamaBackend::new(&config).context("build backend client")?;
    if mode == Mode::Probe {
        return probe(&backend, &config).await;
    }

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let startup_limit = config
        .startup_timeout
        .ok_or_else(|| anyhow!("startup timeout not configured"))?;
    info!(
        endpoint = %config.base_url,
        models = config.required.len(),
        startup_timeout = ?startup_limit,
        "waiting for backend"
    );
    let readiness = ReadinessLoop::new(
        &backend,
        &config.required,
        startup_limit,
        config.retry_backoff,
    );
    match readiness.wait_until_ready(&cancel).await {
        Ok(report) => info!(pulled = ?report.pulled, "backend ready"),
        Err(GateError::Cancelled) => {
            warn!("shutdown requested before the backend was ready");
            return Ok(ExitCode::SUCCESS);
        }
        Err(err) => return Err(err).context("readiness gate failed"),
    }

    match (mode, config.loop_interval) {
        (Mode::Reconcile, Some(interval)) if interval.is_zero() => {
            reconcile_once(&backend, &config.required, &cancel)
                .await
                .context("reconcile pass failed")?;
        }
        (Mode::Reconcile, Some(interval)) => {
            info!(interval = ?interval, "reconciling");
            let cycles = reconcile_forever(&backend, &config.required, interval, &cancel).await;
            info!(cycles, "reconcile loop stopped");
        }
        _ => {
            cancel.cancelled().await;
            info!("gate released");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn probe(backend: &OllamaBackend, config: &GateConfig) -> Result<ExitCode> {
    let missing = check_present(backend, &config.required, &CancellationToken::new())
        .await
        .context("probe failed")?;
    for model in &missing {
        eprintln!("missing model: {model}");
    }
    Ok(if missing.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Install the termination handlers now and cancel `cancel` once one fires.
fn spawn_shutdown_listener(cancel: CancellationToken) {
    #[cfg(unix)]
    let term = {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(term) => Some(term),
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable; listening for Ctrl-C only");
                None
            }
        }
    };

    tokio::spawn(async move {
        #[cfg(unix)]
        match term {
            Some(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        info!("shutdown signal received");
        cancel.cancel();
    });
}
