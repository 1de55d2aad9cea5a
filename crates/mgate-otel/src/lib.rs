use once_cell::sync::OnceCell;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Install the process-wide subscriber.
///
/// Console output is always on and filtered by `RUST_LOG` (default `info`).
/// When `MGATE_LOG_DIR` is set, the same events are also written to a rolling
/// file named after `service` in that directory.
pub fn init(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(console.with_filter(filter));

    let Some(dir) = std::env::var("MGATE_LOG_DIR")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    else {
        let _ = registry.try_init();
        return;
    };

    if std::fs::create_dir_all(&dir).is_err() {
        let _ = registry.try_init();
        tracing::warn!(directory = %dir, "failed to create log directory; file logging disabled");
        return;
    }
    let rotation = std::env::var("MGATE_LOG_ROTATION").unwrap_or_else(|_| "daily".into());
    let writer = match rotation.trim().to_ascii_lowercase().as_str() {
        "hourly" => tracing_appender::rolling::hourly(&dir, service),
        "never" => tracing_appender::rolling::never(&dir, format!("{service}.log")),
        _ => tracing_appender::rolling::daily(&dir, service),
    };
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let _ = FILE_GUARD.set(guard);
    let file_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(nb)
        .with_filter(file_filter);
    let _ = registry.with(file_layer).try_init();
}
