use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::runtime_paths;

/// Initializes tracing: compact console output plus a daily-rotated file
/// under the app data directory. The returned guard must stay alive for the
/// process lifetime or buffered file output is lost.
pub(crate) fn init() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chinook_desktop_tauri=debug"));

    let console_layer = fmt::layer().compact();

    let file_layer = runtime_paths::default_data_dir().and_then(|data_dir| {
        let log_dir = data_dir.join("logs");
        std::fs::create_dir_all(&log_dir).ok()?;
        let appender = tracing_appender::rolling::daily(&log_dir, "chinook-desktop.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Some((fmt::layer().with_ansi(false).with_writer(writer), guard))
    });

    match file_layer {
        Some((layer, guard)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(layer)
                .init();
            Some(guard)
        }
        None => {
            // No writable data directory; console logging still works.
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .init();
            None
        }
    }
}
