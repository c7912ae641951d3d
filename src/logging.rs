use std::path::Path;
use tracing::subscriber::set_global_default;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initialize console + rotating JSON file logging.
pub fn init_logging(log_dir: impl AsRef<Path>, log_level: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir.as_ref(), "clinic.log");

    let file_layer = fmt::layer()
        .json()
        .with_writer(file_appender)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = Registry::default()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer);

    set_global_default(subscriber)?;

    tracing::info!("Logging initialized with level: {}", log_level);

    Ok(())
}

/// Structured audit event.
/// Pass ids only; names, contact data and clinical text must stay out of logs.
#[macro_export]
macro_rules! audit_log {
    ($event_type:expr, $action:expr, $user_id:expr, $success:expr) => {
        tracing::info!(
            event_type = $event_type,
            action = $action,
            user_id = ?$user_id,
            success = $success,
            timestamp = chrono::Utc::now().to_rfc3339(),
            "AUDIT_EVENT"
        );
    };
}

/// In-memory log sink for tests that assert on emitted events.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl CapturedLogs {
    /// JSON subscriber writing into this sink, for use with `set_default`.
    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let sink = self.clone();
        Registry::default().with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(move || sink.clone()),
        )
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
