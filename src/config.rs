use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Process-level settings read from the environment at startup. Anything
/// that belongs to a workspace lives in its `settings` table instead.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let workspace = non_empty("DOCSIGD_WORKSPACE").map(PathBuf::from);
        let log_filter = non_empty("DOCSIGD_LOG")
            .or_else(|| non_empty("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let log_format = match non_empty("DOCSIGD_LOG_FORMAT").as_deref() {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            workspace,
            log_filter,
            log_format,
        }
    }
}

/// Logs go to stderr; stdout carries the IPC responses.
pub fn init_logging(cfg: &DaemonConfig) {
    let filter = EnvFilter::try_new(&cfg.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match cfg.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(false).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
