mod warnings;

pub use warnings::{WarningLayer, WarningQuery, WarningRecord, WarningSink};

use std::path::PathBuf;
use std::sync::Arc;

use inteliome_settings::{expand_home, LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default filter directive. Overridden by RUST_LOG.
    pub level: String,
    pub format: LogFormat,
    /// Whether to persist warn+ events to SQLite.
    pub persist_warnings: bool,
    pub log_db_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_settings(&LoggingSettings::default())
    }
}

impl TelemetryConfig {
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            format: settings.format,
            persist_warnings: settings.persist_warnings,
            log_db_path: expand_home(&settings.log_db_path),
        }
    }

    /// The configured level, with HTTP internals capped at `warn`.
    fn filter_directive(&self) -> String {
        let level = self.level.to_lowercase();
        format!("{level},hyper=warn,reqwest=warn,rustls=warn")
    }
}

/// Keeps the warning sink alive for the process lifetime.
pub struct TelemetryGuard {
    warning_sink: Option<Arc<WarningSink>>,
}

impl TelemetryGuard {
    /// Access persisted warnings, when persistence is on.
    pub fn warnings(&self) -> Option<&WarningSink> {
        self.warning_sink.as_deref()
    }
}

/// Initialize logging. Call once at startup.
///
/// Output goes to stderr so stdout carries only the conversation.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let (json_layer, pretty_layer) = match config.format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Pretty => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    let (warning_layer, warning_sink) = if config.persist_warnings {
        match WarningSink::open(&config.log_db_path) {
            Ok(sink) => {
                let sink = Arc::new(sink);
                (Some(WarningLayer::new(sink.clone())), Some(sink))
            }
            Err(e) => {
                eprintln!("inteliome-telemetry: failed to open log DB: {e}");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .with(warning_layer)
        .try_init();

    TelemetryGuard { warning_sink }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_settings_expands_paths() {
        let settings = LoggingSettings {
            level: "DEBUG".into(),
            format: LogFormat::Json,
            persist_warnings: true,
            log_db_path: "/var/tmp/logs.db".into(),
        };
        let cfg = TelemetryConfig::from_settings(&settings);
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(cfg.persist_warnings);
        assert_eq!(cfg.log_db_path, PathBuf::from("/var/tmp/logs.db"));
        assert!(cfg.filter_directive().starts_with("debug,"));
    }

    #[test]
    fn default_config_is_quiet() {
        let cfg = TelemetryConfig::default();
        assert_eq!(cfg.level, "warn");
        assert!(!cfg.persist_warnings);
    }
}
