use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const SERVICE_NAME: &str = "danci-mastery";

/// Optional file sink, enabled with `ENABLE_FILE_LOGS`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileLogSettings {
    pub dir: PathBuf,
    pub prefix: String,
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl LogRotation {
    /// Unknown values rotate daily.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("hourly") => LogRotation::Hourly,
            Some("never") => LogRotation::Never,
            _ => LogRotation::Daily,
        }
    }

    fn as_rotation(self) -> Rotation {
        match self {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

impl FileLogSettings {
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        if !enabled {
            return None;
        }

        Some(Self {
            dir: non_empty_env("LOG_DIR").unwrap_or_else(|| "./logs".to_string()).into(),
            prefix: non_empty_env("LOG_FILE_PREFIX").unwrap_or_else(|| format!("{SERVICE_NAME}.log")),
            rotation: LogRotation::parse(std::env::var("LOG_ROTATION").ok().as_deref()),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Keeps the background file writer alive; drop it only at shutdown.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn init_tracing(log_level: &str, file: Option<&FileLogSettings>) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);

    let file_writer = file.and_then(|settings| match std::fs::create_dir_all(&settings.dir) {
        Ok(()) => {
            let appender = RollingFileAppender::new(
                settings.rotation.as_rotation(),
                &settings.dir,
                &settings.prefix,
            );
            Some(tracing_appender::non_blocking(appender))
        }
        Err(err) => {
            eprintln!("log directory {} unavailable, file logs disabled: {err}", settings.dir.display());
            None
        }
    });

    let (file_layer, guard) = match file_writer {
        Some((writer, guard)) => (
            Some(fmt::layer().with_writer(writer).with_ansi(false).with_target(true)),
            Some(FileLogGuard { _guard: guard }),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        service = SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION"),
        file_logs = guard.is_some(),
        "logging initialised"
    );
    guard
}
