use crate::domain::settings::LogSettings;
use anyhow::Context;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the file writer alive; buffered lines are flushed on drop.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// `RUST_LOG` wins over the configured level; an unparsable level falls
/// back to `info`.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn rotation(name: &str) -> Rotation {
    match name.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn console_layer(settings: &LogSettings) -> BoxedLayer {
    fmt::layer()
        .with_writer(std::io::stdout)
        .with_file(settings.show_file_line)
        .with_line_number(settings.show_file_line)
        .with_thread_ids(settings.show_thread_ids)
        .with_target(settings.show_target)
        .with_ansi(settings.ansi_colors)
        .boxed()
}

fn file_layer(settings: &LogSettings) -> anyhow::Result<(BoxedLayer, WorkerGuard)> {
    std::fs::create_dir_all(&settings.log_dir)
        .with_context(|| format!("cannot create log directory {}", settings.log_dir))?;
    let appender = RollingFileAppender::new(
        rotation(&settings.rotation),
        &settings.log_dir,
        &settings.file_name_prefix,
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(settings.show_file_line)
        .with_line_number(settings.show_file_line)
        .with_thread_ids(settings.show_thread_ids)
        .with_target(settings.show_target)
        .boxed();
    Ok((layer, guard))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    if settings.console_logging_enabled {
        layers.push(console_layer(settings));
    }
    let file_guard = if settings.file_logging_enabled {
        let (layer, guard) = file_layer(settings)?;
        layers.push(layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(level_filter(&settings.level))
        .try_init()
        .context("a global logger is already installed")?;

    tracing::info!(
        level = %settings.level,
        log_dir = %settings.log_dir,
        file = settings.file_logging_enabled,
        "Logging initialized"
    );
    Ok(LoggingGuard { _file: file_guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_names() {
        assert_eq!(rotation("Hourly"), Rotation::HOURLY);
        assert_eq!(rotation("never"), Rotation::NEVER);
        assert_eq!(rotation("weekly"), Rotation::DAILY);
    }

    #[test]
    fn test_file_logging_writes_to_log_dir() {
        let dir = std::env::temp_dir()
            .join(format!("gatt_session_logs_{}", std::process::id()))
            .join("nested");
        let settings = LogSettings {
            level: "debug".to_string(),
            file_logging_enabled: true,
            console_logging_enabled: false,
            log_dir: dir.to_string_lossy().into_owned(),
            rotation: "never".to_string(),
            ..LogSettings::default()
        };

        let guard = init_logger(&settings).unwrap();
        tracing::info!("written to file");
        drop(guard);

        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert!(!entries.is_empty());
        // a second global subscriber is refused
        assert!(init_logger(&settings).is_err());
        if let Some(parent) = dir.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
