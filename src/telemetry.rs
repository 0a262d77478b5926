//! Tracing setup.
//!
//! The config file decides where logs go, so events raised while loading it
//! are written to stderr by a short-lived bootstrap subscriber.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt, fmt::writer::BoxMakeWriter, fmt::MakeWriter, prelude::*, EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

fn env_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive("sitebot=debug".parse()?))
}

/// Installs the process-wide subscriber described by `[logging]`.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let writer = match &logging.file {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_log_file(path)?)),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if logging.json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer()
            .with_ansi(logging.file.is_none())
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter()?)
        .init();
    Ok(())
}

/// Runs `f` with a plain stderr subscriber active on this thread.
pub fn with_bootstrap_logging<T>(f: impl FnOnce() -> T) -> T {
    with_logging_to(std::io::stderr, f)
}

fn with_logging_to<W, T>(writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(writer)
            .with_filter(LevelFilter::INFO),
    );
    tracing::subscriber::with_default(subscriber, f)
}

/// Opens the log file for appending, creating its directory first.
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log dir: {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn events_before_init_are_not_lost() {
        let captured = Captured::default();

        let value = with_logging_to(captured.clone(), || {
            tracing::warn!("SITEBOT_CONFIG points to a missing file");
            tracing::debug!("too chatty");
            7
        });

        assert_eq!(value, 7);
        let text = captured.text();
        assert!(text.contains("WARN"));
        assert!(text.contains("SITEBOT_CONFIG points to a missing file"));
        assert!(!text.contains("too chatty"));
    }

    #[test]
    fn config_loading_events_reach_the_bootstrap_writer() {
        let dir = tempfile::tempdir().unwrap();
        let captured = Captured::default();

        let written = with_logging_to(captured.clone(), || {
            crate::config::write_default_if_missing(&dir.path().join("config.toml"))
        });

        assert!(written.is_ok());
        assert!(captured.text().contains("Wrote default config"));
    }

    #[test]
    fn log_file_is_created_with_parents_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/nested/sitebot.log");

        writeln!(open_log_file(&path).unwrap(), "first").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
