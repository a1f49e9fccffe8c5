//! Tracing subscriber setup

use std::fs::OpenOptions;
use std::path::Path;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install stdout logging plus an optional append-mode log file
///
/// `RUST_LOG` overrides `level`. If the file cannot be opened logging
/// continues on stdout only and the error is returned for reporting.
pub fn init(level: &str, log_file: Option<&Path>) -> Option<std::io::Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file = log_file.map(|path| OpenOptions::new().create(true).append(true).open(path));
    let (file, file_error) = match file {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(file)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    file_error
}
