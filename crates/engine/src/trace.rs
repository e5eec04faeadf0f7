//! Tracing bootstrap.
//!
//! Hosts call [`init_tracing`] once per process. With a trace-log path the
//! subscriber writes structured events to that file; otherwise they go to
//! stderr. The filter comes from `RUST_LOG`, defaulting to `info`.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
///
/// # Errors
///
/// Returns an error when the trace-log file cannot be created.
pub fn init_tracing(trace_log: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match trace_log {
        Some(path) => {
            let file = File::create(path)?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_log_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log");
        init_tracing(Some(&path)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("trace.log");
        assert!(init_tracing(Some(&path)).is_err());
    }
}
