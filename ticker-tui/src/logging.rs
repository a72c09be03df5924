use crate::error::ConfigError;
use parking_lot::Mutex;
use std::{
    fs::File,
    io::{self, Write},
    path::Path,
    sync::Arc,
};
use tracing_subscriber::{EnvFilter, fmt::MakeWriter};

/// Initialise `tracing`.
///
/// With a `logfile`, everything passing `RUST_LOG` (default `info`) is written there. Without
/// one, only errors are kept, buffered in the returned [`DeferredLog`] until the board has
/// released the terminal.
pub fn init_logging(logfile: Option<&Path>) -> Result<DeferredLog, ConfigError> {
    let deferred = DeferredLog::default();

    match logfile {
        Some(path) => {
            let file = File::create(path).map_err(|source| ConfigError::LogFile {
                path: path.to_path_buf(),
                source,
            })?;

            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("error"))
                .with_ansi(false)
                .with_writer(deferred.clone())
                .init();
        }
    }

    Ok(deferred)
}

/// In-memory log sink, drained once the terminal is restored.
#[derive(Clone, Debug, Default)]
pub struct DeferredLog {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl DeferredLog {
    /// Move everything buffered so far into `out`.
    pub fn drain_into<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let buffered = std::mem::take(&mut *self.buffer.lock());
        out.write_all(&buffered)?;
        out.flush()
    }
}

impl Write for DeferredLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DeferredLog {
    type Writer = DeferredLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
