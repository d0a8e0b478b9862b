//! Logging initialisation
//!
//! Installs a global `tracing` subscriber from a [`LoggingConfig`]. The bridge
//! itself only emits events (target `rpcgate::server`); hosts that install
//! their own subscriber never need this module.
//!
//! # When is a Guard Needed?
//!
//! | Output Target | Guard Required |
//! |---------------|----------------|
//! | `Stderr` | No |
//! | `FileOnly` | **Yes** |
//! | `Both` | **Yes** |
//! | `None` | No |
//!
//! File output goes through a non-blocking writer; dropping the guard flushes
//! it. Drop it early and pending lines may be lost.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogOutput, LogRotation, LoggingConfig};

/// Keeps buffered file logs flowing; flushes them on drop.
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    _stderr_guard: Option<WorkerGuard>,
}

impl LoggingConfig {
    /// Install the global subscriber described by this configuration
    ///
    /// Returns `Some(LoggingGuard)` for file-based output (must be held), or
    /// `None` when no guard is needed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File output is configured without a directory, or it cannot be created
    /// - A global subscriber is already installed
    pub fn init(&self) -> io::Result<Option<LoggingGuard>> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.output {
            LogOutput::None => Ok(None),
            LogOutput::Stderr => {
                self.install(filter, io::stderr)?;
                Ok(None)
            }
            LogOutput::FileOnly => {
                let (writer, file_guard) = tracing_appender::non_blocking(self.appender()?);
                self.install(filter, writer)?;
                Ok(Some(LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: None,
                }))
            }
            LogOutput::Both => {
                let (file_writer, file_guard) = tracing_appender::non_blocking(self.appender()?);
                let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(io::stderr());
                self.install(filter, file_writer.and(stderr_writer))?;
                Ok(Some(LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: Some(stderr_guard),
                }))
            }
        }
    }

    fn appender(&self) -> io::Result<RollingFileAppender> {
        let dir = self.directory.as_deref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "file logging requires a directory",
            )
        })?;
        std::fs::create_dir_all(dir)?;
        Ok(rolling_appender(self.rotation, dir, &self.file_prefix))
    }

    fn install<W>(&self, filter: EnvFilter, writer: W) -> io::Result<()>
    where
        W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let subscriber = tracing_subscriber::registry().with(filter);
        let result = if self.structured {
            subscriber
                .with(fmt::layer().json().with_writer(writer))
                .try_init()
        } else {
            subscriber.with(fmt::layer().with_writer(writer)).try_init()
        };
        result.map_err(|e| io::Error::other(e.to_string()))
    }
}

fn rolling_appender(rotation: LogRotation, dir: &Path, prefix: &str) -> RollingFileAppender {
    match rotation {
        LogRotation::Minute => tracing_appender::rolling::minutely(dir, prefix),
        LogRotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
        LogRotation::Daily => tracing_appender::rolling::daily(dir, prefix),
        LogRotation::Never => tracing_appender::rolling::never(dir, prefix),
    }
}
