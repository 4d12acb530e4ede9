use std::backtrace::Backtrace;

use anyhow::anyhow;
use parse_display::Display;
use thiserror::Error;

/// Error kinds the simulation core distinguishes (spec §7).
///
/// Inside a running scenario every variant is fatal: the kernel aborts the
/// run. Inside the multi-experiment driver, configuration failures raised
/// while applying factors or running a single configuration are caught and
/// recorded in that configuration's result map instead of halting the sweep.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing base experiment, unknown/mistyped property path, or a failed
    /// `ComplexFactorSetter`.
    #[error("configuration error: {0}")]
    Configuration(anyhow::Error),

    /// Scheduling into the past, enabling a disabled notification bus below
    /// zero, negative processing time, or any other broken invariant.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A listener was registered while the notification bus was fanning out.
    #[error("listener registered during fan-out for {0:?}")]
    ConcurrentModification(crate::notify::EventKind),

    /// Two collectors produced the same result-map key.
    #[error("duplicate result key: {0}")]
    DuplicateResultKey(String),

    /// Any other unexpected failure inside an event handler.
    #[error(transparent)]
    RuntimeFault(anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Logging(anyhow::Error),

    #[error("lock poisoned: {msg}")]
    Poisoned { msg: String, backtrace: Backtrace },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A type alias that forces the usage of the custom error type.
pub type Result<T> = std::result::Result<T, Error>;

impl From<tracing::subscriber::SetGlobalDefaultError> for Error {
    fn from(err: tracing::subscriber::SetGlobalDefaultError) -> Self {
        Self::Logging(anyhow::Error::from(err))
    }
}

impl From<tracing_subscriber::util::TryInitError> for Error {
    fn from(err: tracing_subscriber::util::TryInitError) -> Self {
        Self::Logging(anyhow::Error::from(err))
    }
}

impl From<tracing_subscriber::reload::Error> for Error {
    fn from(err: tracing_subscriber::reload::Error) -> Self {
        Self::Logging(anyhow::Error::from(err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned {
            msg: err.to_string(),
            backtrace: Backtrace::capture(),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(anyhow::Error::from(err))
    }
}

impl Error {
    pub fn adhoc(msg: &'static str) -> Self {
        Self::Other(anyhow!(msg))
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::Configuration(anyhow!(msg.into()))
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

/// Tags a plain `Result` with the subsystem it failed in, turning it into
/// our [`Error`]. Lets fallible IO at the edges (trace writers, config
/// loading) read `foo().kind(ErrorKind::JobsCsv)?` instead of hand-rolling
/// a `map_err` closure at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "snake_case")]
pub enum ErrorKind {
    InvalidConfig,
    ChromeTracing,
    JobsCsv,
}

pub trait Kind<T> {
    fn kind(self, kind: ErrorKind) -> Result<T>;
}

impl<T, E> Kind<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn kind(self, kind: ErrorKind) -> Result<T> {
        self.map_err(|e| match kind {
            ErrorKind::InvalidConfig => Error::Configuration(anyhow::Error::new(e)),
            ErrorKind::ChromeTracing | ErrorKind::JobsCsv => {
                Error::RuntimeFault(anyhow::Error::new(e).context(kind.to_string()))
            }
        })
    }
}
