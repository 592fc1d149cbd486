use std::io;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;

/// Failure of a single transfer. Local to one URL; the partial file stays on disk.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{context}")]
    Io { context: String, source: io::Error },

    #[error("request failed")]
    Request(#[from] reqwest::Error),

    #[error("server returned {0}")]
    UnexpectedStatus(StatusCode),

    #[error("transfer did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("transfer cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("completion ledger {path:?} exists but cannot be read")]
    StorageUnavailable { path: PathBuf, source: io::Error },

    #[error("failed to append to completion ledger {path:?}")]
    Write { path: PathBuf, source: io::Error },

    #[error("refusing to record {0:?}: line breaks are not allowed in ledger entries")]
    InvalidEntry(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("parallelism must be at least 1")]
    ZeroParallelism,
}

/// Attaches a context string to io-like errors, anyhow style, while keeping
/// the typed [`TransferError`].
pub(crate) trait ErrContext<T> {
    fn context(self, context: impl Into<String>) -> Result<T, TransferError>;
}

impl<T, E: Into<io::Error>> ErrContext<T> for Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T, TransferError> {
        self.map_err(|err| TransferError::Io {
            context: context.into(),
            source: err.into(),
        })
    }
}
