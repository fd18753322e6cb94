//! Crate-wide error taxonomy.
//!
//! Every fallible operation in `hivestore` returns `Result<T, Error>`. The
//! variants are kinds, not layers: the same `Error::NotFound` is returned
//! whether the miss happened in the local engine or, after a round trip
//! through the log, on a strong read.

use std::io;

use crate::path::BucketPath;

/// The crate's universal error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A write, membership change, or strong read was attempted against a
    /// peer that is not the current Raft leader.
    #[error("not leader")]
    NotLeader,

    /// The requested key or bucket does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A logical create collided with an existing item under a policy that
    /// treats that as an error rather than a no-op.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A bucket path was empty, malformed, or contained an invalid segment.
    #[error("invalid bucket path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A Raft commit or a leader-election wait exceeded its configured
    /// budget.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A lower-level Raft failure: transport, log append, or internal
    /// protocol error. The caller may retry.
    #[error("replication error: {0}")]
    ReplicationError(String),

    /// Local engine I/O or transaction failure.
    #[error("storage error: {0}")]
    StorageError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The FSM detected state that could not have arisen from valid,
    /// deterministic log replay. Fatal: the peer must not keep
    /// participating once this is observed.
    #[error("corruption detected: {0}")]
    Corruption(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn invalid_path(path: &BucketPath, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.render(),
            reason: reason.into(),
        }
    }

    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::StorageError(Box::new(source))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::storage(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A wire-serializable mirror of [`Error`].
///
/// `Error` itself can't cross `openraft`'s state-machine response type
/// (`StorageError` holds a `Box<dyn std::error::Error>`, which isn't
/// `Serialize`), so the FSM carries failures back to the caller as this
/// instead. [`CommandError::into_error`] reconstructs the original kind
/// on the strong-read/write path, so a caller still sees `NotFound`,
/// `Corruption`, and so on rather than a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CommandError {
    NotLeader,
    NotFound(String),
    AlreadyExists(String),
    InvalidPath { path: String, reason: String },
    Timeout(std::time::Duration),
    ReplicationError(String),
    StorageError(String),
    Corruption(String),
}

impl CommandError {
    pub fn into_error(self) -> Error {
        match self {
            CommandError::NotLeader => Error::NotLeader,
            CommandError::NotFound(s) => Error::NotFound(s),
            CommandError::AlreadyExists(s) => Error::AlreadyExists(s),
            CommandError::InvalidPath { path, reason } => Error::InvalidPath { path, reason },
            CommandError::Timeout(d) => Error::Timeout(d),
            CommandError::ReplicationError(s) => Error::ReplicationError(s),
            CommandError::StorageError(s) => Error::storage(RemoteError(s)),
            CommandError::Corruption(s) => Error::Corruption(s),
        }
    }
}

impl From<&Error> for CommandError {
    fn from(e: &Error) -> Self {
        match e {
            Error::NotLeader => CommandError::NotLeader,
            Error::NotFound(s) => CommandError::NotFound(s.clone()),
            Error::AlreadyExists(s) => CommandError::AlreadyExists(s.clone()),
            Error::InvalidPath { path, reason } => {
                CommandError::InvalidPath { path: path.clone(), reason: reason.clone() }
            }
            Error::Timeout(d) => CommandError::Timeout(*d),
            Error::ReplicationError(s) => CommandError::ReplicationError(s.clone()),
            Error::StorageError(s) => CommandError::StorageError(s.to_string()),
            Error::Corruption(s) => CommandError::Corruption(s.clone()),
        }
    }
}

/// Reconstructs a boxed `std::error::Error` from a message that already
/// crossed the wire once, so [`CommandError::into_error`] can rebuild an
/// `Error::StorageError` without a real source error to hand it.
#[derive(Debug)]
struct RemoteError(String);

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for RemoteError {}
