//! The error taxonomy shared by every command.
//!
//! Errors are first-class data here: they travel as `Msg::Err` along output
//! streams and as the cause carried by a channel close. That forces `Clone`
//! (one error may reach many consumers) and keeps every kind a plain string
//! payload rather than a wrapped source error.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds, not error types: the set is closed and matching on a kind is
/// how commands decide whether a condition is recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CmdError {
    #[error("{0}: does not exist")]
    NotExist(String),
    #[error("{0}: already exists")]
    Exists(String),
    #[error("{0}: is a directory")]
    IsDir(String),
    #[error("{0}: not a directory")]
    NotDir(String),
    #[error("{0}: permission denied")]
    Perm(String),
    #[error("{0}: not empty")]
    NotEmpty(String),
    #[error("{0}: read only")]
    ReadOnly(String),
    #[error("bad control request: {0}")]
    BadCtl(String),
    #[error("interrupted")]
    Intr,
    #[error("usage: {0}")]
    Usage(String),
    #[error("bug: {0}")]
    Bug(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{0}")]
    Other(String),
}

impl CmdError {
    /// Build an `Other` error from anything printable.
    pub fn other(msg: impl Into<String>) -> Self {
        CmdError::Other(msg.into())
    }

    /// True for conditions a command may warn about and keep going.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CmdError::Intr | CmdError::Bug(_) | CmdError::Usage(_))
    }

    /// Map an OS error on `name` to the matching kind.
    pub fn from_io(name: &str, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => CmdError::NotExist(name.to_string()),
            io::ErrorKind::AlreadyExists => CmdError::Exists(name.to_string()),
            io::ErrorKind::PermissionDenied => CmdError::Perm(name.to_string()),
            io::ErrorKind::Interrupted => CmdError::Intr,
            _ => CmdError::Other(format!("{name}: {err}")),
        }
    }
}

impl From<io::Error> for CmdError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::Interrupted => CmdError::Intr,
            _ => CmdError::Other(err.to_string()),
        }
    }
}
