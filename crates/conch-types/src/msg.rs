//! The message sum type flowing on command channels.
//!
//! Commands forward messages they do not understand and process the ones
//! they do, so a stream stays useful through a pipeline of filters that
//! each care about a different variant.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dir::Dir;
use crate::error::CmdError;

/// An address within an editable file. Zero fields are absent: an `Addr`
/// with `ln0 == 0` carries no line information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addr {
    pub name: String,
    pub ln0: u32,
    pub ln1: u32,
    pub p0: u32,
    pub p1: u32,
}

impl Addr {
    /// An address naming a file with no positions.
    pub fn name(name: impl Into<String>) -> Self {
        Addr {
            name: name.into(),
            ..Addr::default()
        }
    }

    /// An address for a line range, 1-based and inclusive.
    pub fn lines(name: impl Into<String>, ln0: u32, ln1: u32) -> Self {
        Addr {
            name: name.into(),
            ln0,
            ln1,
            ..Addr::default()
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.ln0 != 0 {
            write!(f, ":{},{}", self.ln0, self.ln1)?;
        } else if self.p0 != 0 || self.p1 != 0 {
            write!(f, ":#{},#{}", self.p0, self.p1)?;
        }
        Ok(())
    }
}

/// One message on a typed channel.
///
/// The usual stream shape is a `Dir` followed by zero or more `Bytes` for
/// that file's content, then the next `Dir`. `Ign` payloads are data a
/// command must pass along untouched; `Other` carries in-process values
/// that never cross an OS boundary.
#[derive(Clone)]
pub enum Msg {
    Dir(Dir),
    Bytes(Vec<u8>),
    Addr(Addr),
    Ign(Vec<u8>),
    Err(CmdError),
    Other(Arc<dyn Any + Send + Sync>),
}

impl Msg {
    /// Wrap a string as one data message.
    pub fn bytes(s: impl Into<Vec<u8>>) -> Msg {
        Msg::Bytes(s.into())
    }

    /// The data payload, if this is a data message.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Msg::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Msg::Bytes(_))
    }

    /// A short tag for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Dir(_) => "dir",
            Msg::Bytes(_) => "bytes",
            Msg::Addr(_) => "addr",
            Msg::Ign(_) => "ign",
            Msg::Err(_) => "err",
            Msg::Other(_) => "other",
        }
    }
}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Msg::Dir(d) => write!(f, "Dir({})", d.path()),
            Msg::Bytes(b) => write!(f, "Bytes[{}]", b.len()),
            Msg::Addr(a) => write!(f, "Addr({a})"),
            Msg::Ign(b) => write!(f, "Ign[{}]", b.len()),
            Msg::Err(e) => write!(f, "Err({e})"),
            Msg::Other(_) => write!(f, "Other"),
        }
    }
}

impl From<Dir> for Msg {
    fn from(d: Dir) -> Msg {
        Msg::Dir(d)
    }
}

impl From<Vec<u8>> for Msg {
    fn from(b: Vec<u8>) -> Msg {
        Msg::Bytes(b)
    }
}

impl From<CmdError> for Msg {
    fn from(e: CmdError) -> Msg {
        Msg::Err(e)
    }
}
