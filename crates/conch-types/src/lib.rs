//! conch-types: the vocabulary every conch command speaks.
//!
//! This crate provides:
//!
//! - **Msg**: the sum type flowing on command channels
//! - **Dir**: the ordered directory record identifying a file
//! - **Addr**: an editable-file address
//! - **CmdError**: the error taxonomy carried by messages and channel closes

pub mod dir;
pub mod error;
pub mod msg;

pub use dir::Dir;
pub use error::CmdError;
pub use msg::{Addr, Msg};
