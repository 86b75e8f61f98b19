//! The text model: mark-preserving edits, versioning, undo groups, and
//! the shared-session layer that editor views talk to.

pub mod buffer;
pub mod session;

pub use buffer::{Edit, EditOp, Mark, Text};
pub use session::{EngineEvent, SharedText, TextHold, ViewEvent};
