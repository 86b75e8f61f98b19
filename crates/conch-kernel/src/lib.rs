//! conch-kernel: the execution engine every conch command runs on.
//!
//! This crate provides:
//!
//! - **chan**: bounded typed channels with close-carried errors, plus the
//!   single-shot interrupt broadcast
//! - **context**: the per-command application context and its forking
//! - **env / ns**: list- and map-valued environments, prefix namespaces
//! - **scheduler**: the pipeline engine and background job table
//! - **ast / lexer / parser / eval**: the shell language
//! - **stream / wire**: structured stream adapters and OS-fd framing
//! - **pred**: predicates on directory records for traversal
//! - **text**: the mark-preserving, undoable text model
//! - **tools**: the builtin command set
//! - **expr**: the expression language behind `xp`
//! - **kernel**: the facade embedders drive

pub mod ast;
pub mod chan;
pub mod context;
pub mod env;
pub mod eval;
pub mod expr;
pub mod kernel;
pub mod lexer;
pub mod ns;
pub mod opt;
pub mod parser;
pub mod pred;
pub mod scheduler;
pub mod stream;
pub mod text;
pub mod tools;
pub mod wire;

pub use chan::{chan, Intr, Receiver, Sender, TryRecv, TrySend, CHAN_CAP};
pub use context::{Ctx, ForkWhat};
pub use eval::Shell;
pub use kernel::{Kernel, KernelConfig};
pub use parser::parse;
pub use pred::Pred;
pub use text::{SharedText, Text};
pub use tools::{Tool, ToolRegistry};
