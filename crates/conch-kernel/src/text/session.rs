//! Shared text sessions: one buffer, one holder, many viewers.
//!
//! The engine owns the buffer. Views send [`ViewEvent`]s; the engine
//! answers with [`EngineEvent`]s. Every applied edit carries a `vers` that
//! must be exactly `buffer.vers + 1` — any mismatch means the view lost an
//! update and gets a full reload instead of a corrupt splice.
//!
//! Commands that mutate the buffer first take exclusive ownership with
//! [`SharedText::get_text`]; while held, the event handler answers `Held`
//! rather than racing, and releasing the hold broadcasts an invalidation
//! on the version watch channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, OwnedMutexGuard};

use super::buffer::{EditOp, Text};

/// Events a view sends to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// Selection changed.
    Tick { p0: usize, p1: usize },
    /// Insert `text` at `p0`; valid only at `vers == buffer.vers + 1`.
    Ins { vers: u64, p0: usize, text: String },
    /// Delete `[p0, p1)`; valid only at `vers == buffer.vers + 1`.
    Del { vers: u64, p0: usize, p1: usize },
    Undo,
    Redo,
    Intr,
    NeedReload,
}

/// Events the engine sends back to views.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Replace the whole view content.
    Reload(String),
    /// The reload (or initial load) is complete at this version.
    Reloaded(u64),
    Ins { p0: usize, text: String },
    Del { p0: usize, p1: usize },
    Sel { p0: usize, p1: usize },
    Dirty,
    Clean,
    Edits,
    NoEdits,
    /// The buffer is exclusively held by a command; try again later.
    Held,
}

/// A buffer shared between the engine's commands and its views.
#[derive(Clone)]
pub struct SharedText {
    text: Arc<Mutex<Text>>,
    held: Arc<AtomicBool>,
    vers_tx: Arc<watch::Sender<u64>>,
}

/// Exclusive ownership of the buffer. Dropping it releases the hold and
/// broadcasts the new version to viewers.
pub struct TextHold {
    guard: OwnedMutexGuard<Text>,
    held: Arc<AtomicBool>,
    vers_tx: Arc<watch::Sender<u64>>,
}

impl std::ops::Deref for TextHold {
    type Target = Text;
    fn deref(&self) -> &Text {
        &self.guard
    }
}

impl std::ops::DerefMut for TextHold {
    fn deref_mut(&mut self) -> &mut Text {
        &mut self.guard
    }
}

impl Drop for TextHold {
    fn drop(&mut self) {
        let vers = self.guard.vers();
        self.held.store(false, Ordering::Release);
        let _ = self.vers_tx.send(vers);
    }
}

impl SharedText {
    pub fn new(initial: &str) -> Self {
        let text = Text::from_str(initial);
        let (vers_tx, _) = watch::channel(text.vers());
        SharedText {
            text: Arc::new(Mutex::new(text)),
            held: Arc::new(AtomicBool::new(false)),
            vers_tx: Arc::new(vers_tx),
        }
    }

    /// Take exclusive ownership of the buffer. The event handler answers
    /// `Held` until the returned handle is dropped.
    pub async fn get_text(&self) -> TextHold {
        let guard = self.text.clone().lock_owned().await;
        self.held.store(true, Ordering::Release);
        TextHold {
            guard,
            held: self.held.clone(),
            vers_tx: self.vers_tx.clone(),
        }
    }

    /// Watch buffer versions; a change means viewers must refresh.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.vers_tx.subscribe()
    }

    /// Apply one view event, returning what to tell the views.
    pub async fn apply(&self, ev: ViewEvent) -> Vec<EngineEvent> {
        if self.held.load(Ordering::Acquire) {
            return vec![EngineEvent::Held];
        }
        let mut t = match self.text.try_lock() {
            Ok(t) => t,
            Err(_) => return vec![EngineEvent::Held],
        };
        match ev {
            ViewEvent::Tick { p0, p1 } => vec![EngineEvent::Sel { p0, p1 }],
            ViewEvent::NeedReload => reload(&t),
            ViewEvent::Intr => Vec::new(),
            ViewEvent::Ins { vers, p0, text } => {
                if vers != t.vers() + 1 {
                    return reload(&t);
                }
                match t.ins_str(&text, p0) {
                    Ok(()) => vec![EngineEvent::Ins { p0, text }, EngineEvent::Dirty],
                    Err(_) => reload(&t),
                }
            }
            ViewEvent::Del { vers, p0, p1 } => {
                if vers != t.vers() + 1 || p1 < p0 {
                    return reload(&t);
                }
                t.del(p0, p1 - p0);
                vec![EngineEvent::Del { p0, p1 }, EngineEvent::Dirty]
            }
            ViewEvent::Undo => {
                let undone = t.undo();
                if undone.is_empty() {
                    return vec![EngineEvent::NoEdits];
                }
                let mut out: Vec<EngineEvent> = undone.iter().map(to_engine).collect();
                out.push(if t.dirty() { EngineEvent::Dirty } else { EngineEvent::Clean });
                if !t.has_edits() {
                    out.push(EngineEvent::NoEdits);
                }
                out
            }
            ViewEvent::Redo => {
                let redone = t.redo();
                if redone.is_empty() {
                    return vec![EngineEvent::NoEdits];
                }
                let mut out: Vec<EngineEvent> = redone.iter().map(to_engine).collect();
                out.push(EngineEvent::Edits);
                out
            }
        }
    }
}

fn to_engine(e: &super::buffer::Edit) -> EngineEvent {
    match e.op {
        EditOp::Ins => EngineEvent::Ins {
            p0: e.off,
            text: e.data.iter().collect(),
        },
        EditOp::Del => EngineEvent::Del {
            p0: e.off,
            p1: e.off + e.data.len(),
        },
    }
}

fn reload(t: &Text) -> Vec<EngineEvent> {
    vec![
        EngineEvent::Reload(t.to_string()),
        EngineEvent::Reloaded(t.vers()),
    ]
}
