//! The per-command application context.
//!
//! Every command runs against a `Ctx`: a bag of named IO endpoints, an
//! environment, a namespace and working directory, an interrupt notifier,
//! and the argument vector. Contexts are forked for children; `fork`
//! deep-copies exactly the parts asked for and shares the rest, so a
//! `for` body can get a private environment while still writing to the
//! parent's output channel.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use conch_types::{CmdError, Msg};

use crate::chan::{Intr, Receiver, Sender};
use crate::env::EnvSet;
use crate::ns::Namespace;

/// Parts of a context that `fork` copies instead of sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkWhat {
    Env,
    Ns,
    Dot,
    Io,
}

/// The named endpoint table. `in`, `out`, and `err` are conventions, not
/// requirements; redirections and pipes install endpoints under any tag.
#[derive(Debug, Clone, Default)]
pub struct IoSet {
    ins: HashMap<String, Receiver<Msg>>,
    outs: HashMap<String, Sender<Msg>>,
    unix: HashSet<String>,
}

impl IoSet {
    fn names(map_keys: impl Iterator<Item = String>) -> Vec<String> {
        let mut v: Vec<_> = map_keys.collect();
        v.sort();
        v
    }
}

/// A command's application context.
#[derive(Debug, Clone)]
pub struct Ctx {
    pub args: Vec<String>,
    pub debug: bool,
    pub verb: bool,
    io: Arc<Mutex<IoSet>>,
    env: Arc<Mutex<EnvSet>>,
    ns: Arc<Mutex<Namespace>>,
    dot: Arc<Mutex<PathBuf>>,
    intr: Intr,
}

impl Default for Ctx {
    fn default() -> Self {
        Self::new()
    }
}

impl Ctx {
    pub fn new() -> Self {
        Ctx {
            args: Vec::new(),
            debug: false,
            verb: false,
            io: Arc::new(Mutex::new(IoSet::default())),
            env: Arc::new(Mutex::new(EnvSet::new())),
            ns: Arc::new(Mutex::new(Namespace::new())),
            dot: Arc::new(Mutex::new(PathBuf::from("/"))),
            intr: Intr::new(),
        }
    }

    /// Replace the argument vector, builder style.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// The command name: `args[0]` or a placeholder.
    pub fn argv0(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "conch".to_string())
    }

    fn io_lock(&self) -> MutexGuard<'_, IoSet> {
        self.io.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn env_lock(&self) -> MutexGuard<'_, EnvSet> {
        self.env.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── endpoints ──────────────────────────────────────────────────────

    /// The input endpoint `name`, if assigned. The handle is a clone; all
    /// clones share the same channel.
    pub fn io_in(&self, name: &str) -> Option<Receiver<Msg>> {
        self.io_lock().ins.get(name).cloned()
    }

    /// The output endpoint `name`, if assigned.
    pub fn io_out(&self, name: &str) -> Option<Sender<Msg>> {
        self.io_lock().outs.get(name).cloned()
    }

    pub fn set_in(&self, name: impl Into<String>, rx: Receiver<Msg>) {
        self.io_lock().ins.insert(name.into(), rx);
    }

    pub fn set_out(&self, name: impl Into<String>, tx: Sender<Msg>) {
        self.io_lock().outs.insert(name.into(), tx);
    }

    pub fn del_io(&self, name: &str) {
        let mut io = self.io_lock();
        io.ins.remove(name);
        io.outs.remove(name);
    }

    pub fn in_names(&self) -> Vec<String> {
        IoSet::names(self.io_lock().ins.keys().cloned())
    }

    pub fn out_names(&self) -> Vec<String> {
        IoSet::names(self.io_lock().outs.keys().cloned())
    }

    /// Mark endpoints as Unix IO: when bound to an OS fd they carry raw
    /// bytes instead of framed messages. With no names, all endpoints.
    /// The switch is one way once data has crossed.
    pub fn unix_io(&self, names: &[&str]) {
        let mut io = self.io_lock();
        if names.is_empty() {
            let all: Vec<String> = io
                .ins
                .keys()
                .chain(io.outs.keys())
                .cloned()
                .collect();
            io.unix.extend(all);
        } else {
            io.unix.extend(names.iter().map(|s| s.to_string()));
        }
    }

    pub fn is_unix(&self, name: &str) -> bool {
        self.io_lock().unix.contains(name)
    }

    /// Close every endpoint with the given cause. Called when the command
    /// owning this context is done, so peers unwind promptly.
    pub fn close_io(&self, cause: Option<CmdError>) {
        let io = self.io_lock();
        for rx in io.ins.values() {
            rx.close(cause.clone());
        }
        for tx in io.outs.values() {
            tx.close(cause.clone());
        }
    }

    // ── environment ────────────────────────────────────────────────────

    pub fn get_env(&self, name: &str) -> String {
        self.env_lock().get(name)
    }

    pub fn set_env(&self, name: &str, val: &str) {
        self.env_lock().set(name, val);
    }

    pub fn env_list(&self, name: &str) -> Vec<String> {
        self.env_lock().list(name)
    }

    pub fn set_env_list(&self, name: &str, vals: Vec<String>) {
        self.env_lock().set_list(name, vals);
    }

    pub fn env_map(&self, name: &str) -> Option<HashMap<String, Vec<String>>> {
        self.env_lock().map(name).cloned()
    }

    pub fn set_env_map(&self, name: &str, m: HashMap<String, Vec<String>>) {
        self.env_lock().set_map(name, m);
    }

    pub fn env_index(&self, name: &str, idx: &str) -> Vec<String> {
        self.env_lock().index(name, idx)
    }

    pub fn set_env_index(&self, name: &str, idx: &str, val: String) -> Result<(), CmdError> {
        self.env_lock().set_index(name, idx, val)
    }

    pub fn env_len(&self, name: &str) -> usize {
        self.env_lock().len(name)
    }

    // ── namespace and dot ──────────────────────────────────────────────

    pub fn dot(&self) -> PathBuf {
        self.dot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn cd(&self, to: PathBuf) {
        *self.dot.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    pub fn ns(&self) -> Namespace {
        self.ns.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn mount(&self, prefix: &str, target: PathBuf) {
        self.ns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .mount(prefix, target);
    }

    /// Resolve a name through the namespace relative to dot.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let dot = self.dot();
        self.ns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(name, &dot)
    }

    // ── interrupt ──────────────────────────────────────────────────────

    pub fn intr(&self) -> Intr {
        self.intr.clone()
    }

    pub fn interrupted(&self) -> bool {
        self.intr.is_raised()
    }

    // ── diagnostics ────────────────────────────────────────────────────

    /// Write a data message to `out`. `false` means downstream closed.
    pub async fn printf(&self, s: impl Into<String>) -> bool {
        match self.io_out("out") {
            Some(out) => out.send(Msg::bytes(s.into())).await,
            None => false,
        }
    }

    /// Write a data message to `err`.
    pub async fn eprintf(&self, s: impl Into<String>) -> bool {
        match self.io_out("err") {
            Some(err) => err.send(Msg::bytes(s.into())).await,
            None => false,
        }
    }

    /// `name: message` diagnostic on `err`.
    pub async fn warn(&self, msg: impl AsRef<str>) -> bool {
        self.eprintf(format!("{}: {}\n", self.argv0(), msg.as_ref())).await
    }

    /// Diagnostic printed only under `-D`.
    pub async fn dprintf(&self, s: impl AsRef<str>) {
        if self.debug {
            self.eprintf(s.as_ref().to_string()).await;
        }
    }

    /// Warning printed only in verbose mode.
    pub async fn vwarn(&self, msg: impl AsRef<str>) {
        if self.verb {
            self.warn(msg).await;
        }
    }

    /// A condition the command cannot recover from: every endpoint is
    /// closed with the cause so peers unwind, and the error comes back to
    /// become the command's status.
    pub fn fatal(&self, e: CmdError) -> CmdError {
        self.close_io(Some(e.clone()));
        e
    }

    // ── forking ────────────────────────────────────────────────────────

    /// Create a child context. The parts named in `what` become deep,
    /// independent copies; everything else is shared with the parent.
    /// The interrupt notifier is always shared: an interrupt reaches the
    /// whole tree.
    pub fn fork(&self, what: &[ForkWhat]) -> Ctx {
        let copy = |w: ForkWhat| what.contains(&w);
        Ctx {
            args: self.args.clone(),
            debug: self.debug,
            verb: self.verb,
            io: if copy(ForkWhat::Io) {
                Arc::new(Mutex::new(self.io_lock().clone()))
            } else {
                self.io.clone()
            },
            env: if copy(ForkWhat::Env) {
                Arc::new(Mutex::new(self.env_lock().clone()))
            } else {
                self.env.clone()
            },
            ns: if copy(ForkWhat::Ns) {
                Arc::new(Mutex::new(
                    self.ns.lock().unwrap_or_else(|e| e.into_inner()).clone(),
                ))
            } else {
                self.ns.clone()
            },
            dot: if copy(ForkWhat::Dot) {
                Arc::new(Mutex::new(
                    self.dot.lock().unwrap_or_else(|e| e.into_inner()).clone(),
                ))
            } else {
                self.dot.clone()
            },
            intr: self.intr.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chan::chan;

    #[tokio::test]
    async fn endpoints_are_shared_handles() {
        let ctx = Ctx::new();
        let (tx, rx) = chan(8);
        ctx.set_out("out", tx);
        ctx.set_in("in", rx);
        assert!(ctx.printf("hi").await);
        let got = ctx.io_in("in").unwrap().recv().await.unwrap();
        assert_eq!(got.data(), Some(&b"hi"[..]));
    }

    #[tokio::test]
    async fn warn_prefixes_argv0() {
        let ctx = Ctx::new().with_args(vec!["cnt".to_string()]);
        let (tx, rx) = chan(8);
        ctx.set_out("err", tx);
        ctx.warn("bad file").await;
        let got = rx.recv().await.unwrap();
        assert_eq!(got.data(), Some(&b"cnt: bad file\n"[..]));
    }

    #[test]
    fn fork_env_is_private() {
        let parent = Ctx::new();
        parent.set_env("x", "1");
        let child = parent.fork(&[ForkWhat::Env]);
        child.set_env("x", "2");
        assert_eq!(parent.get_env("x"), "1");
        assert_eq!(child.get_env("x"), "2");
    }

    #[test]
    fn unforked_env_is_shared() {
        let parent = Ctx::new();
        let child = parent.fork(&[ForkWhat::Dot]);
        child.set_env("y", "7");
        assert_eq!(parent.get_env("y"), "7");
    }

    #[test]
    fn fork_dot_is_private() {
        let parent = Ctx::new();
        parent.cd(PathBuf::from("/a"));
        let child = parent.fork(&[ForkWhat::Dot]);
        child.cd(PathBuf::from("/b"));
        assert_eq!(parent.dot(), PathBuf::from("/a"));
        assert_eq!(child.dot(), PathBuf::from("/b"));
    }

    #[test]
    fn fork_io_detaches_the_table_not_the_channels() {
        let parent = Ctx::new();
        let (tx, _rx) = chan::<Msg>(1);
        parent.set_out("out", tx);
        let child = parent.fork(&[ForkWhat::Io]);
        // reassigning in the child must not touch the parent's table
        let (tx2, _rx2) = chan::<Msg>(1);
        child.set_out("out", tx2);
        child.del_io("out");
        assert!(parent.io_out("out").is_some());
        assert!(child.io_out("out").is_none());
    }

    #[tokio::test]
    async fn fatal_closes_endpoints_with_the_cause() {
        let ctx = Ctx::new();
        let (tx, rx) = chan::<Msg>(4);
        ctx.set_out("out", tx.clone());
        let e = ctx.fatal(CmdError::ReadOnly("/f".into()));
        assert_eq!(e, CmdError::ReadOnly("/f".into()));
        assert!(tx.is_closed());
        assert_eq!(rx.cause(), Some(e));
    }

    #[test]
    fn interrupt_is_always_shared() {
        let parent = Ctx::new();
        let child = parent.fork(&[ForkWhat::Env, ForkWhat::Io, ForkWhat::Dot, ForkWhat::Ns]);
        child.intr().raise();
        assert!(parent.interrupted());
    }

    #[test]
    fn resolve_goes_through_ns_and_dot() {
        let ctx = Ctx::new();
        ctx.cd(PathBuf::from("/work"));
        ctx.mount("/n", PathBuf::from("/tmp/n"));
        assert_eq!(ctx.resolve("x"), PathBuf::from("/work/x"));
        assert_eq!(ctx.resolve("/n/y"), PathBuf::from("/tmp/n/y"));
    }
}
