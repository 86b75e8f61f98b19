//! The kernel facade: a shell plus a root context, ready to run.
//!
//! Embedders (the REPL, tests, a script runner) construct a `Kernel`,
//! optionally bound to the process's stdio, and feed it source text.
//! Stdio binding follows Unix IO semantics: `in` chunks raw bytes into
//! messages, `out`/`err` strip everything but data payloads.

use std::path::PathBuf;

use conch_types::CmdError;
use tokio::task::JoinHandle;

use crate::chan::{chan, CHAN_CAP};
use crate::context::Ctx;
use crate::env::EnvSet;
use crate::eval::Shell;
use crate::wire;

/// Kernel construction options.
#[derive(Debug, Clone, Default)]
pub struct KernelConfig {
    /// argv for the root context (argv0 is the shell's own name).
    pub args: Vec<String>,
    pub debug: bool,
    pub verb: bool,
    /// Initial working directory; the process cwd when absent.
    pub dot: Option<PathBuf>,
    /// Import the process environment into the root context.
    pub os_env: bool,
    /// Bind `in`/`out`/`err` to the process stdio.
    pub stdio: bool,
}

/// A shell bound to a root context.
pub struct Kernel {
    shell: Shell,
    ctx: Ctx,
    /// Stdout/stderr writers, drained on shutdown.
    writers: Vec<JoinHandle<Result<(), CmdError>>>,
    /// The stdin reader; may be parked in a blocking read, so shutdown
    /// aborts it instead of waiting.
    stdin_bridge: Option<JoinHandle<Result<(), CmdError>>>,
}

impl Kernel {
    pub fn new(cfg: KernelConfig) -> Kernel {
        let ctx = Ctx::new().with_args(cfg.args.clone());
        let mut ctx = ctx;
        ctx.debug = cfg.debug;
        ctx.verb = cfg.verb;
        let dot = cfg
            .dot
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));
        ctx.cd(dot);
        if cfg.os_env {
            let env = EnvSet::from_os();
            for (k, _) in env.to_os() {
                ctx.set_env_list(&k, env.list(&k));
            }
        }
        let mut writers = Vec::new();
        let mut stdin_bridge = None;
        if cfg.stdio {
            let (tx, rx) = chan(CHAN_CAP);
            ctx.set_in("in", rx);
            stdin_bridge = Some(tokio::spawn(async move {
                let mut stdin = tokio::io::stdin();
                let res = wire::read_bytes(&mut stdin, &tx).await;
                tx.close(res.as_ref().err().cloned());
                res
            }));
            let (tx, rx) = chan(CHAN_CAP);
            ctx.set_out("out", tx);
            writers.push(tokio::spawn(async move {
                let mut stdout = tokio::io::stdout();
                wire::write_bytes(&mut stdout, &rx).await
            }));
            let (tx, rx) = chan(CHAN_CAP);
            ctx.set_out("err", tx);
            writers.push(tokio::spawn(async move {
                let mut stderr = tokio::io::stderr();
                wire::write_bytes(&mut stderr, &rx).await
            }));
            ctx.unix_io(&[]);
        }
        Kernel {
            shell: Shell::new(),
            ctx,
            writers,
            stdin_bridge,
        }
    }

    pub fn ctx(&self) -> &Ctx {
        &self.ctx
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Run one source text; the result is also in `env.status`.
    pub async fn run(&self, src: &str) -> Result<(), CmdError> {
        self.shell.run_src(src, &self.ctx).await
    }

    /// The last command status: empty for success.
    pub fn status(&self) -> String {
        self.ctx.get_env("status")
    }

    /// Close the root endpoints and drain the stdio writers.
    pub async fn shutdown(self) {
        self.ctx.close_io(None);
        if let Some(b) = self.stdin_bridge {
            b.abort();
        }
        for w in self.writers {
            let _ = w.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kernel_runs_and_tracks_status() {
        let tmp = tempfile::tempdir().unwrap();
        let k = Kernel::new(KernelConfig {
            dot: Some(tmp.path().to_path_buf()),
            ..KernelConfig::default()
        });
        // no stdio: echo has no out endpoint, which is a status error
        assert!(k.run("nosuchcmd").await.is_err());
        assert!(!k.status().is_empty());
        k.run("x = 1").await.unwrap();
        assert_eq!(k.status(), "");
        k.shutdown().await;
    }

    #[tokio::test]
    async fn kernel_dot_defaults_to_cwd() {
        let k = Kernel::new(KernelConfig::default());
        assert!(k.ctx().dot().is_absolute());
        k.shutdown().await;
    }
}
