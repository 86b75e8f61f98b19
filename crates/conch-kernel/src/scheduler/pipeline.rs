//! The pipeline engine: wiring stages into a DAG of typed channels.
//!
//! For each pipe, every stage gets a fresh child context (its endpoint
//! table forked, everything else shared), one channel per junction tag,
//! and its redirections applied; then all stages run concurrently as
//! tasks. When a stage finishes, the channels installed for it are closed
//! with the stage's error, which is all the signalling the rest of the
//! pipe needs: upstream sends start failing, downstream receivers drain
//! and end. The pipe's status is the last stage's status.
//!
//! Endpoints inherited from the parent (the shell's own `in`/`out`/`err`)
//! are never closed here; only what this pipe created is.

use conch_types::{CmdError, Msg};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::ast::{Cmd, Pipe, Redir, RedirOp, Word};
use crate::chan::{chan, Receiver, Sender, CHAN_CAP};
use crate::context::{Ctx, ForkWhat};
use crate::eval::Shell;
use crate::wire;

/// Channels and bridge tasks installed for one stage, closed and awaited
/// when the stage completes.
#[derive(Default)]
pub struct StageOwned {
    pub outs: Vec<Sender<Msg>>,
    pub ins: Vec<Receiver<Msg>>,
    /// File writer tasks; their errors become the stage's when it had none.
    writers: Vec<JoinHandle<Result<(), CmdError>>>,
    /// File reader tasks; ended by closing their channel, errors ignored.
    readers: Vec<JoinHandle<Result<(), CmdError>>>,
}

/// Run a pipe against `ctx`. A backgrounded pipe is detached into the
/// job table and this returns immediately.
pub async fn run_pipe(sh: &Shell, pipe: &Pipe, ctx: &Ctx) -> Result<(), CmdError> {
    match &pipe.bg {
        None => run_pipe_fg(sh.clone(), pipe.clone(), ctx.clone()).await,
        Some(tag) => {
            let fg = Pipe {
                stages: pipe.stages.clone(),
                tags: pipe.tags.clone(),
                bg: None,
            };
            let desc = pipe_desc(&fg);
            let handle = tokio::spawn(run_pipe_fg(sh.clone(), fg, ctx.clone()));
            let tag = sh.jobs().add(tag, desc, handle);
            debug!(%tag, "detached background pipe");
            Ok(())
        }
    }
}

async fn run_pipe_fg(sh: Shell, pipe: Pipe, ctx: Ctx) -> Result<(), CmdError> {
    let n = pipe.stages.len();
    if n == 0 {
        return Ok(());
    }
    let ctxs: Vec<Ctx> = (0..n).map(|_| ctx.fork(&[ForkWhat::Io])).collect();
    let mut owned: Vec<StageOwned> = (0..n).map(|_| StageOwned::default()).collect();
    for i in 0..n - 1 {
        let (tx, rx) = chan(CHAN_CAP);
        let (ltag, rtag) = match &pipe.tags[i] {
            Some(t) => (t.as_str(), t.as_str()),
            None => ("out", "in"),
        };
        ctxs[i].set_out(ltag, tx.clone());
        ctxs[i + 1].set_in(rtag, rx.clone());
        owned[i].outs.push(tx);
        owned[i + 1].ins.push(rx);
    }
    let mut handles = Vec::with_capacity(n);
    for ((stage, cctx), sowned) in pipe.stages.into_iter().zip(ctxs).zip(owned) {
        handles.push(tokio::spawn(run_stage(sh.clone(), stage, cctx, sowned)));
    }
    let mut last = Ok(());
    let count = handles.len();
    for (i, h) in handles.into_iter().enumerate() {
        let res = match h.await {
            Ok(r) => r,
            Err(e) => Err(CmdError::Bug(format!("stage panicked: {e}"))),
        };
        if i == count - 1 {
            last = res;
        }
    }
    last
}

/// Run one stage: apply its redirections, run its body, then close what
/// it owned with the outcome so its peers unwind.
pub async fn run_stage(
    sh: Shell,
    cmd: Cmd,
    ctx: Ctx,
    mut owned: StageOwned,
) -> Result<(), CmdError> {
    let res = if ctx.interrupted() {
        Err(CmdError::Intr)
    } else {
        match apply_redirs(&sh, &ctx, cmd_redirs(&cmd), &mut owned).await {
            Ok(()) => sh.run_cmd_body(&cmd, &ctx).await,
            Err(e) => Err(e),
        }
    };
    let cause = res.as_ref().err().cloned();
    for tx in &owned.outs {
        tx.close(cause.clone());
    }
    for rx in &owned.ins {
        rx.close(cause.clone());
    }
    let mut res = res;
    for h in owned.writers.drain(..) {
        if let Ok(Err(e)) = h.await {
            if res.is_ok() {
                res = Err(e);
            }
        }
    }
    for h in owned.readers.drain(..) {
        let _ = h.await;
    }
    res
}

fn cmd_redirs(cmd: &Cmd) -> &[Redir] {
    match cmd {
        Cmd::Exec { redirs, .. }
        | Cmd::For { redirs, .. }
        | Cmd::While { redirs, .. }
        | Cmd::Cond { redirs, .. } => redirs,
        Cmd::Block(b) => &b.redirs,
        Cmd::Set { .. } | Cmd::SetMap { .. } => &[],
    }
}

/// Bind redirection targets to the stage's endpoints: files become byte
/// bridge tasks, duplicate tags share one channel.
async fn apply_redirs(
    sh: &Shell,
    ctx: &Ctx,
    redirs: &[Redir],
    owned: &mut StageOwned,
) -> Result<(), CmdError> {
    for r in redirs {
        let target = sh.expand_simple(&r.target, ctx).await?;
        let path = ctx.resolve(&target);
        match r.op {
            RedirOp::In => {
                let f = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| CmdError::from_io(&target, &e))?;
                let (tx, rx) = chan(CHAN_CAP);
                owned.readers.push(tokio::spawn(async move {
                    let mut f = f;
                    let res = wire::read_bytes(&mut f, &tx).await;
                    tx.close(res.as_ref().err().cloned());
                    res
                }));
                for tag in &r.tags {
                    ctx.set_in(tag, rx.clone());
                }
                owned.ins.push(rx);
            }
            RedirOp::Out | RedirOp::Append => {
                let f = match r.op {
                    RedirOp::Out => tokio::fs::File::create(&path).await,
                    _ => {
                        tokio::fs::OpenOptions::new()
                            .append(true)
                            .open(&path)
                            .await
                    }
                }
                .map_err(|e| CmdError::from_io(&target, &e))?;
                let (tx, rx) = chan(CHAN_CAP);
                owned.writers.push(tokio::spawn(async move {
                    let mut f = f;
                    wire::write_bytes(&mut f, &rx).await
                }));
                for tag in &r.tags {
                    ctx.set_out(tag, tx.clone());
                }
                owned.outs.push(tx);
            }
        }
    }
    Ok(())
}

/// A short description of a pipe for the job table.
fn pipe_desc(pipe: &Pipe) -> String {
    let names: Vec<String> = pipe
        .stages
        .iter()
        .map(|s| match s {
            Cmd::Exec { words, .. } => words
                .first()
                .map(|w: &Word| w.to_string())
                .unwrap_or_else(|| "?".to_string()),
            Cmd::Block(_) => "{...}".to_string(),
            Cmd::For { .. } => "for".to_string(),
            Cmd::While { .. } => "while".to_string(),
            Cmd::Cond { .. } => "cond".to_string(),
            Cmd::Set { name, .. } | Cmd::SetMap { name, .. } => format!("{name}="),
        })
        .collect();
    names.join(" | ")
}
