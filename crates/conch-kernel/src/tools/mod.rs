//! Builtin commands and the tool registry.

pub mod builtin;
mod traits;

pub use traits::{Tool, ToolRegistry};

use std::sync::Arc;

use conch_types::{CmdError, Msg};

use crate::chan::{chan, Receiver, Sender};
use crate::context::Ctx;
use crate::stream;

/// The builtin tool set.
pub fn builtins() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(Arc::new(builtin::echo::Echo));
    reg.register(Arc::new(builtin::rf::Rf));
    reg.register(Arc::new(builtin::wr::Wr));
    reg.register(Arc::new(builtin::lf::Lf));
    reg.register(Arc::new(builtin::all::All));
    reg.register(Arc::new(builtin::cnt::Cnt));
    reg.register(Arc::new(builtin::lns::Lns));
    reg.register(Arc::new(builtin::gr::Gr));
    reg.register(Arc::new(builtin::srt::Srt));
    reg.register(Arc::new(builtin::diffs::Diffs));
    reg.register(Arc::new(builtin::xp::Xp));
    reg
}

/// A receiver that is already closed; stands in for a missing endpoint.
pub(crate) fn closed_input() -> Receiver<Msg> {
    let (tx, rx) = chan::<Msg>(1);
    tx.close(None);
    rx
}

/// The typed input for a command: its file arguments as a traversal
/// stream, or its `in` endpoint when there are none. An argument naming
/// an installed input endpoint (from `<|{...}`) reads that endpoint.
pub(crate) fn input_stream(ctx: &Ctx, args: &[String]) -> Receiver<Msg> {
    if args.is_empty() {
        return ctx.io_in("in").unwrap_or_else(closed_input);
    }
    // endpoints and paths may be mixed; forward each in order
    let (tx, out) = chan(crate::chan::CHAN_CAP);
    let sources: Vec<Result<Receiver<Msg>, String>> = args
        .iter()
        .map(|a| match ctx.io_in(a) {
            Some(rx) => Ok(rx),
            None => Err(a.clone()),
        })
        .collect();
    let ctx = ctx.clone();
    tokio::spawn(async move {
        for src in sources {
            let rx = match src {
                Ok(rx) => rx,
                Err(path) => stream::files(&ctx, &[path]),
            };
            while let Some(m) = rx.recv().await {
                if !tx.send(m).await {
                    rx.close(tx.cause());
                    return;
                }
            }
            if let Some(e) = rx.cause() {
                tx.send(Msg::Err(e)).await;
            }
        }
        tx.close(None);
    });
    out
}

/// Send on `out`; on failure close `input` with the downstream cause and
/// report it, which is how back-pressure unwinds a producer.
pub(crate) async fn send_or_close(
    out: &Sender<Msg>,
    input: &Receiver<Msg>,
    m: Msg,
) -> Result<(), CmdError> {
    if out.send(m).await {
        Ok(())
    } else {
        let cause = out.cause().unwrap_or(CmdError::Intr);
        input.close(Some(cause.clone()));
        Err(cause)
    }
}

/// The command's `out` endpoint or an error.
pub(crate) fn out_chan(ctx: &Ctx) -> Result<Sender<Msg>, CmdError> {
    ctx.io_out("out")
        .ok_or_else(|| CmdError::BadCtl("no out endpoint".into()))
}
