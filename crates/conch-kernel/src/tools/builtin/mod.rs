//! The builtin command set.

pub mod all;
pub mod cnt;
pub mod diffs;
pub mod echo;
pub mod gr;
pub mod lf;
pub mod lns;
pub mod rf;
pub mod srt;
pub mod wr;
pub mod xp;

#[cfg(test)]
pub(crate) mod testutil {
    use conch_types::Msg;

    use crate::chan::{chan, Receiver, Sender, TryRecv};
    use crate::context::Ctx;

    /// A context with captured `out`/`err` channels and the given argv.
    pub fn ctx_with_args(args: &[&str]) -> (Ctx, Receiver<Msg>) {
        let ctx = Ctx::new().with_args(args.iter().map(|s| s.to_string()).collect());
        let (tx, rx) = chan(4096);
        ctx.set_out("out", tx.clone());
        ctx.set_out("err", tx);
        (ctx, rx)
    }

    /// Feed messages into the context's `in` endpoint, closing after.
    pub async fn feed_in(ctx: &Ctx, msgs: Vec<Msg>) {
        let (tx, rx): (Sender<Msg>, Receiver<Msg>) = chan(1024);
        ctx.set_in("in", rx);
        for m in msgs {
            tx.send(m).await;
        }
        tx.close(None);
    }

    /// Everything buffered on the captured channel, as text.
    pub fn out_text(rx: &Receiver<Msg>) -> String {
        let mut s = String::new();
        loop {
            match rx.try_recv() {
                TryRecv::Msg(Msg::Bytes(b)) => s.push_str(&String::from_utf8_lossy(&b)),
                TryRecv::Msg(_) => {}
                _ => break,
            }
        }
        s
    }

    /// All buffered messages.
    pub fn out_msgs(rx: &Receiver<Msg>) -> Vec<Msg> {
        let mut v = Vec::new();
        loop {
            match rx.try_recv() {
                TryRecv::Msg(m) => v.push(m),
                _ => break,
            }
        }
        v
    }
}
