//! rf — read files into the typed stream.
//!
//! With arguments, produces `Dir` + `Bytes` streams for each named file
//! (or forwards an installed input endpoint of that name, which is what
//! `<|{...}` arguments turn into). Without arguments it reads `in` the
//! way a Unix ingress does: contiguous data is coalesced and re-chunked,
//! message boundaries are not preserved, and anything structured is
//! forwarded as-is once pending data has been flushed.

use async_trait::async_trait;
use conch_types::{CmdError, Msg};

use crate::context::Ctx;
use crate::opt::Opts;
use crate::tools::{input_stream, out_chan, send_or_close, Tool};
use crate::wire::MSG_SZ;

pub struct Rf;

#[async_trait]
impl Tool for Rf {
    fn name(&self) -> &'static str {
        "rf"
    }

    fn usage(&self) -> &'static str {
        "{file}"
    }

    async fn run(&self, mut ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("rf", self.usage())
            .flag('D', "debug")
            .flag('u', "use unix out");
        let parsed = opts.parse(&ctx.args[1..])?;
        if parsed.has('D') {
            ctx.debug = true;
        }
        if parsed.has('u') {
            ctx.unix_io(&["out"]);
        }
        let out = out_chan(&ctx)?;

        if !parsed.args.is_empty() {
            // typed mode: forward the file streams untouched
            let input = input_stream(&ctx, &parsed.args);
            let mut sts = Ok(());
            while let Some(m) = input.recv().await {
                ctx.dprintf(format!("got {}\n", m.kind())).await;
                if let Msg::Err(e) = &m {
                    ctx.warn(e.to_string()).await;
                    sts = Err(e.clone());
                    continue;
                }
                send_or_close(&out, &input, m).await?;
            }
            return match input.cause() {
                Some(e) => Err(e),
                None => sts,
            };
        }

        // unix ingress mode on `in`: coalesce and re-chunk data
        let input = input_stream(&ctx, &[]);
        let mut buf: Vec<u8> = Vec::new();
        while let Some(m) = input.recv().await {
            match m {
                Msg::Bytes(b) => {
                    buf.extend_from_slice(&b);
                    while buf.len() >= MSG_SZ {
                        let chunk: Vec<u8> = buf.drain(..MSG_SZ).collect();
                        send_or_close(&out, &input, Msg::Bytes(chunk)).await?;
                    }
                }
                other => {
                    if !buf.is_empty() {
                        let pending = std::mem::take(&mut buf);
                        send_or_close(&out, &input, Msg::Bytes(pending)).await?;
                    }
                    send_or_close(&out, &input, other).await?;
                }
            }
        }
        if !buf.is_empty() {
            send_or_close(&out, &input, Msg::Bytes(buf)).await?;
        }
        match input.cause() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
