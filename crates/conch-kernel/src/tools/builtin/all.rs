//! all — one data message per file.
//!
//! Collects the `Bytes` between `Dir` boundaries and re-emits each file's
//! content as a single message; `-1` collects the entire stream into one.

use async_trait::async_trait;
use conch_types::{CmdError, Msg};

use crate::context::Ctx;
use crate::opt::Opts;
use crate::tools::{input_stream, out_chan, send_or_close, Tool};

pub struct All;

#[async_trait]
impl Tool for All {
    fn name(&self) -> &'static str {
        "all"
    }

    fn usage(&self) -> &'static str {
        "{file}"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("all", self.usage())
            .flag('D', "debug")
            .flag('1', "collect all files into a single msg")
            .flag('u', "use unix out");
        let parsed = opts.parse(&ctx.args[1..])?;
        let one = parsed.has('1');
        let ux = parsed.has('u');
        if ux {
            ctx.unix_io(&["out"]);
        }
        let input = input_stream(&ctx, &parsed.args);
        let out = out_chan(&ctx)?;
        let mut buf: Vec<u8> = Vec::new();
        let mut sts = Ok(());
        while let Some(m) = input.recv().await {
            match m {
                Msg::Bytes(b) => buf.extend_from_slice(&b),
                Msg::Dir(d) => {
                    if !one && !buf.is_empty() {
                        let whole = std::mem::take(&mut buf);
                        send_or_close(&out, &input, Msg::Bytes(whole)).await?;
                    }
                    if !one && !ux {
                        send_or_close(&out, &input, Msg::Dir(d)).await?;
                    }
                }
                Msg::Err(e) => {
                    ctx.warn(e.to_string()).await;
                    if sts.is_ok() {
                        sts = Err(e);
                    }
                }
                other => {
                    if !ux {
                        send_or_close(&out, &input, other).await?;
                    }
                }
            }
        }
        if !buf.is_empty() {
            send_or_close(&out, &input, Msg::Bytes(buf)).await?;
        }
        match input.cause() {
            Some(e) => Err(e),
            None => sts,
        }
    }
}
