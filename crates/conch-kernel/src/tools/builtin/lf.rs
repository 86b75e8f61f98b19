//! lf — list files as directory records.

use async_trait::async_trait;
use conch_types::{CmdError, Msg};

use crate::context::Ctx;
use crate::opt::Opts;
use crate::stream;
use crate::tools::{out_chan, send_or_close, Tool};

pub struct Lf;

#[async_trait]
impl Tool for Lf {
    fn name(&self) -> &'static str {
        "lf"
    }

    fn usage(&self) -> &'static str {
        "{file}"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("lf", self.usage())
            .flag('D', "debug")
            .flag('u', "print records instead of sending them")
            .flag('l', "long format")
            .flag('g', "get contents");
        let parsed = opts.parse(&ctx.args[1..])?;
        let args = if parsed.args.is_empty() {
            vec![".,1".to_string()]
        } else {
            parsed.args.clone()
        };
        let dc = if parsed.has('g') {
            stream::files(&ctx, &args)
        } else {
            stream::dirs(&ctx, &args)
        };
        let out = out_chan(&ctx)?;
        let mut sts = Ok(());
        while let Some(m) = dc.recv().await {
            match m {
                Msg::Dir(d) => {
                    if parsed.has('u') {
                        let line = if parsed.has('l') { d.long_fmt() } else { d.fmt() };
                        send_or_close(&out, &dc, Msg::bytes(format!("{line}\n"))).await?;
                    } else {
                        send_or_close(&out, &dc, Msg::Dir(d)).await?;
                    }
                }
                Msg::Err(e) => {
                    ctx.warn(e.to_string()).await;
                    sts = Err(e);
                }
                other => send_or_close(&out, &dc, other).await?,
            }
        }
        match dc.cause() {
            Some(e) => Err(e),
            None => sts,
        }
    }
}
