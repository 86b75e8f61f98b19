//! srt — sort the lines of each file.

use async_trait::async_trait;
use conch_types::{CmdError, Msg};

use crate::context::Ctx;
use crate::opt::{Opts, Parsed};
use crate::stream;
use crate::tools::{input_stream, out_chan, send_or_close, Tool};

pub struct Srt;

#[async_trait]
impl Tool for Srt {
    fn name(&self) -> &'static str {
        "srt"
    }

    fn usage(&self) -> &'static str {
        "{file}"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("srt", self.usage())
            .flag('D', "debug")
            .flag('r', "reverse order")
            .flag('n', "numeric order")
            .flag('u', "use unix out");
        let parsed = opts.parse(&ctx.args[1..])?;
        if parsed.has('u') {
            ctx.unix_io(&["out"]);
        }
        let input = stream::lines(input_stream(&ctx, &parsed.args));
        let out = out_chan(&ctx)?;

        let mut lines: Vec<Vec<u8>> = Vec::new();
        while let Some(m) = input.recv().await {
            match m {
                Msg::Bytes(b) => lines.push(b),
                Msg::Dir(d) => {
                    flush(&out, &input, &mut lines, &parsed).await?;
                    send_or_close(&out, &input, Msg::Dir(d)).await?;
                }
                Msg::Err(e) => {
                    ctx.warn(e.to_string()).await;
                }
                other => send_or_close(&out, &input, other).await?,
            }
        }
        flush(&out, &input, &mut lines, &parsed).await?;
        match input.cause() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn flush(
    out: &crate::chan::Sender<Msg>,
    input: &crate::chan::Receiver<Msg>,
    lines: &mut Vec<Vec<u8>>,
    parsed: &Parsed,
) -> Result<(), CmdError> {
    if parsed.has('n') {
        lines.sort_by(|a, b| {
            let na = parse_num(a);
            let nb = parse_num(b);
            na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        lines.sort();
    }
    if parsed.has('r') {
        lines.reverse();
    }
    for l in lines.drain(..) {
        send_or_close(out, input, Msg::Bytes(l)).await?;
    }
    Ok(())
}

fn parse_num(line: &[u8]) -> f64 {
    String::from_utf8_lossy(line)
        .trim()
        .parse::<f64>()
        .unwrap_or(f64::NEG_INFINITY)
}
