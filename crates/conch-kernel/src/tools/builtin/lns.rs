//! lns — print selected line ranges.
//!
//! Ranges come from `-r from,to` (or `-r n` for a single line), 1-based;
//! negative positions count from the end, so `-r -1` is the last line and
//! `-r 2,-2` drops the first and last. Without ranges every line passes.

use async_trait::async_trait;
use conch_types::{CmdError, Msg};

use crate::context::Ctx;
use crate::opt::{Opts, Parsed};
use crate::stream;
use crate::tools::{input_stream, out_chan, send_or_close, Tool};

/// A line range with possibly end-relative endpoints.
#[derive(Debug, Clone, Copy)]
struct Range {
    from: i64,
    to: i64,
}

impl Range {
    fn parse(s: &str) -> Result<Range, CmdError> {
        let bad = || CmdError::Usage(format!("lns: bad range {s:?}"));
        let (f, t) = match s.split_once(',') {
            Some((f, t)) => (f, t),
            None => (s, s),
        };
        let from: i64 = f.parse().map_err(|_| bad())?;
        let to: i64 = t.parse().map_err(|_| bad())?;
        if from == 0 || to == 0 {
            return Err(bad());
        }
        Ok(Range { from, to })
    }

    /// Resolve against a file of `n` lines into inclusive 1-based bounds.
    fn resolve(&self, n: usize) -> (i64, i64) {
        let n = n as i64;
        let fix = |v: i64| if v < 0 { n + 1 + v } else { v };
        (fix(self.from), fix(self.to))
    }

    fn contains(&self, idx: usize, n: usize) -> bool {
        let (f, t) = self.resolve(n);
        let i = idx as i64;
        i >= f && i <= t
    }
}

pub struct Lns;

#[async_trait]
impl Tool for Lns {
    fn name(&self) -> &'static str {
        "lns"
    }

    fn usage(&self) -> &'static str {
        "{file}"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("lns", self.usage())
            .flag('D', "debug")
            .flag('n', "print line numbers")
            .flag('p', "print file names and line numbers")
            .flag('u', "use unix out")
            .val_flag('r', "line range from,to; negatives count from the end");
        let parsed = opts.parse(&ctx.args[1..])?;
        if parsed.has('u') {
            ctx.unix_io(&["out"]);
        }
        let mut ranges = Vec::new();
        for r in parsed.vals('r') {
            ranges.push(Range::parse(r)?);
        }
        let input = stream::lines(input_stream(&ctx, &parsed.args));
        let out = out_chan(&ctx)?;

        let mut name = "in".to_string();
        let mut lines: Vec<Vec<u8>> = Vec::new();
        while let Some(m) = input.recv().await {
            match m {
                Msg::Bytes(b) => lines.push(b),
                Msg::Dir(d) => {
                    flush(&out, &input, &name, &lines, &ranges, &parsed).await?;
                    lines.clear();
                    name = d
                        .get("Upath")
                        .map(str::to_string)
                        .unwrap_or_else(|| d.path().to_string());
                    send_or_close(&out, &input, Msg::Dir(d)).await?;
                }
                Msg::Err(e) => {
                    ctx.warn(e.to_string()).await;
                }
                other => send_or_close(&out, &input, other).await?,
            }
        }
        flush(&out, &input, &name, &lines, &ranges, &parsed).await?;
        match input.cause() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn flush(
    out: &crate::chan::Sender<Msg>,
    input: &crate::chan::Receiver<Msg>,
    name: &str,
    lines: &[Vec<u8>],
    ranges: &[Range],
    parsed: &Parsed,
) -> Result<(), CmdError> {
    let n = lines.len();
    for (i, line) in lines.iter().enumerate() {
        let idx = i + 1;
        if !ranges.is_empty() && !ranges.iter().any(|r| r.contains(idx, n)) {
            continue;
        }
        let text = String::from_utf8_lossy(line);
        let m = if parsed.has('p') {
            Msg::bytes(format!("{name}:{idx:<5} {text}"))
        } else if parsed.has('n') {
            Msg::bytes(format!("{idx:<5} {text}"))
        } else {
            Msg::Bytes(line.clone())
        };
        send_or_close(out, input, m).await?;
    }
    Ok(())
}
