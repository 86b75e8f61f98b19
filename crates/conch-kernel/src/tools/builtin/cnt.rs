//! cnt — count messages, lines, words, runes, and bytes.
//!
//! One report per file (`Dir` boundaries), then a total when more than
//! one file was seen. Data arriving before any `Dir` is counted under
//! the name `in`. Rune counting is incremental UTF-8: a char split
//! across two messages is counted once.

use async_trait::async_trait;
use conch_types::{CmdError, Msg};

use crate::context::Ctx;
use crate::opt::{Opts, Parsed};
use crate::tools::{input_stream, out_chan, send_or_close, Tool};

#[derive(Default, Clone)]
struct Count {
    name: String,
    msgs: u64,
    lines: u64,
    words: u64,
    runes: u64,
    bytes: u64,
}

impl Count {
    fn new(name: impl Into<String>) -> Self {
        Count { name: name.into(), ..Count::default() }
    }

    fn add(&mut self, other: &Count) {
        self.msgs += other.msgs;
        self.lines += other.lines;
        self.words += other.words;
        self.runes += other.runes;
        self.bytes += other.bytes;
    }

    fn report(&self, p: &Parsed) -> String {
        let name = if p.has('n') {
            String::new()
        } else {
            format!("  {}", self.name)
        };
        let one = |v: u64| format!("{v:8}{name}\n");
        if p.has('m') {
            one(self.msgs)
        } else if p.has('l') {
            one(self.lines)
        } else if p.has('w') {
            one(self.words)
        } else if p.has('r') {
            one(self.runes)
        } else if p.has('b') || p.has('c') {
            one(self.bytes)
        } else {
            format!(
                "{:8} {:8} {:8} {:8} {:8}{}\n",
                self.msgs, self.lines, self.words, self.runes, self.bytes, name
            )
        }
    }
}

pub struct Cnt;

#[async_trait]
impl Tool for Cnt {
    fn name(&self) -> &'static str {
        "cnt"
    }

    fn usage(&self) -> &'static str {
        "{file}"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("cnt", self.usage())
            .flag('D', "debug")
            .flag('m', "count just msgs")
            .flag('l', "count just lines")
            .flag('w', "count just words")
            .flag('r', "count just runes")
            .flag('b', "count just bytes")
            .flag('c', "count just characters")
            .flag('n', "print just totals")
            .flag('u', "use unix output")
            .flag('a', "count all messages and not just data msgs");
        let parsed = opts.parse(&ctx.args[1..])?;
        if parsed.has('u') {
            ctx.unix_io(&["out"]);
        }
        let input = input_stream(&ctx, &parsed.args);
        let out = out_chan(&ctx)?;

        let mut tots: Vec<Count> = Vec::new();
        let mut cur: Option<Count> = None;
        let mut saved: Vec<u8> = Vec::new();
        let mut inword = false;

        while let Some(m) = input.recv().await {
            match m {
                Msg::Dir(d) => {
                    inword = false;
                    saved.clear();
                    if let Some(c) = cur.take() {
                        if !parsed.has('n') {
                            send_or_close(&out, &input, Msg::bytes(c.report(&parsed))).await?;
                        }
                        tots.push(c);
                    }
                    if !d.is_dir() {
                        let name = match d.get("Upath") {
                            Some(u) => u.to_string(),
                            None => d.path().to_string(),
                        };
                        let mut c = Count::new(name);
                        if parsed.has('a') {
                            c.msgs += 1;
                        }
                        cur = Some(c);
                    }
                }
                Msg::Bytes(b) => {
                    let c = cur.get_or_insert_with(|| Count::new("in"));
                    c.msgs += 1;
                    c.bytes += b.len() as u64;
                    saved.extend_from_slice(&b);
                    scan_runes(&mut saved, c, &mut inword);
                }
                Msg::Err(e) => {
                    ctx.warn(e.to_string()).await;
                }
                _ => {
                    if parsed.has('a') {
                        if let Some(c) = cur.as_mut() {
                            c.msgs += 1;
                        }
                    }
                }
            }
        }
        if let Some(c) = cur.take() {
            if !parsed.has('n') {
                send_or_close(&out, &input, Msg::bytes(c.report(&parsed))).await?;
            }
            tots.push(c);
        }

        if tots.len() > 1 || parsed.has('n') {
            let mut tot = Count::new("total");
            for c in &tots {
                tot.add(c);
            }
            send_or_close(&out, &input, Msg::bytes(tot.report(&parsed))).await?;
        }

        match input.cause() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Consume complete UTF-8 from `buf`, tallying runes, words, and lines.
/// An incomplete trailing sequence stays for the next message; invalid
/// bytes count as one rune each, as a decoder would.
fn scan_runes(buf: &mut Vec<u8>, c: &mut Count, inword: &mut bool) {
    let mut i = 0;
    while i < buf.len() {
        match std::str::from_utf8(&buf[i..]) {
            Ok(s) => {
                for ch in s.chars() {
                    tally(ch, c, inword);
                }
                i = buf.len();
            }
            Err(e) => {
                let valid = e.valid_up_to();
                if valid > 0 {
                    let s = std::str::from_utf8(&buf[i..i + valid]).expect("valid prefix");
                    for ch in s.chars() {
                        tally(ch, c, inword);
                    }
                    i += valid;
                }
                match e.error_len() {
                    Some(n) => {
                        c.runes += 1;
                        i += n;
                    }
                    None => break, // incomplete tail
                }
            }
        }
    }
    buf.drain(..i);
}

fn tally(ch: char, c: &mut Count, inword: &mut bool) {
    c.runes += 1;
    if ch.is_whitespace() {
        *inword = false;
    } else if !*inword {
        *inword = true;
        c.words += 1;
    }
    if ch == '\n' {
        c.lines += 1;
    }
}
