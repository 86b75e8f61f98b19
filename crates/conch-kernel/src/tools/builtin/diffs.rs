//! diffs — compare two file streams.
//!
//! Both inputs are read concurrently; whichever ends first, the other is
//! drained, and the LCS runs on the complete pair. Arrival order is
//! deliberately unordered, so `diffs <|{a} <|{b}` works no matter which
//! side produces first.

use async_trait::async_trait;
use conch_types::{CmdError, Msg};

use crate::context::Ctx;
use crate::opt::Opts;
use crate::tools::{input_stream, out_chan, Tool};

pub struct Diffs;

#[async_trait]
impl Tool for Diffs {
    fn name(&self) -> &'static str {
        "diffs"
    }

    fn usage(&self) -> &'static str {
        "file1 file2"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("diffs", self.usage())
            .flag('D', "debug")
            .flag('u', "use unix out");
        let parsed = opts.parse(&ctx.args[1..])?;
        if parsed.args.len() != 2 {
            return Err(CmdError::Usage(opts.usage()));
        }
        if parsed.has('u') {
            ctx.unix_io(&["out"]);
        }
        let name_a = parsed.args[0].clone();
        let name_b = parsed.args[1].clone();
        let rx_a = input_stream(&ctx, &parsed.args[..1]);
        let rx_b = input_stream(&ctx, &parsed.args[1..]);

        // concurrent collection; completion order is free
        let mut bytes_a: Vec<u8> = Vec::new();
        let mut bytes_b: Vec<u8> = Vec::new();
        let mut done_a = false;
        let mut done_b = false;
        let mut sts = Ok(());
        while !done_a || !done_b {
            tokio::select! {
                m = rx_a.recv(), if !done_a => match m {
                    Some(Msg::Bytes(b)) => bytes_a.extend_from_slice(&b),
                    Some(Msg::Err(e)) => sts = Err(e),
                    Some(_) => {}
                    None => done_a = true,
                },
                m = rx_b.recv(), if !done_b => match m {
                    Some(Msg::Bytes(b)) => bytes_b.extend_from_slice(&b),
                    Some(Msg::Err(e)) => sts = Err(e),
                    Some(_) => {}
                    None => done_b = true,
                },
            }
        }
        if let Some(e) = rx_a.cause().or_else(|| rx_b.cause()) {
            sts = Err(e);
        }
        sts?;

        let la = split_lines(&bytes_a);
        let lb = split_lines(&bytes_b);
        let diff = diff_lines(&name_a, &name_b, &la, &lb);
        let out = out_chan(&ctx)?;
        if !out.send(Msg::bytes(diff)).await {
            return Err(out.cause().unwrap_or(CmdError::Intr));
        }
        Ok(())
    }
}

fn split_lines(data: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(data);
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// LCS-based line diff: a `#diff` header, then `-`/`+` lines for what is
/// only in the first and only in the second file.
pub(crate) fn diff_lines(name_a: &str, name_b: &str, a: &[String], b: &[String]) -> String {
    let mut out = format!("#diff {name_a} {name_b}\n");
    // classic LCS table
    let (n, m) = (a.len(), b.len());
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }
    let (mut i, mut j) = (0, 0);
    let mut in_hunk = false;
    while i < n || j < m {
        if i < n && j < m && a[i] == b[j] {
            i += 1;
            j += 1;
            in_hunk = false;
            continue;
        }
        if !in_hunk {
            out.push_str(&format!("#at {},{}\n", i + 1, j + 1));
            in_hunk = true;
        }
        if j >= m || (i < n && lcs[i + 1][j] >= lcs[i][j + 1]) {
            out.push_str(&format!("-{}\n", a[i]));
            i += 1;
        } else {
            out.push_str(&format!("+{}\n", b[j]));
            j += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testutil::{ctx_with_args, out_text};

    fn lines(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn equal_inputs_have_empty_body() {
        let a = lines(&["x", "y"]);
        let d = diff_lines("a", "b", &a, &a);
        assert_eq!(d, "#diff a b\n");
    }

    #[test]
    fn one_line_change() {
        let a = lines(&["one", "two", "three"]);
        let b = lines(&["one", "2", "three"]);
        let d = diff_lines("a", "b", &a, &b);
        assert_eq!(d, "#diff a b\n#at 2,2\n-two\n+2\n");
    }

    #[test]
    fn pure_insert_and_delete() {
        let a = lines(&["keep"]);
        let b = lines(&["new", "keep"]);
        let d = diff_lines("a", "b", &a, &b);
        assert_eq!(d, "#diff a b\n#at 1,1\n+new\n");

        let d = diff_lines("b", "a", &b, &a);
        assert_eq!(d, "#diff b a\n#at 1,1\n-new\n");
    }

    #[test]
    fn disjoint_files_replace_wholesale() {
        let a = lines(&["a1", "a2"]);
        let b = lines(&["b1"]);
        let d = diff_lines("a", "b", &a, &b);
        assert!(d.contains("-a1\n"));
        assert!(d.contains("-a2\n"));
        assert!(d.contains("+b1\n"));
    }

    #[tokio::test]
    async fn diffs_two_files_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a"), "one\ntwo\n").unwrap();
        std::fs::write(tmp.path().join("b"), "one\n2\n").unwrap();
        let (ctx, rx) = ctx_with_args(&["diffs", "a", "b"]);
        ctx.cd(tmp.path().to_path_buf());
        Diffs.run(ctx).await.unwrap();
        let text = out_text(&rx);
        assert!(text.starts_with("#diff a b\n"));
        assert!(text.contains("-two\n"));
        assert!(text.contains("+2\n"));
    }

    #[tokio::test]
    async fn endpoint_inputs_in_either_order() {
        let (ctx, rx) = ctx_with_args(&["diffs", "in3", "in4"]);
        let (t3, r3) = crate::chan::chan(8);
        let (t4, r4) = crate::chan::chan(8);
        ctx.set_in("in3", r3);
        ctx.set_in("in4", r4);
        // second input completes first
        t4.send(Msg::bytes("x\n")).await;
        t4.close(None);
        t3.send(Msg::bytes("y\n")).await;
        t3.close(None);
        Diffs.run(ctx).await.unwrap();
        let text = out_text(&rx);
        assert!(text.contains("-y\n"));
        assert!(text.contains("+x\n"));
    }

    #[tokio::test]
    async fn wrong_arity_is_usage() {
        let (ctx, _rx) = ctx_with_args(&["diffs", "only-one"]);
        assert!(matches!(Diffs.run(ctx).await, Err(CmdError::Usage(_))));
    }
}
