//! gr — grep over typed line streams.
//!
//! Matches a regular expression against each line of each file on the
//! input. Matching lines pass through; `-l` reports file names only,
//! `-f` forwards whole files with at least one match, `-a` emits address
//! messages for addressing-aware consumers, `-v` inverts. Exits with
//! `no match` when nothing matched, so `gr` works as a condition.

use async_trait::async_trait;
use conch_types::{Addr, CmdError, Dir, Msg};
use regex::Regex;

use crate::chan::{Receiver, Sender};
use crate::context::Ctx;
use crate::opt::Opts;
use crate::stream;
use crate::tools::{input_stream, out_chan, send_or_close, Tool};

pub struct Gr;

#[async_trait]
impl Tool for Gr {
    fn name(&self) -> &'static str {
        "gr"
    }

    fn usage(&self) -> &'static str {
        "rexp {file}"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("gr", self.usage())
            .flag('D', "debug")
            .flag('v', "select non-matching lines")
            .flag('l', "print just file names")
            .flag('f', "print whole files with matches")
            .flag('a', "send addresses for matches")
            .flag('s', "no output, just the exit status")
            .flag('u', "use unix out");
        let parsed = opts.parse(&ctx.args[1..])?;
        if parsed.has('u') {
            ctx.unix_io(&["out"]);
        }
        let Some(rexp) = parsed.args.first() else {
            return Err(CmdError::Usage(opts.usage()));
        };
        let re = Regex::new(rexp).map_err(|e| CmdError::Usage(format!("gr: {e}")))?;
        let full = parsed.has('f');
        let input = stream::lines(input_stream(&ctx, &parsed.args[1..]));
        let out = out_chan(&ctx)?;

        let mut name = "in".to_string();
        let mut file_found = false;
        let mut found = false;
        let mut pending_dir: Option<Dir> = None;
        let mut file_lines: Vec<Vec<u8>> = Vec::new();
        let mut ln = 0u32;

        while let Some(m) = input.recv().await {
            match m {
                Msg::Dir(d) => {
                    if full && file_found {
                        flush_file(&out, &input, pending_dir.take(), &mut file_lines).await?;
                    }
                    file_lines.clear();
                    if parsed.has('l') && file_found {
                        send_or_close(&out, &input, Msg::bytes(format!("{name}\n"))).await?;
                    }
                    file_found = false;
                    ln = 0;
                    name = d
                        .get("Upath")
                        .map(str::to_string)
                        .unwrap_or_else(|| d.path().to_string());
                    // records travel only once the file has a match
                    pending_dir = Some(d);
                }
                Msg::Bytes(b) => {
                    ln += 1;
                    let line = String::from_utf8_lossy(&b);
                    let hit = re.is_match(line.trim_end_matches('\n')) != parsed.has('v');
                    if full {
                        file_lines.push(b.to_vec());
                    }
                    if !hit {
                        continue;
                    }
                    file_found = true;
                    found = true;
                    if full || parsed.has('s') || parsed.has('l') {
                        continue;
                    }
                    if let Some(d) = pending_dir.take() {
                        send_or_close(&out, &input, Msg::Dir(d)).await?;
                    }
                    if parsed.has('a') {
                        send_or_close(
                            &out,
                            &input,
                            Msg::Addr(Addr::lines(name.clone(), ln, ln)),
                        )
                        .await?;
                    } else {
                        send_or_close(&out, &input, Msg::Bytes(b)).await?;
                    }
                }
                Msg::Err(e) => {
                    ctx.warn(e.to_string()).await;
                }
                _ => {}
            }
        }
        if full && file_found {
            flush_file(&out, &input, pending_dir.take(), &mut file_lines).await?;
        }
        if parsed.has('l') && file_found {
            send_or_close(&out, &input, Msg::bytes(format!("{name}\n"))).await?;
        }
        if let Some(e) = input.cause() {
            return Err(e);
        }
        if found {
            Ok(())
        } else {
            Err(CmdError::other("no match"))
        }
    }
}

/// Forward a whole matching file: its record, then every buffered line.
async fn flush_file(
    out: &Sender<Msg>,
    input: &Receiver<Msg>,
    dir: Option<Dir>,
    lines: &mut Vec<Vec<u8>>,
) -> Result<(), CmdError> {
    if let Some(d) = dir {
        send_or_close(out, input, Msg::Dir(d)).await?;
    }
    for l in lines.drain(..) {
        send_or_close(out, input, Msg::Bytes(l)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testutil::{ctx_with_args, feed_in, out_msgs, out_text};

    fn dir(path: &str) -> Msg {
        let mut d = conch_types::Dir::new();
        d.set("path", path);
        d.set("Upath", path.trim_start_matches('/'));
        d.set("type", "-");
        Msg::Dir(d)
    }

    #[tokio::test]
    async fn matching_lines_pass() {
        let (ctx, rx) = ctx_with_args(&["gr", "b"]);
        feed_in(&ctx, vec![Msg::bytes("abc\nxyz\nbbb\n")]).await;
        Gr.run(ctx).await.unwrap();
        assert_eq!(out_text(&rx), "abc\nbbb\n");
    }

    #[tokio::test]
    async fn invert_selects_the_rest() {
        let (ctx, rx) = ctx_with_args(&["gr", "-v", "b"]);
        feed_in(&ctx, vec![Msg::bytes("abc\nxyz\n")]).await;
        Gr.run(ctx).await.unwrap();
        assert_eq!(out_text(&rx), "xyz\n");
    }

    #[tokio::test]
    async fn no_match_is_the_status() {
        let (ctx, _rx) = ctx_with_args(&["gr", "zzz"]);
        feed_in(&ctx, vec![Msg::bytes("abc\n")]).await;
        assert!(Gr.run(ctx).await.is_err());
    }

    #[tokio::test]
    async fn names_only_with_l() {
        let (ctx, rx) = ctx_with_args(&["gr", "-l", "a"]);
        feed_in(
            &ctx,
            vec![
                dir("/one"),
                Msg::bytes("has a\n"),
                dir("/two"),
                Msg::bytes("nothing\n"),
            ],
        )
        .await;
        Gr.run(ctx).await.unwrap();
        assert_eq!(out_text(&rx), "one\n");
    }

    #[tokio::test]
    async fn whole_files_with_f() {
        let (ctx, rx) = ctx_with_args(&["gr", "-f", "a"]);
        feed_in(
            &ctx,
            vec![
                dir("/one"),
                Msg::bytes("has a\n"),
                Msg::bytes("no match here\n"),
                dir("/two"),
                Msg::bytes("nothing\n"),
            ],
        )
        .await;
        Gr.run(ctx).await.unwrap();
        let msgs = out_msgs(&rx);
        let kinds: Vec<&str> = msgs.iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, ["dir", "bytes", "bytes"], "every line of the matching file");
        assert_eq!(msgs[1].data(), Some(&b"has a\n"[..]));
        assert_eq!(msgs[2].data(), Some(&b"no match here\n"[..]));
    }

    #[tokio::test]
    async fn addresses_with_a() {
        let (ctx, rx) = ctx_with_args(&["gr", "-a", "hit"]);
        feed_in(&ctx, vec![dir("/f"), Msg::bytes("miss\nhit\nmiss\nhit\n")]).await;
        Gr.run(ctx).await.unwrap();
        let addrs: Vec<Addr> = out_msgs(&rx)
            .into_iter()
            .filter_map(|m| match m {
                Msg::Addr(a) => Some(a),
                _ => None,
            })
            .collect();
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].ln0, 2);
        assert_eq!(addrs[1].ln0, 4);
        assert_eq!(addrs[0].name, "f");
    }

    #[tokio::test]
    async fn dir_travels_only_for_matching_files() {
        let (ctx, rx) = ctx_with_args(&["gr", "a"]);
        feed_in(
            &ctx,
            vec![
                dir("/one"),
                Msg::bytes("has a\n"),
                dir("/two"),
                Msg::bytes("nope\n"),
            ],
        )
        .await;
        Gr.run(ctx).await.unwrap();
        let dirs: Vec<String> = out_msgs(&rx)
            .into_iter()
            .filter_map(|m| match m {
                Msg::Dir(d) => Some(d.path().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(dirs, ["/one"]);
    }

    #[tokio::test]
    async fn bad_regexp_is_usage() {
        let (ctx, _rx) = ctx_with_args(&["gr", "("]);
        feed_in(&ctx, vec![]).await;
        assert!(matches!(Gr.run(ctx).await, Err(CmdError::Usage(_))));
    }
}
