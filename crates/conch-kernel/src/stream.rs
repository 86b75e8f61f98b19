//! Stream adapters: structure raw streams at message boundaries.
//!
//! Producers here emit the conventional stream shape (a `Dir` per file,
//! then its `Bytes`), and the re-shapers (`lines`, `full_files`) convert
//! between chunkings without disturbing non-data messages. Every adapter
//! is a task bridging two channels, so back-pressure and close causes
//! propagate exactly as they do across a pipe.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use conch_types::{CmdError, Dir, Msg};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::AsyncReadExt;

use crate::chan::{chan, Receiver, Sender, CHAN_CAP};
use crate::context::Ctx;
use crate::pred::Pred;
use crate::wire::MSG_SZ;

/// Re-emit the stream with one `Bytes` message per line. Contiguous data
/// is coalesced until a newline; a partial line is flushed at any message
/// boundary and at close.
pub fn lines(rx: Receiver<Msg>) -> Receiver<Msg> {
    let (tx, out) = chan(CHAN_CAP);
    tokio::spawn(async move {
        let mut buf: Vec<u8> = Vec::new();
        while let Some(m) = rx.recv().await {
            match m {
                Msg::Bytes(b) => {
                    buf.extend_from_slice(&b);
                    while let Some(pos) = buf.iter().position(|&c| c == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        if !tx.send(Msg::Bytes(line)).await {
                            rx.close(tx.cause());
                            return;
                        }
                    }
                }
                other => {
                    if !buf.is_empty() {
                        let part = std::mem::take(&mut buf);
                        if !tx.send(Msg::Bytes(part)).await {
                            rx.close(tx.cause());
                            return;
                        }
                    }
                    if !tx.send(other).await {
                        rx.close(tx.cause());
                        return;
                    }
                }
            }
        }
        if !buf.is_empty() {
            tx.send(Msg::Bytes(buf)).await;
        }
        tx.close(rx.cause());
    });
    out
}

/// Collect the `Bytes` between successive `Dir`s into a single message
/// per file.
pub fn full_files(rx: Receiver<Msg>) -> Receiver<Msg> {
    let (tx, out) = chan(CHAN_CAP);
    tokio::spawn(async move {
        let mut buf: Vec<u8> = Vec::new();
        let mut had_data = false;
        while let Some(m) = rx.recv().await {
            match m {
                Msg::Bytes(b) => {
                    had_data = true;
                    buf.extend_from_slice(&b);
                }
                Msg::Dir(d) => {
                    if had_data {
                        let whole = std::mem::take(&mut buf);
                        had_data = false;
                        if !tx.send(Msg::Bytes(whole)).await {
                            rx.close(tx.cause());
                            return;
                        }
                    }
                    if !tx.send(Msg::Dir(d)).await {
                        rx.close(tx.cause());
                        return;
                    }
                }
                other => {
                    if !tx.send(other).await {
                        rx.close(tx.cause());
                        return;
                    }
                }
            }
        }
        if had_data {
            tx.send(Msg::Bytes(buf)).await;
        }
        tx.close(rx.cause());
    });
    out
}

/// Traversal producer: a `Dir` then `Bytes` blocks per file, depth first,
/// lexicographic by name. Each argument is `path` or `path,pred`; the
/// predicate's prune flag bounds the walk.
pub fn files(ctx: &Ctx, args: &[String]) -> Receiver<Msg> {
    walk_args(ctx, args, true)
}

/// Like `files` but emits only the `Dir` records.
pub fn dirs(ctx: &Ctx, args: &[String]) -> Receiver<Msg> {
    walk_args(ctx, args, false)
}

fn walk_args(ctx: &Ctx, args: &[String], with_data: bool) -> Receiver<Msg> {
    let (tx, out) = chan(CHAN_CAP);
    let dot = ctx.dot();
    let mut roots = Vec::new();
    for arg in args {
        let (name, pred) = match arg.split_once(',') {
            Some((n, p)) => (n, Pred::new(p)),
            None => (arg.as_str(), Pred::new("")),
        };
        let name = if name.is_empty() { "." } else { name };
        roots.push((ctx.resolve(name), pred));
    }
    tokio::spawn(async move {
        for (root, pred) in roots {
            let pred = match pred {
                Ok(p) => p,
                Err(e) => {
                    tx.send(Msg::Err(e)).await;
                    continue;
                }
            };
            match walk_one(&tx, &dot, &root, root.clone(), 0, &pred, with_data).await {
                Ok(true) => {}
                Ok(false) => return, // downstream closed
                Err(e) => {
                    tx.send(Msg::Err(e)).await;
                }
            }
        }
        tx.close(None);
    });
    out
}

fn walk_one<'a>(
    tx: &'a Sender<Msg>,
    dot: &'a Path,
    root: &'a Path,
    path: PathBuf,
    depth: usize,
    pred: &'a Pred,
    with_data: bool,
) -> BoxFuture<'a, Result<bool, CmdError>> {
    async move {
        let meta = match tokio::fs::symlink_metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                let name = path.to_string_lossy().to_string();
                if !tx.send(Msg::Err(CmdError::from_io(&name, &e))).await {
                    return Ok(false);
                }
                return Ok(true);
            }
        };
        let d = dir_from_meta(&path, &meta, dot, root);
        let (matched, prune) = pred.eval_at(&d, depth);
        if matched {
            if !tx.send(Msg::Dir(d)).await {
                return Ok(false);
            }
        }
        if meta.is_dir() {
            if prune {
                return Ok(true);
            }
            let mut names = Vec::new();
            let mut rd = match tokio::fs::read_dir(&path).await {
                Ok(rd) => rd,
                Err(e) => {
                    let name = path.to_string_lossy().to_string();
                    if !tx.send(Msg::Err(CmdError::from_io(&name, &e))).await {
                        return Ok(false);
                    }
                    return Ok(true);
                }
            };
            while let Ok(Some(ent)) = rd.next_entry().await {
                names.push(ent.file_name());
            }
            names.sort();
            for n in names {
                if !walk_one(tx, dot, root, path.join(&n), depth + 1, pred, with_data).await? {
                    return Ok(false);
                }
            }
        } else if matched && with_data && meta.is_file() {
            let mut f = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    let name = path.to_string_lossy().to_string();
                    if !tx.send(Msg::Err(CmdError::from_io(&name, &e))).await {
                        return Ok(false);
                    }
                    return Ok(true);
                }
            };
            let mut buf = vec![0u8; MSG_SZ];
            loop {
                match f.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if !tx.send(Msg::Bytes(buf[..n].to_vec())).await {
                            return Ok(false);
                        }
                    }
                    Err(e) => {
                        let name = path.to_string_lossy().to_string();
                        if !tx.send(Msg::Err(CmdError::from_io(&name, &e))).await {
                            return Ok(false);
                        }
                        break;
                    }
                }
            }
        }
        Ok(true)
    }
    .boxed()
}

/// Build the directory record for a file at `path`, with `Upath` relative
/// to the working directory and `Rpath` relative to the traversal root.
pub fn dir_from_meta(path: &Path, meta: &std::fs::Metadata, dot: &Path, root: &Path) -> Dir {
    let mut d = Dir::new();
    let ps = path.to_string_lossy();
    d.set("path", ps.as_ref());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "/".to_string());
    d.set("name", name);
    d.set("type", if meta.is_dir() { "d" } else { "-" });
    d.set("mode", format!("{:o}", meta.permissions().mode() & 0o7777));
    d.set("size", meta.len().to_string());
    d.set("mtime", meta.mtime().to_string());
    d.set("uid", meta.uid().to_string());
    d.set("gid", meta.gid().to_string());
    if let Ok(rel) = path.strip_prefix(dot) {
        let rel = rel.to_string_lossy();
        if !rel.is_empty() {
            d.set("Upath", rel.as_ref());
        }
    }
    if let Ok(rel) = path.strip_prefix(root) {
        let rel = rel.to_string_lossy();
        d.set("Rpath", if rel.is_empty() { "/" } else { rel.as_ref() });
    }
    d
}

/// Drain a stream, concatenating its data payloads. Returns the bytes and
/// the close cause, if any. The first in-band error becomes the cause when
/// the close itself was clean.
pub async fn collect_bytes(rx: &Receiver<Msg>) -> (Vec<u8>, Option<CmdError>) {
    let mut out = Vec::new();
    let mut first_err = None;
    while let Some(m) = rx.recv().await {
        match m {
            Msg::Bytes(b) => out.extend_from_slice(&b),
            Msg::Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            _ => {}
        }
    }
    (out, rx.cause().or(first_err))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn feed(msgs: Vec<Msg>) -> Receiver<Msg> {
        let (tx, rx) = chan(CHAN_CAP);
        for m in msgs {
            tx.send(m).await;
        }
        tx.close(None);
        rx
    }

    async fn drain(rx: Receiver<Msg>) -> Vec<Msg> {
        let mut v = Vec::new();
        while let Some(m) = rx.recv().await {
            v.push(m);
        }
        v
    }

    #[tokio::test]
    async fn lines_splits_and_coalesces() {
        let rx = feed(vec![
            Msg::bytes("one\ntw"),
            Msg::bytes("o\nthr"),
            Msg::bytes("ee"),
        ])
        .await;
        let got = drain(lines(rx)).await;
        let texts: Vec<String> = got
            .iter()
            .map(|m| String::from_utf8(m.data().unwrap().to_vec()).unwrap())
            .collect();
        assert_eq!(texts, ["one\n", "two\n", "three"]);
    }

    #[tokio::test]
    async fn lines_flushes_partial_at_dir_boundary() {
        let mut d = Dir::new();
        d.set("path", "/f2");
        let rx = feed(vec![Msg::bytes("partial"), Msg::Dir(d)]).await;
        let got = drain(lines(rx)).await;
        assert_eq!(got[0].data(), Some(&b"partial"[..]));
        assert!(matches!(got[1], Msg::Dir(_)));
    }

    #[tokio::test]
    async fn full_files_one_msg_per_file() {
        let mut d1 = Dir::new();
        d1.set("path", "/a");
        let mut d2 = Dir::new();
        d2.set("path", "/b");
        let rx = feed(vec![
            Msg::Dir(d1),
            Msg::bytes("aa"),
            Msg::bytes("AA"),
            Msg::Dir(d2),
            Msg::bytes("bb"),
        ])
        .await;
        let got = drain(full_files(rx)).await;
        let kinds: Vec<&str> = got.iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, ["dir", "bytes", "dir", "bytes"]);
        assert_eq!(got[1].data(), Some(&b"aaAA"[..]));
        assert_eq!(got[3].data(), Some(&b"bb"[..]));
    }

    #[tokio::test]
    async fn walk_emits_sorted_dirs_then_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.txt"), b"bee").unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"ay").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/c.txt"), b"sea").unwrap();

        let ctx = Ctx::new();
        ctx.cd(tmp.path().to_path_buf());
        let got = drain(files(&ctx, &[".".to_string()])).await;
        let names: Vec<String> = got
            .iter()
            .filter_map(|m| match m {
                Msg::Dir(d) => Some(d.name().to_string()),
                _ => None,
            })
            .collect();
        let base = tmp.path().file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(names, [base, "a.txt".into(), "b.txt".into(), "sub".into(), "c.txt".into()]);
        let data: Vec<&[u8]> = got.iter().filter_map(|m| m.data()).collect();
        assert_eq!(data, [&b"ay"[..], &b"bee"[..], &b"sea"[..]]);
    }

    #[tokio::test]
    async fn walk_honors_depth_pred() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("top.txt"), b"t").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/deep.txt"), b"d").unwrap();

        let ctx = Ctx::new();
        ctx.cd(tmp.path().to_path_buf());
        let got = drain(dirs(&ctx, &[".,1".to_string()])).await;
        let names: Vec<&str> = got
            .iter()
            .filter_map(|m| match m {
                Msg::Dir(d) => Some(d.name()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"sub"));
        assert!(names.contains(&"top.txt"));
        assert!(!names.contains(&"deep.txt"));
    }

    #[tokio::test]
    async fn missing_file_is_an_in_band_error() {
        let ctx = Ctx::new();
        let got = drain(files(&ctx, &["/no/such/file/anywhere".to_string()])).await;
        assert!(matches!(got[0], Msg::Err(CmdError::NotExist(_))));
    }

    #[tokio::test]
    async fn dir_records_carry_rpath_and_upath() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("r")).unwrap();
        std::fs::write(tmp.path().join("r/f"), b"x").unwrap();
        let ctx = Ctx::new();
        ctx.cd(tmp.path().to_path_buf());
        let got = drain(files(&ctx, &["r".to_string()])).await;
        let d = got
            .iter()
            .find_map(|m| match m {
                Msg::Dir(d) if d.name() == "f" => Some(d),
                _ => None,
            })
            .unwrap();
        assert_eq!(d.get("Rpath"), Some("f"));
        assert_eq!(d.get("Upath"), Some("r/f"));
        assert_eq!(d.num("size"), 1);
    }

    #[tokio::test]
    async fn collect_bytes_reports_in_band_error() {
        let (tx, rx) = chan(8);
        tx.send(Msg::bytes("a")).await;
        tx.send(Msg::Err(CmdError::other("bad"))).await;
        tx.close(None);
        let (data, cause) = collect_bytes(&rx).await;
        assert_eq!(data, b"a");
        assert_eq!(cause, Some(CmdError::other("bad")));
    }
}
