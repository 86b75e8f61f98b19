//! The shell evaluator: word expansion and control flow.
//!
//! A `Shell` owns the tool registry, the function table, and the job
//! table; everything per-command lives in the `Ctx` handed to each call.
//! The evaluator walks the AST and instructs the scheduler; expansion is
//! compositional over `Word` nodes, with `^` broadcasting and IO
//! substitutions that run side pipelines.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use conch_types::{CmdError, Msg};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::ast::{Block, Cmd, IoDir, Item, Program, Word};
use crate::chan::{chan, Receiver, CHAN_CAP};
use crate::context::{Ctx, ForkWhat};
use crate::parser::parse;
use crate::scheduler::{self, JobTable, StageOwned};
use crate::stream::collect_bytes;
use crate::tools::{self, ToolRegistry};
use crate::wire;

/// The shell: tool registry, defined functions, background jobs.
///
/// Cheap to clone; clones share all three tables.
#[derive(Clone)]
pub struct Shell {
    tools: Arc<ToolRegistry>,
    funcs: Arc<Mutex<HashMap<String, Block>>>,
    jobs: Arc<JobTable>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    /// A shell with the builtin tool set.
    pub fn new() -> Self {
        Shell::with_registry(Arc::new(tools::builtins()))
    }

    pub fn with_registry(tools: Arc<ToolRegistry>) -> Self {
        Shell {
            tools,
            funcs: Arc::new(Mutex::new(HashMap::new())),
            jobs: Arc::new(JobTable::new()),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn jobs(&self) -> &Arc<JobTable> {
        &self.jobs
    }

    /// Parse and run a source text against `ctx`. The result is the last
    /// item's status, which is also left in `env.status`.
    pub async fn run_src(&self, src: &str, ctx: &Ctx) -> Result<(), CmdError> {
        let prog = parse(src)?;
        self.run_program(&prog, ctx).await
    }

    /// Run a parsed program: items in order, `status` updated after each,
    /// errors reported but not fatal to the following items.
    pub fn run_program<'a>(
        &'a self,
        prog: &'a Program,
        ctx: &'a Ctx,
    ) -> BoxFuture<'a, Result<(), CmdError>> {
        async move {
            let mut last = Ok(());
            for item in &prog.items {
                last = self.run_item(item, ctx).await;
                set_status(ctx, &last);
            }
            last
        }
        .boxed()
    }

    pub fn run_item<'a>(
        &'a self,
        item: &'a Item,
        ctx: &'a Ctx,
    ) -> BoxFuture<'a, Result<(), CmdError>> {
        async move {
            match item {
                Item::Func(f) => {
                    debug!(name = %f.name, "defining function");
                    self.funcs
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(f.name.clone(), f.body.clone());
                    Ok(())
                }
                Item::Src(w) => {
                    let name = self.expand_simple(w, ctx).await?;
                    let path = ctx.resolve(&name);
                    let src = tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|e| CmdError::from_io(&name, &e))?;
                    let prog = parse(&src)?;
                    self.run_program(&prog, ctx).await
                }
                Item::Pipe(p) => scheduler::run_pipe(self, p, ctx).await,
            }
        }
        .boxed()
    }

    /// Run block items in order, stopping at the first error.
    pub fn run_items_seq<'a>(
        &'a self,
        items: &'a [Item],
        ctx: &'a Ctx,
    ) -> BoxFuture<'a, Result<(), CmdError>> {
        async move {
            for item in items {
                let res = self.run_item(item, ctx).await;
                set_status(ctx, &res);
                res?;
            }
            Ok(())
        }
        .boxed()
    }

    /// Run one command body. Redirections were already applied by the
    /// scheduler; this dispatches on the command kind only.
    pub fn run_cmd_body<'a>(
        &'a self,
        cmd: &'a Cmd,
        ctx: &'a Ctx,
    ) -> BoxFuture<'a, Result<(), CmdError>> {
        async move {
            match cmd {
                Cmd::Exec { words, .. } => self.run_exec(words, ctx).await,
                Cmd::Block(b) => self.run_items_seq(&b.items, ctx).await,
                Cmd::For { words, body, .. } => self.run_for(words, body, ctx).await,
                Cmd::While { cond, body, .. } => self.run_while(cond, body, ctx).await,
                Cmd::Cond { arms, .. } => self.run_cond(arms, ctx).await,
                Cmd::Set { name, idx, words } => self.run_set(name, idx.as_deref(), words, ctx).await,
                Cmd::SetMap { name, entries } => self.run_setmap(name, entries, ctx).await,
            }
        }
        .boxed()
    }

    async fn run_exec(&self, words: &[Word], ctx: &Ctx) -> Result<(), CmdError> {
        let mut exp = Expansion::default();
        let mut argv = Vec::new();
        for w in words {
            argv.extend(self.expand_word(w, ctx, &mut exp).await?);
        }
        if argv.is_empty() {
            return Err(CmdError::other("missing command name"));
        }
        let name = argv[0].clone();
        debug!(cmd = %name, args = argv.len(), "exec");

        let func = self
            .funcs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&name)
            .cloned();
        let mut res = if let Some(body) = func {
            let mut child = ctx.fork(&[ForkWhat::Env]);
            child.args = argv.clone();
            self.run_items_seq(&body.items, &child).await
        } else {
            match name.as_str() {
                "cd" => self.run_cd(&argv, ctx).await,
                "wait" => self.jobs.wait(argv.get(1).map(String::as_str)).await,
                "jobs" => {
                    for j in self.jobs.list() {
                        let state = if j.done { " (done)" } else { "" };
                        ctx.printf(format!("{}\t{}{}\n", j.tag, j.cmd, state)).await;
                    }
                    Ok(())
                }
                _ => match self.tools.get(&name) {
                    Some(tool) => {
                        let mut tctx = ctx.clone();
                        tctx.args = argv.clone();
                        tool.run(tctx).await
                    }
                    None => Err(CmdError::NotExist(name.clone())),
                },
            }
        };

        // `>{block}` consumers run once the producer has finished writing
        for (blk, path) in std::mem::take(&mut exp.posts) {
            let r = self.run_post_block(blk, &path, ctx).await;
            if res.is_ok() {
                res = r;
            }
        }
        res
    }

    async fn run_cd(&self, argv: &[String], ctx: &Ctx) -> Result<(), CmdError> {
        let to = match argv.get(1) {
            Some(a) => a.clone(),
            None => {
                let home = ctx.get_env("home");
                if home.is_empty() {
                    "/".to_string()
                } else {
                    home
                }
            }
        };
        let path = ctx.resolve(&to);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_dir() => {
                ctx.cd(path);
                Ok(())
            }
            Ok(_) => Err(CmdError::NotDir(to)),
            Err(e) => Err(CmdError::from_io(&to, &e)),
        }
    }

    async fn run_for(&self, words: &[Word], body: &Block, ctx: &Ctx) -> Result<(), CmdError> {
        let mut exp = Expansion::default();
        let mut vals = Vec::new();
        for w in words {
            vals.extend(self.expand_word(w, ctx, &mut exp).await?);
        }
        if vals.is_empty() {
            return Err(CmdError::Usage("for: missing variable name".into()));
        }
        let name = vals.remove(0);
        let mut sts = Ok(());
        if vals.is_empty() {
            // no word list: one word per iteration from `in`
            let Some(input) = ctx.io_in("in") else {
                return Ok(());
            };
            let mut words = WordStream::new(input);
            while let Some(v) = words.next_word().await {
                if ctx.interrupted() {
                    return Err(CmdError::Intr);
                }
                let r = self.run_for_body(&name, v, body, ctx).await;
                if r.is_err() {
                    sts = r;
                }
            }
            return sts;
        }
        for v in vals {
            if ctx.interrupted() {
                return Err(CmdError::Intr);
            }
            let r = self.run_for_body(&name, v, body, ctx).await;
            if r.is_err() {
                sts = r;
            }
        }
        sts
    }

    async fn run_for_body(
        &self,
        name: &str,
        val: String,
        body: &Block,
        ctx: &Ctx,
    ) -> Result<(), CmdError> {
        let child = ctx.fork(&[ForkWhat::Env]);
        child.set_env_list(name, vec![val]);
        self.run_items_seq(&body.items, &child).await
    }

    async fn run_while(
        &self,
        cond: &crate::ast::Pipe,
        body: &Block,
        ctx: &Ctx,
    ) -> Result<(), CmdError> {
        loop {
            if ctx.interrupted() {
                return Err(CmdError::Intr);
            }
            if scheduler::run_pipe(self, cond, ctx).await.is_err() {
                return Ok(());
            }
            let res = self.run_items_seq(&body.items, ctx).await;
            if matches!(res, Err(CmdError::Intr)) {
                return res;
            }
        }
    }

    async fn run_cond(&self, arms: &[crate::ast::OrArm], ctx: &Ctx) -> Result<(), CmdError> {
        let mut last = Ok(());
        for arm in arms {
            let mut arm_res = Ok(());
            for p in &arm.pipes {
                arm_res = scheduler::run_pipe(self, p, ctx).await;
                set_status(ctx, &arm_res);
                if arm_res.is_err() {
                    break;
                }
            }
            if arm_res.is_ok() {
                // first successful arm wins; later arms are not evaluated
                return Ok(());
            }
            last = arm_res;
        }
        last
    }

    async fn run_set(
        &self,
        name: &str,
        idx: Option<&Word>,
        words: &[Word],
        ctx: &Ctx,
    ) -> Result<(), CmdError> {
        let mut exp = Expansion::default();
        let mut vals = Vec::new();
        for w in words {
            vals.extend(self.expand_word(w, ctx, &mut exp).await?);
        }
        match idx {
            Some(iw) => {
                let i = self.expand_simple(iw, ctx).await?;
                ctx.set_env_index(name, &i, vals.join(" "))
            }
            None => {
                ctx.set_env_list(name, vals);
                Ok(())
            }
        }
    }

    async fn run_setmap(
        &self,
        name: &str,
        entries: &[Vec<Word>],
        ctx: &Ctx,
    ) -> Result<(), CmdError> {
        let mut m = HashMap::new();
        for entry in entries {
            let mut exp = Expansion::default();
            let mut vals = Vec::new();
            for w in entry {
                vals.extend(self.expand_word(w, ctx, &mut exp).await?);
            }
            if vals.is_empty() {
                return Err(CmdError::Usage("map entry: missing key".into()));
            }
            let key = vals.remove(0);
            m.insert(key, vals);
        }
        ctx.set_env_map(name, m);
        Ok(())
    }

    /// Run a `>{block}` consumer over the spooled file.
    async fn run_post_block(
        &self,
        blk: Block,
        path: &PathBuf,
        ctx: &Ctx,
    ) -> Result<(), CmdError> {
        let f = tokio::fs::File::open(path)
            .await
            .map_err(|e| CmdError::from_io(&path.to_string_lossy(), &e))?;
        let (tx, rx) = chan(CHAN_CAP);
        let reader = tokio::spawn(async move {
            let mut f = f;
            let res = wire::read_bytes(&mut f, &tx).await;
            tx.close(res.as_ref().err().cloned());
            res
        });
        let bctx = ctx.fork(&[ForkWhat::Io]);
        bctx.set_in("in", rx.clone());
        let mut owned = StageOwned::default();
        owned.ins.push(rx);
        let res = scheduler::run_stage(self.clone(), Cmd::Block(blk), bctx, owned).await;
        let _ = reader.await;
        res
    }

    // ── expansion ──────────────────────────────────────────────────────

    /// Expand one word node into its word list.
    pub(crate) fn expand_word<'a>(
        &'a self,
        w: &'a Word,
        ctx: &'a Ctx,
        exp: &'a mut Expansion,
    ) -> BoxFuture<'a, Result<Vec<String>, CmdError>> {
        async move {
            match w {
                Word::Name(s) => Ok(vec![s.clone()]),
                Word::Group(ws) => {
                    let mut out = Vec::new();
                    for w in ws {
                        out.extend(self.expand_word(w, ctx, exp).await?);
                    }
                    Ok(out)
                }
                Word::Val { name, idx } => self.expand_val(name, idx.as_deref(), ctx, exp).await,
                Word::Single { name, idx } => {
                    let vals = self.expand_val(name, idx.as_deref(), ctx, exp).await?;
                    Ok(vec![vals.join(" ")])
                }
                Word::Len(name) => {
                    let n = if name == "argv" {
                        ctx.args.len().saturating_sub(1)
                    } else {
                        ctx.env_len(name)
                    };
                    Ok(vec![n.to_string()])
                }
                Word::App(l, r) => {
                    let left = self.expand_word(l, ctx, exp).await?;
                    let right = self.expand_word(r, ctx, exp).await?;
                    app_words(left, right)
                }
                Word::IoBlk { dir, block, .. } => self.expand_ioblk(*dir, block, ctx, exp).await,
            }
        }
        .boxed()
    }

    async fn expand_val(
        &self,
        name: &str,
        idx: Option<&Word>,
        ctx: &Ctx,
        exp: &mut Expansion,
    ) -> Result<Vec<String>, CmdError> {
        let list = if name == "argv" {
            ctx.args.iter().skip(1).cloned().collect()
        } else {
            ctx.env_list(name)
        };
        match idx {
            None => Ok(list),
            Some(iw) => {
                let i = {
                    let vals = self.expand_word(iw, ctx, exp).await?;
                    if vals.len() != 1 {
                        return Err(CmdError::other(format!(
                            "${name}[...]: not a single index"
                        )));
                    }
                    vals.into_iter().next().expect("one index")
                };
                if name == "argv" {
                    let n: usize = i
                        .parse()
                        .map_err(|_| CmdError::other(format!("$argv[{i}]: bad index")))?;
                    Ok(list.get(n).cloned().into_iter().collect())
                } else {
                    Ok(ctx.env_index(name, &i))
                }
            }
        }
    }

    async fn expand_ioblk(
        &self,
        dir: IoDir,
        block: &Block,
        ctx: &Ctx,
        exp: &mut Expansion,
    ) -> Result<Vec<String>, CmdError> {
        match dir {
            IoDir::In => {
                // run the block now, spool its output, hand over a path
                let (tx, rx) = chan(CHAN_CAP);
                let bctx = ctx.fork(&[ForkWhat::Io]);
                bctx.set_out("out", tx.clone());
                let mut owned = StageOwned::default();
                owned.outs.push(tx);
                let h = tokio::spawn(scheduler::run_stage(
                    self.clone(),
                    Cmd::Block(block.clone()),
                    bctx,
                    owned,
                ));
                let (data, cause) = collect_bytes(&rx).await;
                let _ = h.await;
                if let Some(e) = cause {
                    return Err(e);
                }
                let tmp = tempfile::NamedTempFile::new()?;
                std::fs::write(tmp.path(), &data)?;
                let path = tmp.path().to_string_lossy().to_string();
                exp.tmps.push(tmp.into_temp_path());
                Ok(vec![path])
            }
            IoDir::Out => {
                // hand over a path; the block consumes it after the command
                let tmp = tempfile::NamedTempFile::new()?;
                let path = tmp.path().to_path_buf();
                exp.tmps.push(tmp.into_temp_path());
                exp.posts.push((block.clone(), path.clone()));
                Ok(vec![path.to_string_lossy().to_string()])
            }
            IoDir::InPipe => {
                // in-process: the block's output becomes an inN endpoint
                let (tx, rx) = chan(CHAN_CAP);
                let bctx = ctx.fork(&[ForkWhat::Io]);
                bctx.set_out("out", tx.clone());
                let mut owned = StageOwned::default();
                owned.outs.push(tx);
                tokio::spawn(scheduler::run_stage(
                    self.clone(),
                    Cmd::Block(block.clone()),
                    bctx,
                    owned,
                ));
                let mut n = 3;
                let mut name = format!("in{n}");
                while ctx.io_in(&name).is_some() {
                    n += 1;
                    name = format!("in{n}");
                }
                ctx.set_in(&name, rx);
                Ok(vec![name])
            }
        }
    }

    /// Expand a word that must yield exactly one plain word (redirection
    /// targets, indices, source names).
    pub(crate) async fn expand_simple(&self, w: &Word, ctx: &Ctx) -> Result<String, CmdError> {
        let mut exp = Expansion::default();
        let vals = self.expand_word(w, ctx, &mut exp).await?;
        if vals.len() != 1 {
            return Err(CmdError::other(format!(
                "{w}: expected a single word, got {}",
                vals.len()
            )));
        }
        Ok(vals.into_iter().next().expect("one word"))
    }
}

/// Side state produced by expansion: spooled temp files kept alive for
/// the command, and `>{block}` consumers to run afterwards.
#[derive(Default)]
pub(crate) struct Expansion {
    pub tmps: Vec<tempfile::TempPath>,
    pub posts: Vec<(Block, PathBuf)>,
}

/// Pairwise concatenation with broadcasting: a length-1 side distributes
/// over the other; equal lengths zip; anything else is an error.
fn app_words(left: Vec<String>, right: Vec<String>) -> Result<Vec<String>, CmdError> {
    if left.is_empty() {
        return Ok(right);
    }
    if right.is_empty() {
        return Ok(left);
    }
    if left.len() == 1 {
        let l = &left[0];
        return Ok(right.into_iter().map(|r| format!("{l}{r}")).collect());
    }
    if right.len() == 1 {
        let r = &right[0];
        return Ok(left.into_iter().map(|l| format!("{l}{r}")).collect());
    }
    if left.len() != right.len() {
        return Err(CmdError::other("expand: different list lengths"));
    }
    Ok(left
        .into_iter()
        .zip(right)
        .map(|(l, r)| format!("{l}{r}"))
        .collect())
}

/// Record a result in `env.status`: empty for success, the message
/// otherwise.
pub fn set_status(ctx: &Ctx, res: &Result<(), CmdError>) {
    match res {
        Ok(()) => ctx.set_env("status", ""),
        Err(e) => ctx.set_env("status", &e.to_string()),
    }
}

/// Whitespace-separated words pulled lazily from a typed stream; only
/// data payloads contribute.
struct WordStream {
    rx: Receiver<Msg>,
    buf: Vec<u8>,
    done: bool,
}

impl WordStream {
    fn new(rx: Receiver<Msg>) -> Self {
        WordStream { rx, buf: Vec::new(), done: false }
    }

    async fn next_word(&mut self) -> Option<String> {
        loop {
            let start = self.buf.iter().position(|c| !c.is_ascii_whitespace());
            if let Some(start) = start {
                if start > 0 {
                    self.buf.drain(..start);
                }
                if let Some(end) = self.buf.iter().position(|c| c.is_ascii_whitespace()) {
                    let w: Vec<u8> = self.buf.drain(..end).collect();
                    return Some(String::from_utf8_lossy(&w).to_string());
                }
            } else {
                self.buf.clear();
            }
            if self.done {
                if self.buf.is_empty() {
                    return None;
                }
                let w = std::mem::take(&mut self.buf);
                return Some(String::from_utf8_lossy(&w).to_string());
            }
            match self.rx.recv().await {
                Some(Msg::Bytes(b)) => self.buf.extend_from_slice(&b),
                Some(_) => {}
                None => self.done = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chan::chan;

    fn sh_ctx() -> (Shell, Ctx, Receiver<Msg>) {
        let sh = Shell::new();
        let ctx = Ctx::new();
        let (tx, rx) = chan(1024);
        ctx.set_out("out", tx.clone());
        ctx.set_out("err", tx);
        (sh, ctx, rx)
    }

    async fn out_text(rx: &Receiver<Msg>) -> String {
        let mut s = String::new();
        loop {
            match rx.try_recv() {
                crate::chan::TryRecv::Msg(Msg::Bytes(b)) => {
                    s.push_str(&String::from_utf8_lossy(&b))
                }
                crate::chan::TryRecv::Msg(_) => {}
                _ => break,
            }
        }
        s
    }

    #[tokio::test]
    async fn list_assignment_and_expansion() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("x = a b c\necho $x", &ctx).await.unwrap();
        assert_eq!(out_text(&rx).await, "a b c\n");
        assert_eq!(ctx.env_list("x"), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn broadcasting_laws() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("x=(a b c)\necho (z)^$x", &ctx).await.unwrap();
        assert_eq!(out_text(&rx).await, "za zb zc\n");

        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("x=(a b c)\necho (z)^$^x", &ctx).await.unwrap();
        assert_eq!(out_text(&rx).await, "za b c\n");
    }

    #[tokio::test]
    async fn app_length_mismatch_is_an_error() {
        assert!(app_words(
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into(), "z".into()]
        )
        .is_err());
        // and the zip case
        assert_eq!(
            app_words(vec!["a".into(), "b".into()], vec!["1".into(), "2".into()]).unwrap(),
            ["a1", "b2"]
        );
    }

    #[tokio::test]
    async fn indexed_assignment_appends_at_len() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("x = a b\nx[2]=z\nx[3]=z\necho $x", &ctx).await.unwrap();
        assert_eq!(out_text(&rx).await, "a b z z\n");
        let res = sh.run_src("x[9]=w", &ctx).await;
        assert!(res.is_err());
        assert!(!ctx.get_env("status").is_empty());
    }

    #[tokio::test]
    async fn len_and_index_expansion() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("x=(a b c)\necho $#x $x[1]", &ctx).await.unwrap();
        assert_eq!(out_text(&rx).await, "3 b\n");
    }

    #[tokio::test]
    async fn map_assignment_and_lookup() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("m = ([a one] [b two])\necho $m[b] ; echo $m", &ctx)
            .await
            .unwrap();
        assert_eq!(out_text(&rx).await, "two\na b\n");
    }

    #[tokio::test]
    async fn nested_for_runs_in_lexical_order() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("for x in a b { for y in c d { echo $x $y } }", &ctx)
            .await
            .unwrap();
        assert_eq!(out_text(&rx).await, "a c\na d\nb c\nb d\n");
    }

    #[tokio::test]
    async fn for_scope_is_local() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("x = outer\nfor x in a b { echo $x }\necho $x", &ctx)
            .await
            .unwrap();
        assert_eq!(out_text(&rx).await, "a\nb\nouter\n");
    }

    #[tokio::test]
    async fn cond_first_success_wins() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("cond { echo one } or { echo two }", &ctx).await.unwrap();
        assert_eq!(out_text(&rx).await, "one\n", "later arms are not evaluated");
    }

    #[tokio::test]
    async fn oror_falls_through_failures() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("nosuchcmd || echo rescued", &ctx).await.unwrap();
        let out = out_text(&rx).await;
        assert_eq!(out, "rescued\n");
    }

    #[tokio::test]
    async fn andand_stops_on_failure() {
        let (sh, ctx, rx) = sh_ctx();
        let res = sh.run_src("nosuchcmd && echo not-reached", &ctx).await;
        assert!(res.is_err());
        assert_eq!(out_text(&rx).await, "");
    }

    #[tokio::test]
    async fn functions_get_argv() {
        let (sh, ctx, rx) = sh_ctx();
        sh.run_src("func greet { echo hi $argv[1] ($#argv) }\ngreet you extra", &ctx)
            .await
            .unwrap();
        assert_eq!(out_text(&rx).await, "hi you 2\n");
    }

    #[tokio::test]
    async fn status_env_tracks_results() {
        let (sh, ctx, _rx) = sh_ctx();
        sh.run_src("echo ok", &ctx).await.unwrap();
        assert_eq!(ctx.get_env("status"), "");
        let _ = sh.run_src("nosuchcmd", &ctx).await;
        assert!(ctx.get_env("status").contains("nosuchcmd"));
    }

    #[tokio::test]
    async fn unknown_command_is_not_exist() {
        let (sh, ctx, _rx) = sh_ctx();
        let res = sh.run_src("definitely-not-a-command", &ctx).await;
        assert!(matches!(res, Err(CmdError::NotExist(_))));
    }

    #[tokio::test]
    async fn for_consumes_words_from_input() {
        let (sh, ctx, rx) = sh_ctx();
        let (itx, irx) = chan(16);
        ctx.set_in("in", irx);
        itx.send(Msg::bytes("one two ")).await;
        itx.send(Msg::bytes("three")).await;
        itx.close(None);
        sh.run_src("for w { echo got $w }", &ctx).await.unwrap();
        assert_eq!(out_text(&rx).await, "got one\ngot two\ngot three\n");
    }

    #[tokio::test]
    async fn while_ends_cleanly_when_cond_fails() {
        let (sh, ctx, rx) = sh_ctx();
        let res = sh.run_src("while nosuchcmd { echo never }", &ctx).await;
        assert!(res.is_ok(), "a failing cond ends the loop, not the shell");
        assert_eq!(out_text(&rx).await, "");
    }

    #[tokio::test]
    async fn while_runs_body_until_cond_fails() {
        let (sh, ctx, rx) = sh_ctx();
        // `wait j1` succeeds exactly once: the second wait finds no job
        sh.run_src("echo bg > /dev/null &j1\nwhile wait j1 { echo body }", &ctx)
            .await
            .unwrap();
        assert_eq!(out_text(&rx).await, "body\n");
    }

    #[tokio::test]
    async fn source_runs_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let f = tmp.path().join("lib.cn");
        std::fs::write(&f, "y = sourced\n").unwrap();
        let (sh, ctx, _rx) = sh_ctx();
        ctx.cd(tmp.path().to_path_buf());
        sh.run_src("< lib.cn\n", &ctx).await.unwrap();
        assert_eq!(ctx.get_env("y"), "sourced");
    }
}
