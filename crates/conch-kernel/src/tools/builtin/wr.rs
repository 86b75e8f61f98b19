//! wr — write the input stream's data into a file.

use async_trait::async_trait;
use conch_types::{CmdError, Msg};
use tokio::io::AsyncWriteExt;

use crate::context::Ctx;
use crate::opt::Opts;
use crate::tools::{input_stream, Tool};

pub struct Wr;

#[async_trait]
impl Tool for Wr {
    fn name(&self) -> &'static str {
        "wr"
    }

    fn usage(&self) -> &'static str {
        "file"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("wr", self.usage())
            .flag('D', "debug")
            .flag('a', "append");
        let parsed = opts.parse(&ctx.args[1..])?;
        let Some(name) = parsed.args.first() else {
            return Err(CmdError::Usage(opts.usage()));
        };
        let path = ctx.resolve(name);
        let f = if parsed.has('a') {
            tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .await
        } else {
            tokio::fs::File::create(&path).await
        }
        .map_err(|e| CmdError::from_io(name, &e))?;

        let input = input_stream(&ctx, &[]);
        let mut f = f;
        let mut sts = Ok(());
        while let Some(m) = input.recv().await {
            match m {
                Msg::Bytes(b) => {
                    if let Err(e) = f.write_all(&b).await {
                        let err = CmdError::from_io(name, &e);
                        input.close(Some(err.clone()));
                        return Err(err);
                    }
                }
                Msg::Err(e) => {
                    ctx.warn(e.to_string()).await;
                    if sts.is_ok() {
                        sts = Err(e);
                    }
                }
                _ => {}
            }
        }
        f.flush().await.map_err(|e| CmdError::from_io(name, &e))?;
        ctx.vwarn(format!("wrote {name}")).await;
        match input.cause() {
            Some(e) => Err(e),
            None => sts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testutil::{ctx_with_args, feed_in};

    #[tokio::test]
    async fn writes_data_payloads() {
        let tmp = tempfile::tempdir().unwrap();
        let (ctx, _rx) = ctx_with_args(&["wr", "out.txt"]);
        ctx.cd(tmp.path().to_path_buf());
        let mut d = conch_types::Dir::new();
        d.set("path", "/x");
        feed_in(&ctx, vec![Msg::Dir(d), Msg::bytes("ab"), Msg::bytes("cd")]).await;
        Wr.run(ctx).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("out.txt")).unwrap(),
            "abcd"
        );
    }

    #[tokio::test]
    async fn append_mode_extends() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("f"), b"one").unwrap();
        let (ctx, _rx) = ctx_with_args(&["wr", "-a", "f"]);
        ctx.cd(tmp.path().to_path_buf());
        feed_in(&ctx, vec![Msg::bytes("two")]).await;
        Wr.run(ctx).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("f")).unwrap(),
            "onetwo"
        );
    }

    #[tokio::test]
    async fn missing_operand_is_usage() {
        let (ctx, _rx) = ctx_with_args(&["wr"]);
        assert!(matches!(Wr.run(ctx).await, Err(CmdError::Usage(_))));
    }
}
