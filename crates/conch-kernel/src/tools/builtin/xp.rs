//! xp — evaluate an expression and print the result.
//!
//! A boolean `false` result also fails the command, so `xp` composes
//! with `cond` and `while`.

use async_trait::async_trait;
use conch_types::CmdError;

use crate::context::Ctx;
use crate::expr;
use crate::opt::Opts;
use crate::tools::{out_chan, Tool};

pub struct Xp;

#[async_trait]
impl Tool for Xp {
    fn name(&self) -> &'static str {
        "xp"
    }

    fn usage(&self) -> &'static str {
        "{expr}"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("xp", self.usage())
            .flag('D', "debug")
            .flag('q', "don't print the result")
            .flag('u', "use unix out");
        let parsed = opts.parse(&ctx.args[1..])?;
        if parsed.args.is_empty() {
            return Err(CmdError::Usage(opts.usage()));
        }
        let src = parsed.args.join(" ");
        let v = expr::eval_str(&src)?;
        if !parsed.has('q') {
            let out = out_chan(&ctx)?;
            if !out.send(conch_types::Msg::bytes(format!("{v}\n"))).await {
                return Err(out.cause().unwrap_or(CmdError::Intr));
            }
        }
        if v.is_false() {
            return Err(CmdError::other("false"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testutil::{ctx_with_args, out_text};

    #[tokio::test]
    async fn prints_the_value() {
        let (ctx, rx) = ctx_with_args(&["xp", "1", "+", "2"]);
        Xp.run(ctx).await.unwrap();
        assert_eq!(out_text(&rx), "3\n");
    }

    #[tokio::test]
    async fn false_fails_the_command() {
        let (ctx, rx) = ctx_with_args(&["xp", "1", ">", "2"]);
        assert!(Xp.run(ctx).await.is_err());
        assert_eq!(out_text(&rx), "false\n");
    }

    #[tokio::test]
    async fn true_succeeds() {
        let (ctx, _rx) = ctx_with_args(&["xp", "-q", "2", ">", "1"]);
        Xp.run(ctx).await.unwrap();
    }

    #[tokio::test]
    async fn empty_is_usage() {
        let (ctx, _rx) = ctx_with_args(&["xp"]);
        assert!(matches!(Xp.run(ctx).await, Err(CmdError::Usage(_))));
    }
}
