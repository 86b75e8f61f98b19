//! echo — arguments to one data message.

use async_trait::async_trait;
use conch_types::CmdError;

use crate::context::Ctx;
use crate::opt::Opts;
use crate::tools::{out_chan, Tool};

pub struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn usage(&self) -> &'static str {
        "{arg}"
    }

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError> {
        let opts = Opts::new("echo", self.usage())
            .flag('D', "debug")
            .flag('n', "don't add a final newline")
            .flag('u', "use unix out");
        let parsed = opts.parse(&ctx.args[1..])?;
        if parsed.has('u') {
            ctx.unix_io(&["out"]);
        }
        let mut s = parsed.args.join(" ");
        if !parsed.has('n') {
            s.push('\n');
        }
        let out = out_chan(&ctx)?;
        if !out.send(conch_types::Msg::bytes(s)).await {
            return Err(out.cause().unwrap_or(CmdError::Intr));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testutil::{ctx_with_args, out_text};

    #[tokio::test]
    async fn joins_args_with_spaces() {
        let (ctx, rx) = ctx_with_args(&["echo", "a", "b", "c"]);
        Echo.run(ctx).await.unwrap();
        assert_eq!(out_text(&rx), "a b c\n");
    }

    #[tokio::test]
    async fn minus_n_suppresses_newline() {
        let (ctx, rx) = ctx_with_args(&["echo", "-n", "x"]);
        Echo.run(ctx).await.unwrap();
        assert_eq!(out_text(&rx), "x");
    }

    #[tokio::test]
    async fn empty_echo_is_a_blank_line() {
        let (ctx, rx) = ctx_with_args(&["echo"]);
        Echo.run(ctx).await.unwrap();
        assert_eq!(out_text(&rx), "\n");
    }

    #[tokio::test]
    async fn closed_out_is_reported() {
        let (ctx, rx) = ctx_with_args(&["echo", "x"]);
        rx.close(Some(CmdError::Intr));
        assert!(Echo.run(ctx).await.is_err());
    }
}
