//! REPL and script-running support for the `conch` binary.

use anyhow::Result;
use conch_kernel::{Kernel, KernelConfig};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

/// How the shell was asked to run.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub debug: bool,
    pub verb: bool,
    /// `-c` command text.
    pub command: Option<String>,
    /// Script path plus its arguments.
    pub script: Option<(String, Vec<String>)>,
}

fn kernel_for(inv: &Invocation) -> Kernel {
    let mut args = vec!["conch".to_string()];
    if let Some((path, rest)) = &inv.script {
        args = vec![path.clone()];
        args.extend(rest.iter().cloned());
    }
    Kernel::new(KernelConfig {
        args,
        debug: inv.debug,
        verb: inv.verb,
        dot: None,
        os_env: true,
        stdio: true,
    })
}

/// Run a `-c` command or a script file to completion. Returns the final
/// status string (empty for success).
pub async fn run_source(inv: &Invocation) -> Result<String> {
    let kernel = kernel_for(inv);
    let src = match (&inv.command, &inv.script) {
        (Some(cmd), _) => cmd.clone(),
        (None, Some((path, _))) => tokio::fs::read_to_string(path).await?,
        (None, None) => String::new(),
    };
    let res = kernel.run(&src).await;
    let sts = match res {
        Ok(()) => String::new(),
        Err(e) => e.to_string(),
    };
    kernel.shutdown().await;
    Ok(sts)
}

/// The interactive loop: read, run, repeat. The prompt comes from
/// `env.prompt` when set.
pub async fn run_repl(inv: &Invocation) -> Result<String> {
    let kernel = kernel_for(inv);
    let mut rl = DefaultEditor::new()?;
    let mut sts = String::new();
    loop {
        let prompt = {
            let p = kernel.ctx().get_env("prompt");
            if p.is_empty() {
                "% ".to_string()
            } else {
                format!("{p} ")
            }
        };
        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);
                match kernel.run(&line).await {
                    Ok(()) => sts.clear(),
                    Err(e) => {
                        debug!(error = %e, "command failed");
                        eprintln!("conch: {e}");
                        sts = e.to_string();
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // ^C interrupts the line, not the shell
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    kernel.shutdown().await;
    Ok(sts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_mode_reports_status() {
        let inv = Invocation {
            command: Some("x = 1".to_string()),
            ..Invocation::default()
        };
        let sts = run_source(&inv).await.unwrap();
        assert_eq!(sts, "");

        let inv = Invocation {
            command: Some("nosuchcmd".to_string()),
            ..Invocation::default()
        };
        let sts = run_source(&inv).await.unwrap();
        assert!(sts.contains("nosuchcmd"));
    }

    #[tokio::test]
    async fn script_mode_gets_argv() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("s.cn");
        std::fs::write(&script, "x = $argv\n").unwrap();
        let inv = Invocation {
            script: Some((
                script.to_string_lossy().to_string(),
                vec!["a".to_string(), "b".to_string()],
            )),
            ..Invocation::default()
        };
        let sts = run_source(&inv).await.unwrap();
        assert_eq!(sts, "");
    }
}
