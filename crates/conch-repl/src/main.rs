//! conch CLI entry point.
//!
//! Usage:
//!   conch                    # interactive shell
//!   conch -c <command>       # run a command and exit
//!   conch script.cn [args]   # run a script
//!   conch -D ...             # debug diagnostics on err

use std::env;
use std::process::ExitCode;

use anyhow::Result;
use conch_repl::{run_repl, run_source, Invocation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // tracing respects RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(sts) if sts.is_empty() => ExitCode::SUCCESS,
        Ok(sts) => {
            eprintln!("conch: {sts}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("conch: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<String> {
    let argv: Vec<String> = env::args().skip(1).collect();
    let mut inv = Invocation::default();
    let mut i = 0;
    while i < argv.len() {
        match argv[i].as_str() {
            "-D" => inv.debug = true,
            "-v" => inv.verb = true,
            "-c" => {
                i += 1;
                let cmd = argv
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("-c needs a command"))?;
                inv.command = Some(cmd.clone());
            }
            "-h" | "--help" => {
                print_usage();
                return Ok(String::new());
            }
            arg if !arg.starts_with('-') => {
                inv.script = Some((arg.to_string(), argv[i + 1..].to_vec()));
                break;
            }
            other => {
                anyhow::bail!("unknown option {other}; try -h");
            }
        }
        i += 1;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    if inv.command.is_some() || inv.script.is_some() {
        rt.block_on(run_source(&inv))
    } else {
        rt.block_on(run_repl(&inv))
    }
}

fn print_usage() {
    println!(
        r#"usage: conch [-D] [-v] [-c command] [script [args]]

  conch                 interactive shell
  conch -c 'lf | cnt'   run a command and exit
  conch build.cn x y    run a script with $argv = x y

  -D    debug diagnostics on err
  -v    verbose warnings
"#
    );
}
