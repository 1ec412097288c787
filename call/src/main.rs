//! Send one command to a running plotting process and print the result
//!
//! Usage:
//!   kst-call <command> [args...]
//!   kst-call vector.create -1 1 100
//!   kst-call --name DataObjects vector.values V1

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kstlink::{DEFAULT_SESSION_NAME, RetryPolicy, Session, SessionConfig, Value};

/// Send one command to a running plotting process
#[derive(Parser)]
#[command(name = "kst-call")]
#[command(version)]
#[command(about = "Send one command to a running Kst plotting process")]
struct Cli {
    /// Session name of the plotting process
    #[arg(short, long, env = "KSTLINK_SESSION", default_value = DEFAULT_SESSION_NAME)]
    name: String,

    /// Seconds to wait for the answer
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Command name to invoke
    command: String,

    /// Positional arguments; numbers and true/false are sent typed, the rest as text
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kstlink=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    let config = SessionConfig::builder()
        .name(cli.name.as_str())
        .call_timeout(Duration::from_secs(cli.timeout.max(1)))
        .retry(RetryPolicy::no_retry())
        .build();
    let session = Session::connect(config)
        .with_context(|| format!("failed to reach session '{}'", cli.name))?;

    let args = cli.args.iter().map(|token| Value::parse_token(token));
    let value = session
        .call(&cli.command, args)
        .with_context(|| format!("'{}' failed", cli.command))?;

    serde_json::to_string_pretty(&value.to_json()).context("JSON encoding failed")
}
