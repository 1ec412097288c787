use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};
use config::{load_config, merge_config};
use error::{CliResult, to_exit_code};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = if cli.verbose {
        "kstlink=debug,kstlink_cli=debug"
    } else {
        "kstlink=warn,kstlink_cli=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    to_exit_code(run(cli))
}

fn run(cli: Cli) -> CliResult<()> {
    let file_config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Stub(args) => {
            let config = merge_config(file_config, &cli.session, kstlink::DEFAULT_SESSION_NAME)?;
            commands::stub::execute(args, config)
        }
        Commands::Demo(args) => {
            let config = merge_config(file_config, &cli.session, args.demo.session_name())?;
            commands::demo::execute(args, config)
        }
        Commands::Export(args) => {
            let config = merge_config(file_config, &cli.session, kstlink::DEFAULT_SESSION_NAME)?;
            commands::export::execute(args, config)
        }
    }
}
