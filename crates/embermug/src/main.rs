mod cli;
mod commands;
mod device;
mod error;
mod shutdown;
mod socket;

use std::io::IsTerminal;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use embermug_config::{Config, ConfigError};

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Loaded up front so the configured log level applies from the start.
    let loaded = embermug_config::load_config(cli.global.config.as_deref());
    let level = cli
        .global
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|cfg| cfg.log_level.clone()))
        .unwrap_or_else(|| "info".into());
    init_tracing(cli.global.verbose, &level);

    if let Err(err) = run(cli, loaded).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// `RUST_LOG` wins, then `-v`, then the configured level.
fn init_tracing(verbosity: u8, level: &str) {
    let filter = match verbosity {
        0 => level,
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"))
        }))
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

async fn run(cli: Cli, loaded: Result<Config, ConfigError>) -> Result<(), CliError> {
    tracing::debug!(command = ?cli.command, "dispatching command");
    match cli.command {
        // Config commands report load failures themselves
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global, loaded),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "embermug", &mut std::io::stdout());
            Ok(())
        }

        Command::Service(args) => commands::service::handle(args, &cli.global, &loaded?).await,
        Command::Monitor(args) => commands::monitor::handle(args, &loaded?).await,
        Command::Watch(args) => commands::watch::handle(args, &cli.global, &loaded?).await,
        Command::Reconnect => commands::reconnect::handle(&cli.global, &loaded?).await,
    }
}
