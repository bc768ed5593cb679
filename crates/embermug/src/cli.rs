//! Clap derive structures for the `embermug` CLI.
//!
//! Also compiled by `build.rs` for man page generation, so this module
//! may only depend on clap and clap_complete.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// embermug -- Ember mug state over a Unix socket
#[derive(Debug, Parser)]
#[command(
    name = "embermug",
    version,
    about = "Follow an Ember mug over Bluetooth and share its state",
    long_about = "Keeps a Bluetooth LE session with one Ember mug and publishes its\n\
        state as newline-delimited JSON to any number of clients on a Unix\n\
        socket.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (default: $XDG_CONFIG_HOME/embermug/config.toml)
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Service socket path (overrides socket-path)
    #[arg(long, short = 's', global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Log filter, e.g. "info" or "embermug_core=debug"
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the service: follow the mug and serve clients on the socket
    #[command(alias = "serve")]
    Service(DeviceArgs),

    /// Follow the mug directly and print state changes to stdout
    Monitor(DeviceArgs),

    /// Print state updates from a running service
    Watch(WatchArgs),

    /// Ask a running service to reconnect to the mug
    Reconnect,

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Mug Bluetooth address (overrides [service] device-address)
    #[arg(value_name = "ADDRESS")]
    pub address: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Exit after the first snapshot
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration (file plus environment)
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
