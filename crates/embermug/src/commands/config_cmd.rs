//! Config subcommand handlers.

use embermug_config::{Config, ConfigError};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

/// `config path` works even when the file fails to load, so the load
/// result is passed in unresolved.
pub fn handle(
    args: &ConfigArgs,
    global: &GlobalOpts,
    loaded: Result<Config, ConfigError>,
) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = loaded?;
            print!("{}", embermug_config::render_config(&cfg)?);
        }
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(embermug_config::config_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
