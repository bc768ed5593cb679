//! Command handlers, one module per subcommand.

pub mod config_cmd;
pub mod monitor;
pub mod reconnect;
pub mod service;
pub mod watch;

use std::path::PathBuf;

use embermug_api::DeviceAddress;
use embermug_config::Config;
use embermug_core::ServiceConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the mug to follow: the ADDRESS argument, else the config.
pub fn service_config(address: Option<&str>, cfg: &Config) -> Result<ServiceConfig, CliError> {
    let address = address
        .map(|raw| {
            raw.parse::<DeviceAddress>()
                .map_err(|e| CliError::Validation {
                    field: "ADDRESS".into(),
                    reason: e.to_string(),
                })
        })
        .transpose()?;
    Ok(embermug_config::service_config(cfg, address)?)
}

/// `--socket` wins over the configured `socket-path`.
pub fn socket_path(global: &GlobalOpts, cfg: &Config) -> PathBuf {
    global
        .socket
        .clone()
        .unwrap_or_else(|| cfg.socket_path.clone())
}
