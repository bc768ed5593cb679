//! Configuration for the embermug service and CLI.
//!
//! One TOML file plus `EMBER_*` environment overrides, layered with
//! figment, and translation to `embermug_core::ServiceConfig`. The CLI
//! applies its own flag overrides on top.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use embermug_api::DeviceAddress;
use embermug_core::{DEFAULT_CONNECT_ATTEMPTS, ServiceConfig};

/// Prefix for environment overrides. `__` separates tables, `_` stands
/// in for `-` inside a key: `EMBER_SERVICE__DEVICE_ADDRESS`.
pub const ENV_PREFIX: &str = "EMBER_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no mug address configured (pass ADDRESS or set [service] device-address)")]
    MissingAddress,

    #[error("config file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Default log filter when neither `RUST_LOG` nor `-v` is given.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where `service` listens and `watch`/`reconnect` connect.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    #[serde(default)]
    pub service: ServiceSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            socket_path: default_socket_path(),
            service: ServiceSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceSection {
    /// Bluetooth address of the mug to follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_address: Option<String>,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            device_address: None,
            connect_attempts: default_connect_attempts(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/embermug.sock")
}
fn default_connect_attempts() -> u32 {
    DEFAULT_CONNECT_ATTEMPTS
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "embermug").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("embermug");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from `path` (or the default location) plus environment.
///
/// A missing file at the default location just means defaults; a missing
/// file that was asked for explicitly is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::MissingFile {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(
            Env::prefixed(ENV_PREFIX)
                .map(|key| key.as_str().replace("__", ".").replace('_', "-").into()),
        );

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Render the effective config as TOML, for `config show`.
pub fn render_config(cfg: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(cfg)?)
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `ServiceConfig`. An address given on the command line wins
/// over the configured one.
pub fn service_config(
    cfg: &Config,
    address: Option<DeviceAddress>,
) -> Result<ServiceConfig, ConfigError> {
    let address = match (address, cfg.service.device_address.as_deref()) {
        (Some(address), _) => address,
        (None, Some(raw)) => raw.parse().map_err(|_| ConfigError::Validation {
            field: "service.device-address".into(),
            reason: format!("expected a Bluetooth address like C8:6E:14:A0:3B:7F, got '{raw}'"),
        })?,
        (None, None) => return Err(ConfigError::MissingAddress),
    };

    if cfg.service.connect_attempts == 0 {
        return Err(ConfigError::Validation {
            field: "service.connect-attempts".into(),
            reason: "must be at least 1".into(),
        });
    }

    Ok(ServiceConfig::new(address).with_connect_attempts(cfg.service.connect_attempts))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::result_large_err)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    const ADDRESS: DeviceAddress = DeviceAddress::new([0xC8, 0x6E, 0x14, 0xA0, 0x3B, 0x7F]);

    #[test]
    fn defaults_without_a_file() {
        Jail::expect_with(|jail| {
            let missing = jail.directory().join("nope.toml");
            assert!(matches!(
                load_config(Some(&missing)),
                Err(ConfigError::MissingFile { .. })
            ));

            jail.create_file("empty.toml", "")?;
            let cfg = load_config(Some(Path::new("empty.toml"))).unwrap();
            assert_eq!(cfg, Config::default());
            assert_eq!(cfg.socket_path, PathBuf::from("/run/embermug.sock"));
            assert_eq!(cfg.service.connect_attempts, 10);
            Ok(())
        });
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    log-level = "debug"
                    socket-path = "/tmp/mug.sock"

                    [service]
                    device-address = "c8:6e:14:a0:3b:7f"
                    connect-attempts = 3
                "#,
            )?;
            jail.set_env("EMBER_SOCKET_PATH", "/tmp/other.sock");
            jail.set_env("EMBER_SERVICE__CONNECT_ATTEMPTS", "5");

            let cfg = load_config(Some(Path::new("config.toml"))).unwrap();
            assert_eq!(cfg.log_level, "debug");
            assert_eq!(cfg.socket_path, PathBuf::from("/tmp/other.sock"));
            assert_eq!(cfg.service.connect_attempts, 5);

            let service = service_config(&cfg, None).unwrap();
            assert_eq!(service.address, ADDRESS);
            assert_eq!(service.connect_attempts, 5);
            Ok(())
        });
    }

    #[test]
    fn command_line_address_wins() {
        let cfg = Config {
            service: ServiceSection {
                device_address: Some("01:02:03:04:05:06".into()),
                ..ServiceSection::default()
            },
            ..Config::default()
        };
        assert_eq!(service_config(&cfg, Some(ADDRESS)).unwrap().address, ADDRESS);
    }

    #[test]
    fn address_problems_are_reported() {
        let mut cfg = Config::default();
        assert!(matches!(
            service_config(&cfg, None),
            Err(ConfigError::MissingAddress)
        ));

        cfg.service.device_address = Some("not-a-mug".into());
        let err = service_config(&cfg, None).unwrap_err();
        assert!(err.to_string().contains("service.device-address"));

        cfg.service.device_address = Some(ADDRESS.to_string());
        cfg.service.connect_attempts = 0;
        assert!(matches!(
            service_config(&cfg, None),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn bad_types_surface_as_figment_errors() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[service]\nconnect-attempts = \"lots\"\n")?;
            assert!(matches!(
                load_config(Some(Path::new("config.toml"))),
                Err(ConfigError::Figment(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn rendered_config_reloads_unchanged() {
        Jail::expect_with(|jail| {
            let mut cfg = Config::default();
            cfg.service.device_address = Some(ADDRESS.to_string());
            jail.create_file("config.toml", &render_config(&cfg).unwrap())?;
            assert_eq!(load_config(Some(Path::new("config.toml"))).unwrap(), cfg);
            Ok(())
        });
    }
}
