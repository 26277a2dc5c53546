//! Shared utility functions used across command modules.

use std::path::Path;

use nodestat_core::NodeConfig;
use secrecy::SecretString;
use serde::Serialize;

use crate::error::CliError;

/// Target settings given on the command line; each one replaces the
/// config file value
#[derive(Debug, Default)]
pub struct TargetOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub identity: Option<String>,
    pub password: Option<SecretString>,
}

impl TargetOverrides {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(host) = self.host {
            config.target.host = host;
        }
        if let Some(port) = self.port {
            config.target.port = port;
        }
        if self.user.is_some() {
            config.target.username = self.user;
        }
        if self.identity.is_some() {
            config.target.identity_file = self.identity;
        }
        if self.password.is_some() {
            config.target.password = self.password;
        }
    }
}

/// Loads the config file (explicit path, or the default location if it
/// exists), applies command-line overrides and validates the result.
pub fn load_config(
    config_path: Option<&Path>,
    overrides: TargetOverrides,
) -> Result<NodeConfig, CliError> {
    let mut config = match config_path {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::load_default()?,
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Prompts for the SSH password on the terminal
pub fn prompt_password() -> Result<SecretString, CliError> {
    let password = rpassword::prompt_password("SSH password: ")?;
    Ok(SecretString::from(password))
}

/// Pretty-prints a value as JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{json}");
    Ok(())
}
