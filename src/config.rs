//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `fleetkeeper.toml`, and `FLEET_*` environment
//! variables. Only the binary loads configuration; library components take
//! the resolved [`FleetConfig`] explicitly.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::checksum::DEFAULT_IGNORE_PATTERN;

/// Default location of the checksum store.
pub const DEFAULT_STORE_PATH: &str = "fleetkeeper.db";

/// Tool locations, transport options, and store settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "FLEET",
    discovery(
        app_name = "fleetkeeper",
        env_var = "FLEET_CONFIG_PATH",
        config_file_name = "fleetkeeper.toml",
        dotfile_name = ".fleetkeeper.toml",
        project_file_name = "fleetkeeper.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "transport toggles are naturally expressed as booleans"
)]
pub struct FleetConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Path to the `ftp` executable.
    #[ortho_config(default = "ftp".to_owned())]
    pub ftp_bin: String,
    /// Path to the `svn` executable on the target.
    #[ortho_config(default = "svn".to_owned())]
    pub svn_bin: String,
    /// Path to the `git` executable on the target.
    #[ortho_config(default = "git".to_owned())]
    pub git_bin: String,
    /// Path to the `mysql` client on the target.
    #[ortho_config(default = "mysql".to_owned())]
    pub mysql_bin: String,
    /// Path to the `crontab` executable on the target.
    #[ortho_config(default = "crontab".to_owned())]
    pub crontab_bin: String,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking.
    #[ortho_config(default = true)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; empty keeps the SSH default.
    #[ortho_config(default = String::new())]
    pub ssh_known_hosts_file: String,
    /// SSH connection timeout in seconds.
    #[ortho_config(default = 10)]
    pub ssh_connect_timeout_secs: u64,
    /// Timeout for the HTTP side channel used by FTP instances.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
    /// Path of the SQLite checksum store.
    #[ortho_config(default = DEFAULT_STORE_PATH.to_owned())]
    pub store_path: String,
    /// Regular expression of relative paths excluded from checksums.
    #[ortho_config(default = DEFAULT_IGNORE_PATTERN.to_owned())]
    pub checksum_ignore_pattern: String,
    /// Whether to run an FTP passive-mode session.
    #[ortho_config(default = true)]
    pub ftp_passive: bool,
}

impl FleetConfig {
    /// Returns the built-in defaults without consulting any source.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            ftp_bin: String::from("ftp"),
            svn_bin: String::from("svn"),
            git_bin: String::from("git"),
            mysql_bin: String::from("mysql"),
            crontab_bin: String::from("crontab"),
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: true,
            ssh_known_hosts_file: String::new(),
            ssh_connect_timeout_secs: 10,
            http_timeout_secs: 30,
            store_path: DEFAULT_STORE_PATH.to_owned(),
            checksum_ignore_pattern: DEFAULT_IGNORE_PATTERN.to_owned(),
            ftp_passive: true,
        }
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("fleetkeeper")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures tool paths and store settings are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the env var and TOML key
    /// that supply the missing value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, key) in [
            (&self.ssh_bin, "ssh_bin"),
            (&self.scp_bin, "scp_bin"),
            (&self.ftp_bin, "ftp_bin"),
            (&self.svn_bin, "svn_bin"),
            (&self.git_bin, "git_bin"),
            (&self.mysql_bin, "mysql_bin"),
            (&self.crontab_bin, "crontab_bin"),
            (&self.store_path, "store_path"),
            (&self.checksum_ignore_pattern, "checksum_ignore_pattern"),
        ] {
            Self::require_field(value, key)?;
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "http_timeout_secs must be greater than zero",
            )));
        }
        Ok(())
    }

    fn require_field(value: &str, key: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {key}: set FLEET_{} or add {key} to fleetkeeper.toml",
                key.to_uppercase()
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn builtin_defaults_validate() {
        assert_eq!(FleetConfig::builtin().validate(), Ok(()));
    }

    #[rstest]
    #[case::ssh("ssh_bin")]
    #[case::store("store_path")]
    fn validate_names_env_var_for_blank_fields(#[case] field: &str) {
        let mut config = FleetConfig::builtin();
        match field {
            "ssh_bin" => config.ssh_bin = String::from("  "),
            _ => config.store_path = String::new(),
        }

        let err = config.validate().expect_err("blank field should fail");
        let message = err.to_string();
        assert!(
            message.contains(&format!("FLEET_{}", field.to_uppercase())),
            "message should name the env var: {message}"
        );
    }

    #[test]
    fn validate_rejects_zero_http_timeout() {
        let config = FleetConfig {
            http_timeout_secs: 0,
            ..FleetConfig::builtin()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
