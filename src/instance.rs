//! Managed instance identity and connection parameters.
//!
//! An [`Instance`] is the persisted description of one deployment. Access
//! objects are never stored alongside it; they are rebuilt from these
//! connection parameters for every operation.

use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

/// Default interpreter used to run helper scripts on an instance.
pub const DEFAULT_INTERPRETER: &str = "php";

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_FTP_PORT: u16 = 21;

/// Transport used to reach an instance.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// Instance lives on the machine running the tool.
    Local,
    /// Instance is reached through the system `ssh` client.
    Ssh,
    /// Instance is reached through the system `ftp` client.
    Ftp,
}

impl AccessType {
    /// Returns the lowercase tag used in configuration and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Ssh => "ssh",
            Self::Ftp => "ftp",
        }
    }

    const fn default_port(self) -> u16 {
        match self {
            Self::Local => 0,
            Self::Ssh => DEFAULT_SSH_PORT,
            Self::Ftp => DEFAULT_FTP_PORT,
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = InstanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "ssh" | "ssh::unix" => Ok(Self::Ssh),
            "ftp" => Ok(Self::Ftp),
            other => Err(InstanceError::UnknownAccessType(other.to_owned())),
        }
    }
}

/// Host and credentials for remote transports.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConnectionParams {
    /// Hostname or address of the remote machine.
    pub host: String,
    /// TCP port of the transport.
    pub port: u16,
    /// Remote account name.
    pub user: String,
    /// Password, required for FTP.
    pub password: Option<String>,
    /// SSH private key, passed to `ssh -i` when present.
    pub identity_file: Option<String>,
}

/// A managed deployment of the web application.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instance {
    /// Stable identifier.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Absolute path of the application root on the target.
    pub webroot: Utf8PathBuf,
    /// Public URL serving `webroot`.
    pub web_url: String,
    /// Transport used to reach the instance.
    pub access_type: AccessType,
    /// Connection parameters; empty for local instances.
    pub connection: ConnectionParams,
    /// Interpreter used to run helper scripts on the target.
    pub interpreter: String,
    /// Scratch directory on the target for transient helper files.
    pub temp_dir: Utf8PathBuf,
}

impl Instance {
    /// Starts a builder for an [`Instance`].
    #[must_use]
    pub fn builder() -> InstanceBuilder {
        InstanceBuilder::default()
    }

    /// Returns `user@host` for remote transports.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.connection.user, self.connection.host)
    }

    /// Resolves `path` against the webroot when it is relative.
    #[must_use]
    pub fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.webroot.join(path)
        }
    }

    /// Validates required fields for the configured transport.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Validation`] naming the first missing field.
    pub fn validate(&self) -> Result<(), InstanceError> {
        require(&self.id, "id")?;
        require(self.webroot.as_str(), "webroot")?;
        require(&self.interpreter, "interpreter")?;
        match self.access_type {
            AccessType::Local => Ok(()),
            AccessType::Ssh => {
                require(&self.connection.host, "host")?;
                require(&self.connection.user, "user")
            }
            AccessType::Ftp => {
                require(&self.connection.host, "host")?;
                require(&self.connection.user, "user")?;
                require(self.connection.password.as_deref().unwrap_or(""), "password")?;
                require(&self.web_url, "web_url")
            }
        }
    }
}

fn require(value: &str, field: &str) -> Result<(), InstanceError> {
    if value.trim().is_empty() {
        return Err(InstanceError::Validation(field.to_owned()));
    }
    Ok(())
}

/// Builder for [`Instance`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default)]
pub struct InstanceBuilder {
    id: String,
    name: String,
    webroot: String,
    web_url: String,
    access_type: Option<AccessType>,
    host: String,
    port: Option<u16>,
    user: String,
    password: Option<String>,
    identity_file: Option<String>,
    interpreter: Option<String>,
    temp_dir: Option<String>,
}

impl InstanceBuilder {
    /// Sets the identifier.
    #[must_use]
    pub fn id(mut self, value: impl Into<String>) -> Self {
        self.id = value.into();
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the webroot path.
    #[must_use]
    pub fn webroot(mut self, value: impl Into<String>) -> Self {
        self.webroot = value.into();
        self
    }

    /// Sets the public URL.
    #[must_use]
    pub fn web_url(mut self, value: impl Into<String>) -> Self {
        self.web_url = value.into();
        self
    }

    /// Sets the transport.
    #[must_use]
    pub const fn access_type(mut self, value: AccessType) -> Self {
        self.access_type = Some(value);
        self
    }

    /// Sets the remote host.
    #[must_use]
    pub fn host(mut self, value: impl Into<String>) -> Self {
        self.host = value.into();
        self
    }

    /// Overrides the transport's default port.
    #[must_use]
    pub const fn port(mut self, value: u16) -> Self {
        self.port = Some(value);
        self
    }

    /// Sets the remote user.
    #[must_use]
    pub fn user(mut self, value: impl Into<String>) -> Self {
        self.user = value.into();
        self
    }

    /// Sets the password.
    #[must_use]
    pub fn password(mut self, value: Option<String>) -> Self {
        self.password = value;
        self
    }

    /// Sets the SSH identity file.
    #[must_use]
    pub fn identity_file(mut self, value: Option<String>) -> Self {
        self.identity_file = value;
        self
    }

    /// Overrides the helper script interpreter.
    #[must_use]
    pub fn interpreter(mut self, value: impl Into<String>) -> Self {
        self.interpreter = Some(value.into());
        self
    }

    /// Overrides the remote scratch directory.
    #[must_use]
    pub fn temp_dir(mut self, value: impl Into<String>) -> Self {
        self.temp_dir = Some(value.into());
        self
    }

    /// Builds and validates the [`Instance`].
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Validation`] when a field required by the
    /// chosen transport is empty.
    pub fn build(self) -> Result<Instance, InstanceError> {
        let access_type = self.access_type.unwrap_or(AccessType::Local);
        let id = self.id.trim().to_owned();
        let name = if self.name.trim().is_empty() {
            id.clone()
        } else {
            self.name.trim().to_owned()
        };
        let instance = Instance {
            id,
            name,
            webroot: Utf8PathBuf::from(self.webroot.trim()),
            web_url: self.web_url.trim().trim_end_matches('/').to_owned(),
            access_type,
            connection: ConnectionParams {
                host: self.host.trim().to_owned(),
                port: self.port.unwrap_or_else(|| access_type.default_port()),
                user: self.user.trim().to_owned(),
                password: self.password,
                identity_file: self.identity_file.map(|value| value.trim().to_owned()),
            },
            interpreter: self
                .interpreter
                .map_or_else(|| DEFAULT_INTERPRETER.to_owned(), |value| value.trim().to_owned()),
            temp_dir: Utf8PathBuf::from(
                self.temp_dir
                    .as_deref()
                    .map_or("/tmp", str::trim),
            ),
        };
        instance.validate()?;
        Ok(instance)
    }
}

/// Errors raised while describing an instance.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InstanceError {
    /// Raised when a required field is empty.
    #[error("missing or empty instance field: {0}")]
    Validation(String),
    /// Raised when the access type tag is not recognised.
    #[error("unknown access type: {0}")]
    UnknownAccessType(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn builder_applies_transport_default_port() {
        let instance = Instance::builder()
            .id("blog")
            .webroot("/var/www/blog")
            .access_type(AccessType::Ssh)
            .host("example.org")
            .user("deploy")
            .build()
            .expect("ssh instance should build");

        assert_eq!(instance.connection.port, 22);
        assert_eq!(instance.destination(), "deploy@example.org");
        assert_eq!(instance.name, "blog");
        assert_eq!(instance.interpreter, DEFAULT_INTERPRETER);
    }

    #[test]
    fn builder_requires_password_and_url_for_ftp() {
        let err = Instance::builder()
            .id("shop")
            .webroot("/htdocs")
            .access_type(AccessType::Ftp)
            .host("ftp.example.org")
            .user("shop")
            .build()
            .expect_err("ftp without password should fail");

        assert_eq!(err, InstanceError::Validation(String::from("password")));
    }

    #[test]
    fn resolve_joins_relative_paths_to_webroot() {
        let instance = Instance::builder()
            .id("local")
            .webroot("/srv/app")
            .build()
            .expect("local instance should build");

        assert_eq!(instance.resolve(Utf8Path::new("lib")), "/srv/app/lib");
        assert_eq!(instance.resolve(Utf8Path::new("/etc/hosts")), "/etc/hosts");
    }

    #[rstest]
    #[case("local", AccessType::Local)]
    #[case("SSH", AccessType::Ssh)]
    #[case("ssh::unix", AccessType::Ssh)]
    #[case(" ftp ", AccessType::Ftp)]
    fn access_type_parses_tags(#[case] input: &str, #[case] expected: AccessType) {
        assert_eq!(input.parse::<AccessType>(), Ok(expected));
    }

    #[test]
    fn access_type_rejects_unknown_tags() {
        assert!(matches!(
            "telnet".parse::<AccessType>(),
            Err(InstanceError::UnknownAccessType(_))
        ));
    }
}
