//! MySQL administration through the remote `mysql` client.
//!
//! SQL is written to the client's standard input, so statements never
//! appear on a shell line. Values are inlined into SQL text; quote them
//! with [`quote_literal`] and [`quote_identifier`].

use thiserror::Error;
use tracing::{debug, info};

use crate::access::{Access, AccessError, Command};

/// Connection settings for the `mysql` client.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DatabaseCredentials {
    /// Server host; empty uses the client default.
    pub host: String,
    /// Server port, if not the default.
    pub port: Option<u16>,
    /// Account name.
    pub user: String,
    /// Account password.
    pub password: Option<String>,
    /// Default database; empty for server-level statements.
    pub database: String,
}

/// Runs SQL on the instance behind an [`Access`].
pub struct Database<'a> {
    access: &'a dyn Access,
    bin: String,
    credentials: DatabaseCredentials,
}

impl<'a> Database<'a> {
    /// Creates a database handle using the `mysql` client at `bin`.
    #[must_use]
    pub fn new(access: &'a dyn Access, bin: &str, credentials: DatabaseCredentials) -> Self {
        Self {
            access,
            bin: bin.to_owned(),
            credentials,
        }
    }

    /// Credentials in use.
    #[must_use]
    pub const fn credentials(&self) -> &DatabaseCredentials {
        &self.credentials
    }

    fn client_args(&self, extra: &[&str]) -> Vec<String> {
        let credentials = &self.credentials;
        let mut args = Vec::new();
        if !credentials.host.is_empty() {
            args.push(format!("--host={}", credentials.host));
        }
        if let Some(port) = credentials.port {
            args.push(format!("--port={port}"));
        }
        if !credentials.user.is_empty() {
            args.push(format!("--user={}", credentials.user));
        }
        if let Some(ref password) = credentials.password {
            args.push(format!("--password={password}"));
        }
        args.extend(extra.iter().map(|arg| (*arg).to_owned()));
        if !credentials.database.is_empty() {
            args.push(credentials.database.clone());
        }
        args
    }

    fn run_sql(&self, sql: &str, extra: &[&str]) -> Result<Command, DatabaseError> {
        let args = self.client_args(extra);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = self
            .access
            .create_command(&self.bin, &refs)
            .with_stdin(sql);
        debug!(database = %self.credentials.database, "running sql");
        let done = self.access.run_command(command)?;
        if done.is_success() {
            return Ok(done);
        }
        Err(DatabaseError::Query {
            status_text: done.status_text(),
            stderr: done.stderr().trim().to_owned(),
        })
    }

    /// Runs `sql` and returns its result rows split on tabs, without the
    /// header row.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Query`] when the client exits non-zero.
    pub fn query(&self, sql: &str) -> Result<Vec<Vec<String>>, DatabaseError> {
        let done = self.run_sql(sql, &["--batch", "-N"])?;
        Ok(done
            .stdout()
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.split('\t').map(str::to_owned).collect())
            .collect())
    }

    /// Runs a single-value query and returns the trimmed value.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Query`] when the client exits non-zero.
    pub fn query_scalar(&self, sql: &str) -> Result<String, DatabaseError> {
        let done = self.run_sql(sql, &["-N", "-s"])?;
        Ok(done.stdout().trim().to_owned())
    }

    /// Runs statements that return no rows.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Query`] when the client exits non-zero.
    pub fn execute(&self, sql: &str) -> Result<(), DatabaseError> {
        self.run_sql(sql, &[])?;
        Ok(())
    }

    /// Lists the databases visible to the account.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Query`] when the client exits non-zero.
    pub fn list_databases(&self) -> Result<Vec<String>, DatabaseError> {
        Ok(self
            .query("SHOW DATABASES;")?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    /// Returns `true` when `name` exists on the server.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Query`] when the client exits non-zero.
    pub fn database_exists(&self, name: &str) -> Result<bool, DatabaseError> {
        let sql = format!(
            "SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = {};",
            quote_literal(name)
        );
        Ok(self.query_scalar(&sql)? != "0")
    }

    /// Creates `name` unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Query`] when the client exits non-zero.
    pub fn create_database_if_missing(&self, name: &str) -> Result<(), DatabaseError> {
        self.execute(&format!(
            "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET utf8mb4;",
            quote_identifier(name)
        ))?;
        info!(database = name, "ensured database exists");
        Ok(())
    }

    /// Creates `user`@`host` if missing, sets its password, and grants it
    /// all privileges on `database`. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Query`] when the client exits non-zero.
    pub fn create_user_with_grants(
        &self,
        user: &str,
        host: &str,
        password: &str,
        database: &str,
    ) -> Result<(), DatabaseError> {
        let account = format!("{}@{}", quote_literal(user), quote_literal(host));
        let sql = format!(
            "CREATE USER IF NOT EXISTS {account} IDENTIFIED BY {password};\n\
             ALTER USER {account} IDENTIFIED BY {password};\n\
             GRANT ALL PRIVILEGES ON {database}.* TO {account};\n\
             FLUSH PRIVILEGES;\n",
            password = quote_literal(password),
            database = quote_identifier(database),
        );
        self.execute(&sql)?;
        info!(user, host, database, "ensured account and grants");
        Ok(())
    }

    /// Loads a dump that already sits on the target at `remote_path`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::UnsafePath`] for paths the client cannot
    /// parse, or [`DatabaseError::Query`] when the import fails.
    pub fn import_file(&self, remote_path: &str) -> Result<(), DatabaseError> {
        if remote_path.contains(['\n', '\r', ';']) {
            return Err(DatabaseError::UnsafePath(remote_path.to_owned()));
        }
        self.execute(&format!("SOURCE {remote_path}\n"))?;
        info!(path = remote_path, "imported dump");
        Ok(())
    }
}

/// Quotes `value` as a SQL string literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            '\0' => quoted.push_str("\\0"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\u{1a}' => quoted.push_str("\\Z"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Quotes `name` as a SQL identifier.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Errors raised by [`Database`].
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Raised when the transport fails.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// Raised when the `mysql` client exits non-zero.
    #[error("mysql exited with status {status_text}: {stderr}")]
    Query {
        /// Human readable exit status.
        status_text: String,
        /// Stderr captured from the client.
        stderr: String,
    },
    /// Raised when a dump path cannot be passed to `SOURCE`.
    #[error("unsupported dump path: {0}")]
    UnsafePath(String),
}
