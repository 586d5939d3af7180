//! HTTP side channel used to execute helper scripts on FTP-only targets.
//!
//! FTP has no remote execution primitive. Helper scripts are uploaded into
//! the webroot and triggered by fetching their public URL.

use std::time::Duration;

use tracing::debug;

use super::AccessError;

/// Fetches the output of a helper script exposed over HTTP.
pub trait SideChannel {
    /// Performs a GET request on `url` with `args` encoded as repeated
    /// `arg[]` query parameters and returns the body.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Script`] when the request fails or the server
    /// answers with a non-success status.
    fn fetch(&self, url: &str, args: &[&str]) -> Result<String, AccessError>;
}

/// [`SideChannel`] backed by a blocking `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpSideChannel {
    client: reqwest::blocking::Client,
}

impl HttpSideChannel {
    /// Builds a client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Spawn`] when the HTTP client cannot be built.
    pub fn new(timeout_secs: u64) -> Result<Self, AccessError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|err| AccessError::Spawn {
                program: String::from("http client"),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl SideChannel for HttpSideChannel {
    fn fetch(&self, url: &str, args: &[&str]) -> Result<String, AccessError> {
        let script_error = |message: String| AccessError::Script {
            script: url.to_owned(),
            message,
        };
        let query: Vec<(&str, &str)> = args.iter().map(|arg| ("arg[]", *arg)).collect();
        debug!(url, argc = args.len(), "fetching helper output");
        let response = self
            .client
            .get(url)
            .query(&query)
            .send()
            .map_err(|err| script_error(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| script_error(err.to_string()))?;
        if !status.is_success() {
            return Err(script_error(format!("HTTP {status}: {}", body.trim())));
        }
        Ok(body)
    }
}
