// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Client configuration.
//!
//! Applications typically start from the environment and override what they
//! need:
//!
//! ```
//! # use helpdesk_auth::options::ClientConfig;
//! # use std::time::Duration;
//! let config = ClientConfig::builder()
//!     .with_base_url("https://helpdesk.example.com")
//!     .with_request_timeout(Duration::from_secs(5))
//!     .build()?;
//! assert_eq!(
//!     config.api_url("/auth/login"),
//!     "https://helpdesk.example.com/api/v1/auth/login"
//! );
//! # Ok::<(), helpdesk_auth::errors::Error>(())
//! ```

use crate::Result;
use crate::constants::{
    API_PREFIX, API_URL_VAR, DEFAULT_REFRESH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    REQUEST_TIMEOUT_VAR,
};
use crate::errors::Error;
use crate::store::DEFAULT_NAMESPACE;
use crate::token::DEFAULT_EXPIRY_MARGIN;
use std::time::Duration;

/// The validated configuration of an [AuthenticatedClient][crate::client::AuthenticatedClient].
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    base_url: String,
    refresh_timeout: Duration,
    request_timeout: Duration,
    expiry_margin: Duration,
    namespace: String,
}

impl ClientConfig {
    /// Returns a builder with the default settings.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Creates a configuration from the environment.
    ///
    /// `HELPDESK_API_URL` is required. `HELPDESK_REQUEST_TIMEOUT` is optional
    /// and uses the [humantime] format, for example `30s` or `1m 30s`.
    pub fn from_env() -> Result<Self> {
        Builder::default().with_env()?.build()
    }

    /// The backend origin, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The full URL for `path`, which is relative to the API prefix.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    /// The upper bound for a single call to the refresh endpoint.
    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    /// The upper bound for every other request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Tokens expiring within this margin are refreshed before use.
    pub fn expiry_margin(&self) -> Duration {
        self.expiry_margin
    }

    /// The prefix of the keys in the credential store.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// A builder for [ClientConfig].
#[derive(Clone, Debug)]
pub struct Builder {
    base_url: Option<String>,
    refresh_timeout: Duration,
    request_timeout: Duration,
    expiry_margin: Duration,
    namespace: String,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            base_url: None,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl Builder {
    /// Sets the backend origin, for example `https://helpdesk.example.com`.
    pub fn with_base_url<T: Into<String>>(mut self, v: T) -> Self {
        self.base_url = Some(v.into());
        self
    }

    /// Bounds each refresh call. Defaults to 10 seconds.
    pub fn with_refresh_timeout(mut self, v: Duration) -> Self {
        self.refresh_timeout = v;
        self
    }

    /// Bounds each authenticated request. Defaults to 30 seconds.
    pub fn with_request_timeout(mut self, v: Duration) -> Self {
        self.request_timeout = v;
        self
    }

    /// Sets the expiry margin. Defaults to 30 seconds.
    pub fn with_expiry_margin(mut self, v: Duration) -> Self {
        self.expiry_margin = v;
        self
    }

    /// Sets the credential store namespace. Defaults to `helpdesk`.
    pub fn with_namespace<T: Into<String>>(mut self, v: T) -> Self {
        self.namespace = v.into();
        self
    }

    /// Overrides the settings found in the environment.
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var(API_URL_VAR) {
            self.base_url = Some(url);
        }
        if let Ok(timeout) = std::env::var(REQUEST_TIMEOUT_VAR) {
            self.request_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                Error::config(format!("{REQUEST_TIMEOUT_VAR}={timeout:?} is not a duration: {e}"))
            })?;
        }
        Ok(self)
    }

    /// Validates the settings.
    pub fn build(self) -> Result<ClientConfig> {
        let base_url = self.base_url.ok_or_else(|| {
            Error::config(format!("missing base URL, set it in code or with {API_URL_VAR}"))
        })?;
        let parsed = url::Url::parse(&base_url)
            .map_err(|e| Error::config(format!("invalid base URL {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "unsupported scheme in base URL {base_url:?}, want http or https"
            )));
        }
        if self.refresh_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        if self.namespace.is_empty() {
            return Err(Error::config("the credential store namespace cannot be empty"));
        }
        Ok(ClientConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            refresh_timeout: self.refresh_timeout,
            request_timeout: self.request_timeout,
            expiry_margin: self.expiry_margin,
            namespace: self.namespace,
        })
    }
}
