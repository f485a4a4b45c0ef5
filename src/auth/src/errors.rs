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

//! Errors returned by the authenticated API client.

use http::StatusCode;
use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

type ArcError = Arc<dyn StdError + Send + Sync>;

/// The error type for all operations in this crate.
///
/// A single refresh failure is delivered to every request queued behind it,
/// so this type is cheap to clone: the underlying source is reference
/// counted.
///
/// Applications rarely need to match on the exact error. The predicates
/// ([is_timeout][Error::is_timeout], [is_authentication][Error::is_authentication],
/// etc.) cover the cases the UI layer distinguishes, and
/// [category][Error::category] maps the error to the bucket used for
/// user-facing notifications.
///
/// # Example
/// ```
/// # use helpdesk_auth::errors::{Error, ErrorCategory};
/// let error = Error::missing_credential("No refresh token found");
/// assert!(error.is_missing_credential());
/// assert_eq!(error.category(), ErrorCategory::Unauthorized);
/// ```
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<ArcError>,
}

#[derive(Clone, Debug, PartialEq)]
enum ErrorKind {
    MissingCredential,
    Timeout,
    Io,
    Authentication,
    Authorization,
    Http(StatusCode),
    Decode,
    Store,
    Config,
}

impl Error {
    /// A credential required by the operation is not available.
    ///
    /// This is returned, without any network round-trip, when a refresh is
    /// needed and there is no refresh token in the store.
    pub fn missing_credential<T: Into<String>>(message: T) -> Self {
        Self::from_message(ErrorKind::MissingCredential, message)
    }

    /// The operation did not complete within its time bound.
    pub fn timeout<T: Into<String>>(message: T) -> Self {
        Self::from_message(ErrorKind::Timeout, message)
    }

    /// A timeout reported by a lower layer, such as the HTTP client.
    pub(crate) fn timeout_from<T: StdError + Send + Sync + 'static>(source: T) -> Self {
        Self::from_source(ErrorKind::Timeout, source)
    }

    /// The request could not be sent, or the response could not be read.
    pub fn io<T: StdError + Send + Sync + 'static>(source: T) -> Self {
        Self::from_source(ErrorKind::Io, source)
    }

    /// The service rejected the credentials (HTTP 401).
    pub fn authentication<T: Into<String>>(message: T) -> Self {
        Self::from_message(ErrorKind::Authentication, message)
    }

    /// The credentials are valid, but lack the permission (HTTP 403).
    pub fn authorization<T: Into<String>>(message: T) -> Self {
        Self::from_message(ErrorKind::Authorization, message)
    }

    /// The service returned an unsuccessful status code.
    pub fn http<T: Into<String>>(status: StatusCode, body: T) -> Self {
        Self::from_message(ErrorKind::Http(status), body)
    }

    /// A token or a response payload could not be decoded.
    pub fn decode<T: StdError + Send + Sync + 'static>(source: T) -> Self {
        Self::from_source(ErrorKind::Decode, source)
    }

    /// The credential store could not be read or written.
    pub fn store<T: StdError + Send + Sync + 'static>(source: T) -> Self {
        Self::from_source(ErrorKind::Store, source)
    }

    /// The client configuration is invalid.
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::from_message(ErrorKind::Config, message)
    }

    /// Adds context to an error created from a source.
    pub(crate) fn with_message<T: Into<String>>(mut self, message: T) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns `true` if a required credential was missing.
    pub fn is_missing_credential(&self) -> bool {
        matches!(self.kind, ErrorKind::MissingCredential)
    }

    /// Returns `true` if the operation timed out.
    ///
    /// Timeouts reported by the HTTP client are included, with the client
    /// error as their [source][StdError::source].
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Returns `true` if the request could not be sent or the response could
    /// not be read.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Io)
    }

    /// Returns `true` if the service rejected the credentials.
    pub fn is_authentication(&self) -> bool {
        matches!(self.kind, ErrorKind::Authentication)
    }

    /// Returns `true` if the service refused the operation with a 403.
    pub fn is_authorization(&self) -> bool {
        matches!(self.kind, ErrorKind::Authorization)
    }

    /// Returns `true` if a token or payload could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(self.kind, ErrorKind::Decode)
    }

    /// Returns `true` if the credential store failed.
    pub fn is_store(&self) -> bool {
        matches!(self.kind, ErrorKind::Store)
    }

    /// Returns `true` if the configuration is invalid.
    pub fn is_config(&self) -> bool {
        matches!(self.kind, ErrorKind::Config)
    }

    /// The HTTP status code associated with this error, if any.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self.kind {
            ErrorKind::Http(status) => Some(status),
            ErrorKind::Authentication => Some(StatusCode::UNAUTHORIZED),
            ErrorKind::Authorization => Some(StatusCode::FORBIDDEN),
            _ => None,
        }
    }

    /// The notification bucket for this error.
    pub fn category(&self) -> ErrorCategory {
        match (&self.kind, self.http_status()) {
            (ErrorKind::MissingCredential, _) => ErrorCategory::Unauthorized,
            (_, Some(StatusCode::UNAUTHORIZED)) => ErrorCategory::Unauthorized,
            (_, Some(StatusCode::NOT_FOUND)) => ErrorCategory::NotFound,
            (_, Some(StatusCode::BAD_REQUEST)) => ErrorCategory::BadRequest,
            _ => ErrorCategory::Other,
        }
    }

    fn from_message<T: Into<String>>(kind: ErrorKind, message: T) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            source: None,
        }
    }

    fn from_source<T: StdError + Send + Sync + 'static>(kind: ErrorKind, source: T) -> Self {
        Self {
            kind,
            message: None,
            source: Some(Arc::new(source)),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let prefix = match &self.kind {
            ErrorKind::MissingCredential => "missing credential".to_string(),
            ErrorKind::Timeout => "the operation timed out".to_string(),
            ErrorKind::Io => "cannot send request or receive response".to_string(),
            ErrorKind::Authentication => "the service rejected the credentials".to_string(),
            ErrorKind::Authorization => "the operation is not permitted".to_string(),
            ErrorKind::Http(status) => format!("the service returned {status}"),
            ErrorKind::Decode => "cannot decode token or payload".to_string(),
            ErrorKind::Store => "credential store failure".to_string(),
            ErrorKind::Config => "invalid client configuration".to_string(),
        };
        match (&self.message, &self.source) {
            (Some(m), Some(s)) => write!(f, "{prefix}: {m}, source: {s}"),
            (Some(m), None) => write!(f, "{prefix}: {m}"),
            (None, Some(s)) => write!(f, "{prefix}, source: {s}"),
            (None, None) => write!(f, "{prefix}"),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn StdError + 'static))
    }
}

/// The buckets used to present failures to the user.
///
/// Each bucket is rendered as a distinct notification by the UI layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The user is not (or no longer) authenticated.
    Unauthorized,
    /// The requested resource does not exist.
    NotFound,
    /// The request was malformed.
    BadRequest,
    /// Server errors, network errors, and everything else.
    Other,
}

impl ErrorCategory {
    /// A default, user-facing message for this category.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::Unauthorized => "You are not authorized. Please sign in again.",
            ErrorCategory::NotFound => "The requested resource was not found.",
            ErrorCategory::BadRequest => "The request was invalid. Please check your input.",
            ErrorCategory::Other => "Something went wrong. Please try again later.",
        }
    }
}
