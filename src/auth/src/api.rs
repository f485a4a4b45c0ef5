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

//! The REST contract of the backend authentication endpoints.
//!
//! [AuthApi] calls the endpoints that do not need an access token: login,
//! refresh and logout. The authenticated endpoints (logout-all and session
//! management) go through [AuthenticatedClient][crate::client::AuthenticatedClient].

use crate::Result;
use crate::constants::{LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH};
use crate::errors::Error;
use crate::options::ClientConfig;
use crate::token::{AccessToken, RefreshToken};
use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Obtains new access tokens.
///
/// The client calls this at most once per refresh cycle, no matter how many
/// requests are waiting for a token.
#[async_trait::async_trait]
pub trait TokenRefresher: std::fmt::Debug + Send + Sync {
    /// Exchanges `refresh_token` for a new access token.
    ///
    /// Implementations must not retry. A failed refresh ends the session.
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<AccessToken>;
}

/// The profile of the signed-in user, as returned by the login endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// An active session of the signed-in user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    /// `true` for the session making the request.
    #[serde(default)]
    pub current: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The tokens issued by a successful login.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
}

/// The response of the login endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub tokens: SessionTokens,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct LoginRequest {
    pub(crate) username: String,
    pub(crate) password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[censored]")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest {
    pub(crate) refresh_token: RefreshToken,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    pub(crate) access_token: AccessToken,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogoutRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) refresh_token: Option<RefreshToken>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionList {
    pub(crate) sessions: Vec<Session>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or a number, found {other}"
        ))),
    }
}

/// Calls the unauthenticated authentication endpoints.
#[derive(Clone, Debug)]
pub struct AuthApi {
    inner: reqwest::Client,
    config: ClientConfig,
}

impl AuthApi {
    /// Creates a new instance using `inner` to send the requests.
    pub fn new(inner: reqwest::Client, config: ClientConfig) -> Self {
        Self { inner, config }
    }

    /// Exchanges a username and password for a pair of tokens.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .inner
            .post(self.config.api_url(LOGIN_PATH))
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;
        let response = check_status(response).await?;
        response.json::<LoginResponse>().await.map_err(body_error)
    }

    /// Revokes `refresh_token` on the server.
    ///
    /// The body is omitted when there is no refresh token.
    pub async fn logout(&self, refresh_token: Option<&RefreshToken>) -> Result<()> {
        let request = LogoutRequest {
            refresh_token: refresh_token.cloned(),
        };
        let response = self
            .inner
            .post(self.config.api_url(LOGOUT_PATH))
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;
        check_status(response).await.map(|_| ())
    }

    fn refresh_timeout(&self) -> Duration {
        self.config.refresh_timeout()
    }
}

#[async_trait::async_trait]
impl TokenRefresher for AuthApi {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<AccessToken> {
        let request = RefreshRequest {
            refresh_token: refresh_token.clone(),
        };
        let response = self
            .inner
            .post(self.config.api_url(REFRESH_PATH))
            .timeout(self.refresh_timeout())
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;
        let response = check_status(response).await?;
        let response = response
            .json::<RefreshResponse>()
            .await
            .map_err(body_error)?;
        Ok(response.access_token)
    }
}

/// Converts errors from sending a request.
pub(crate) fn send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout_from(e)
    } else {
        Error::io(e)
    }
}

/// Converts errors from reading and decoding a response body.
pub(crate) fn body_error(e: reqwest::Error) -> Error {
    if e.is_decode() {
        Error::decode(e)
    } else {
        send_error(e)
    }
}

/// Maps unsuccessful responses to errors.
///
/// The error message is the response body, or the canonical reason when the
/// body is empty.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        body
    };
    Err(match status {
        StatusCode::UNAUTHORIZED => Error::authentication(message),
        StatusCode::FORBIDDEN => Error::authorization(message),
        _ => Error::http(status, message),
    })
}
