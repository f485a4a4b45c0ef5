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

//! Types and functions to work with access and refresh tokens.
//!
//! Both token kinds are opaque to the client except for the `exp` claim in
//! their JWT payload. The client never verifies signatures, that is the
//! backend's job. It only reads the expiry to decide when to refresh.

use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// The default safety margin applied when checking for expiration.
///
/// A token that expires within this margin is treated as expired. This
/// absorbs clock skew and the latency between the check and the request
/// reaching the server.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// An error decoding the claims embedded in a token.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TokenDecodeError {
    #[error("the token is not a JWT, found {0} segments")]
    Segments(usize),
    #[error("the token payload is not valid base64url")]
    Base64,
    #[error("the token payload is not a JSON object")]
    Json,
    #[error("the token payload has no `exp` claim")]
    MissingExpiry,
    #[error("the `exp` claim {0} is out of range")]
    ExpiryOutOfRange(i64),
}

/// A short-lived bearer credential.
///
/// This is the value sent in the `Authorization: Bearer` header of every
/// authenticated request.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

/// A longer-lived credential used solely to obtain new [AccessToken]s.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(String);

macro_rules! opaque_token {
    ($name:ident) => {
        impl $name {
            /// Wraps a raw token string.
            pub fn new<T: Into<String>>(value: T) -> Self {
                Self(value.into())
            }

            /// The raw token string.
            pub fn secret(&self) -> &str {
                &self.0
            }

            /// The expiration time embedded in the token, if it can be decoded.
            pub fn expires_at(&self) -> std::result::Result<DateTime<Utc>, TokenDecodeError> {
                decode_expiry(&self.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_tuple(stringify!($name))
                    .field(&"[censored]")
                    .finish()
            }
        }
    };
}

opaque_token!(AccessToken);
opaque_token!(RefreshToken);

#[derive(serde::Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

fn decode_expiry(token: &str) -> std::result::Result<DateTime<Utc>, TokenDecodeError> {
    let segments = token.split('.').collect::<Vec<_>>();
    let [_, payload, _] = segments.as_slice() else {
        return Err(TokenDecodeError::Segments(segments.len()));
    };
    // Some issuers pad the payload even though JWTs should not.
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| TokenDecodeError::Base64)?;
    let claim = serde_json::from_slice::<ExpiryClaim>(&bytes).map_err(|_| TokenDecodeError::Json)?;
    let exp = claim.exp.ok_or(TokenDecodeError::MissingExpiry)?;
    DateTime::from_timestamp(exp, 0).ok_or(TokenDecodeError::ExpiryOutOfRange(exp))
}

/// Returns `true` if the token must be refreshed before use.
///
/// A token is considered expired when its `exp` claim is absent or cannot be
/// decoded, or when it expires within [DEFAULT_EXPIRY_MARGIN] of the current
/// time.
///
/// # Example
/// ```
/// # use helpdesk_auth::token::{AccessToken, is_token_expired};
/// assert!(is_token_expired(&AccessToken::new("not-a-jwt")));
/// ```
pub fn is_token_expired(token: &AccessToken) -> bool {
    is_token_expired_at(token, Utc::now(), DEFAULT_EXPIRY_MARGIN)
}

/// Like [is_token_expired], with an explicit clock reading and margin.
pub fn is_token_expired_at(token: &AccessToken, now: DateTime<Utc>, margin: Duration) -> bool {
    let Ok(expires_at) = token.expires_at() else {
        return true;
    };
    let Ok(margin) = chrono::Duration::from_std(margin) else {
        return true;
    };
    expires_at - now <= margin
}

/// The whole number of days until the refresh token expires, rounded up.
///
/// Returns `None` if the token has no decodable expiry, in which case it
/// should be kept only for the lifetime of the session. Returns `Some(0)` for
/// tokens that have already expired.
pub(crate) fn refresh_token_lifetime_days(token: &RefreshToken, now: DateTime<Utc>) -> Option<i64> {
    const SECONDS_PER_DAY: i64 = 86_400;
    let remaining = (token.expires_at().ok()? - now).num_seconds();
    if remaining <= 0 {
        return Some(0);
    }
    Some((remaining + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY)
}
