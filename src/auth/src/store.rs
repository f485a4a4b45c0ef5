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

//! Persistent storage for credentials and the cached user profile.
//!
//! The client keeps three independent slots, all keyed under one namespace:
//!
//! * `<namespace>.accessToken`: a single string slot holding the current
//!   access token.
//! * `<namespace>.refreshToken`: the refresh token, stored with its own
//!   expiry in whole days (rounded up) derived from the token's `exp` claim.
//!   Once that expiry passes the slot reads as empty, like an expired cookie.
//! * `<namespace>.user`: the profile returned by the last login.
//!
//! [MemoryCredentialStore] is useful for tests and short-lived processes.
//! [FileCredentialStore] keeps the slots in a JSON document on disk so a
//! session survives restarts.

use crate::Result;
use crate::api::UserProfile;
use crate::errors::Error;
use crate::token::{AccessToken, RefreshToken, refresh_token_lifetime_days};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The default namespace for all keys.
pub const DEFAULT_NAMESPACE: &str = "helpdesk";

/// A store for the client credentials.
///
/// Implementations must be safe to share across tasks. Each method is a
/// short, synchronous operation. The client never holds a store call across
/// an `.await`.
pub trait CredentialStore: std::fmt::Debug + Send + Sync {
    /// The current access token, if any.
    fn access_token(&self) -> Result<Option<AccessToken>>;

    /// Overwrites the access token slot.
    fn set_access_token(&self, token: &AccessToken) -> Result<()>;

    /// The refresh token, if present and not yet expired.
    fn refresh_token(&self) -> Result<Option<RefreshToken>>;

    /// Overwrites the refresh token slot.
    ///
    /// The slot expires after the token's own lifetime, computed in whole
    /// days.
    fn set_refresh_token(&self, token: &RefreshToken) -> Result<()>;

    /// The cached profile of the signed-in user.
    fn user_profile(&self) -> Result<Option<UserProfile>>;

    /// Overwrites the cached profile.
    fn set_user_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Removes all credentials and cached user data.
    fn clear(&self) -> Result<()>;
}

type Document = BTreeMap<String, Value>;

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRefreshToken {
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// The key layout shared by all the store implementations.
#[derive(Clone, Debug)]
struct Keys {
    access_token: String,
    refresh_token: String,
    user: String,
}

impl Keys {
    fn new(namespace: &str) -> Self {
        Self {
            access_token: format!("{namespace}.accessToken"),
            refresh_token: format!("{namespace}.refreshToken"),
            user: format!("{namespace}.user"),
        }
    }

    fn access_token(&self, doc: &Document) -> Option<AccessToken> {
        doc.get(&self.access_token)
            .and_then(Value::as_str)
            .map(AccessToken::new)
    }

    fn set_access_token(&self, doc: &mut Document, token: &AccessToken) {
        doc.insert(
            self.access_token.clone(),
            Value::String(token.secret().to_string()),
        );
    }

    fn refresh_token(&self, doc: &Document, now: DateTime<Utc>) -> Option<RefreshToken> {
        let stored = doc
            .get(&self.refresh_token)
            .cloned()
            .and_then(|v| serde_json::from_value::<StoredRefreshToken>(v).ok())?;
        match stored.expires_at {
            Some(expires_at) if expires_at <= now => None,
            _ => Some(RefreshToken::new(stored.value)),
        }
    }

    fn set_refresh_token(
        &self,
        doc: &mut Document,
        token: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let expires_at =
            refresh_token_lifetime_days(token, now).map(|d| now + chrono::Duration::days(d));
        let stored = StoredRefreshToken {
            value: token.secret().to_string(),
            expires_at,
        };
        let value = serde_json::to_value(stored).map_err(Error::store)?;
        doc.insert(self.refresh_token.clone(), value);
        Ok(())
    }

    fn user_profile(&self, doc: &Document) -> Option<UserProfile> {
        doc.get(&self.user)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set_user_profile(&self, doc: &mut Document, profile: &UserProfile) -> Result<()> {
        let value = serde_json::to_value(profile).map_err(Error::store)?;
        doc.insert(self.user.clone(), value);
        Ok(())
    }

    fn clear(&self, doc: &mut Document) {
        doc.remove(&self.access_token);
        doc.remove(&self.refresh_token);
        doc.remove(&self.user);
    }
}

fn lock_poisoned() -> Error {
    Error::store(std::io::Error::other("credential store lock poisoned"))
}

/// An in-memory [CredentialStore].
///
/// # Example
/// ```
/// # use helpdesk_auth::store::{CredentialStore, MemoryCredentialStore};
/// # use helpdesk_auth::token::AccessToken;
/// let store = MemoryCredentialStore::default();
/// store.set_access_token(&AccessToken::new("test-only"))?;
/// assert!(store.access_token()?.is_some());
/// store.clear()?;
/// assert!(store.access_token()?.is_none());
/// # Ok::<(), helpdesk_auth::errors::Error>(())
/// ```
pub struct MemoryCredentialStore {
    keys: Keys,
    doc: Mutex<Document>,
}

// The document holds secrets.
impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl MemoryCredentialStore {
    /// Creates an empty store using `namespace` for its keys.
    pub fn new<T: AsRef<str>>(namespace: T) -> Self {
        Self {
            keys: Keys::new(namespace.as_ref()),
            doc: Mutex::new(Document::new()),
        }
    }

    fn with_doc<R>(&self, f: impl FnOnce(&Keys, &mut Document) -> Result<R>) -> Result<R> {
        let mut doc = self.doc.lock().map_err(|_| lock_poisoned())?;
        f(&self.keys, &mut doc)
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> Result<Option<AccessToken>> {
        self.with_doc(|keys, doc| Ok(keys.access_token(doc)))
    }

    fn set_access_token(&self, token: &AccessToken) -> Result<()> {
        self.with_doc(|keys, doc| {
            keys.set_access_token(doc, token);
            Ok(())
        })
    }

    fn refresh_token(&self) -> Result<Option<RefreshToken>> {
        self.with_doc(|keys, doc| Ok(keys.refresh_token(doc, Utc::now())))
    }

    fn set_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        self.with_doc(|keys, doc| keys.set_refresh_token(doc, token, Utc::now()))
    }

    fn user_profile(&self) -> Result<Option<UserProfile>> {
        self.with_doc(|keys, doc| Ok(keys.user_profile(doc)))
    }

    fn set_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.with_doc(|keys, doc| keys.set_user_profile(doc, profile))
    }

    fn clear(&self) -> Result<()> {
        self.with_doc(|keys, doc| {
            keys.clear(doc);
            Ok(())
        })
    }
}

/// A [CredentialStore] backed by a JSON document on disk.
///
/// The document may hold the slots of several namespaces; this store only
/// touches its own keys. Writes go to a temporary file that is then renamed
/// over the document, so readers never observe a partial write.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    keys: Keys,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Creates a store at `path`, using `namespace` for its keys.
    ///
    /// The file is created on the first write.
    pub fn new<P: Into<PathBuf>, T: AsRef<str>>(path: P, namespace: T) -> Self {
        Self {
            path: path.into(),
            keys: Keys::new(namespace.as_ref()),
            lock: Mutex::new(()),
        }
    }

    /// The location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Document> {
        let contents = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => {
                return Err(Error::store(e).with_message(format!(
                    "cannot read credentials file {}",
                    self.path.display()
                )));
            }
        };
        if contents.is_empty() {
            return Ok(Document::new());
        }
        serde_json::from_slice::<Document>(&contents).map_err(|e| {
            Error::store(e).with_message(format!(
                "cannot parse credentials file {}",
                self.path.display()
            ))
        })
    }

    fn save(&self, doc: &Document) -> Result<()> {
        let write_error = |e: std::io::Error| {
            Error::store(e).with_message(format!(
                "cannot write credentials file {}",
                self.path.display()
            ))
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let contents = serde_json::to_vec_pretty(doc).map_err(Error::store)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents).map_err(write_error)?;
        std::fs::rename(&tmp, &self.path).map_err(write_error)
    }

    fn read<R>(&self, f: impl FnOnce(&Keys, &Document) -> R) -> Result<R> {
        let _guard = self.lock.lock().map_err(|_| lock_poisoned())?;
        let doc = self.load()?;
        Ok(f(&self.keys, &doc))
    }

    fn update(&self, f: impl FnOnce(&Keys, &mut Document) -> Result<()>) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| lock_poisoned())?;
        let mut doc = self.load()?;
        f(&self.keys, &mut doc)?;
        self.save(&doc)
    }
}

impl CredentialStore for FileCredentialStore {
    fn access_token(&self) -> Result<Option<AccessToken>> {
        self.read(|keys, doc| keys.access_token(doc))
    }

    fn set_access_token(&self, token: &AccessToken) -> Result<()> {
        self.update(|keys, doc| {
            keys.set_access_token(doc, token);
            Ok(())
        })
    }

    fn refresh_token(&self) -> Result<Option<RefreshToken>> {
        self.read(|keys, doc| keys.refresh_token(doc, Utc::now()))
    }

    fn set_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        self.update(|keys, doc| keys.set_refresh_token(doc, token, Utc::now()))
    }

    fn user_profile(&self) -> Result<Option<UserProfile>> {
        self.read(|keys, doc| keys.user_profile(doc))
    }

    fn set_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.update(|keys, doc| keys.set_user_profile(doc, profile))
    }

    fn clear(&self) -> Result<()> {
        self.update(|keys, doc| {
            keys.clear(doc);
            Ok(())
        })
    }
}
