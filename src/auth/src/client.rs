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

//! An HTTP client that keeps the session alive.
//!
//! Every request sent through [AuthenticatedClient] carries a valid access
//! token:
//!
//! - Before sending, a token that is missing, undecodable, or about to expire
//!   is refreshed.
//! - If the server still answers `401 Unauthorized`, the token is refreshed
//!   and the request is retried, exactly once.
//! - Concurrent refreshes collapse into one call to the refresh endpoint. The
//!   other requests wait for its outcome.
//! - If the refresh fails, the credential store is cleared and the
//!   [SessionObserver] is notified.
//!
//! `403 Forbidden` means the token is valid but lacks permission. It never
//! triggers a refresh or a logout.

use crate::Result;
use crate::api::{
    AuthApi, LoginResponse, Session, SessionList, TokenRefresher, UserProfile, body_error,
    check_status, send_error,
};
use crate::constants::{LOGOUT_ALL_PATH, MISSING_REFRESH_TOKEN, SESSIONS_PATH};
use crate::errors::Error;
use crate::observer::{LoggingObserver, LogoutReason, SessionObserver};
use crate::options::ClientConfig;
use crate::refresh::{Entry, RefreshCoordinator};
use crate::store::{CredentialStore, MemoryCredentialStore};
use crate::token::{AccessToken, is_token_expired_at};
use chrono::Utc;
use http::header::{AUTHORIZATION, HeaderValue};
use http::{Method, StatusCode};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Sends authenticated requests to the helpdesk backend.
///
/// Cloning the client is cheap. All clones share the credential store and the
/// refresh state, so a refresh started through one clone is joined by the
/// others.
///
/// # Example
/// ```no_run
/// # use helpdesk_auth::client::AuthenticatedClient;
/// # use helpdesk_auth::options::ClientConfig;
/// # tokio_test::block_on(async {
/// let client = AuthenticatedClient::builder(ClientConfig::from_env()?).build()?;
/// client.login("jdoe", "correct horse battery staple").await?;
/// let tickets: serde_json::Value = client.get_json("/tickets").await?;
/// # Ok::<(), helpdesk_auth::errors::Error>(())
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct AuthenticatedClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    http: reqwest::Client,
    api: AuthApi,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn CredentialStore>,
    observer: Arc<dyn SessionObserver>,
    coordinator: RefreshCoordinator,
}

/// A builder for [AuthenticatedClient].
#[derive(Debug)]
pub struct Builder {
    config: ClientConfig,
    http: Option<reqwest::Client>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    store: Option<Arc<dyn CredentialStore>>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl Builder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: None,
            refresher: None,
            store: None,
            observer: None,
        }
    }

    /// Sends requests with `v` instead of a client created from the
    /// configuration. Its timeouts take precedence over
    /// [request_timeout][ClientConfig::request_timeout].
    pub fn with_http_client(mut self, v: reqwest::Client) -> Self {
        self.http = Some(v);
        self
    }

    /// Obtains new access tokens from `v` instead of the refresh endpoint.
    pub fn with_refresher<T: TokenRefresher + 'static>(mut self, v: T) -> Self {
        self.refresher = Some(Arc::new(v));
        self
    }

    /// Persists credentials in `v`. Defaults to a [MemoryCredentialStore].
    pub fn with_store<T: CredentialStore + 'static>(mut self, v: T) -> Self {
        self.store = Some(Arc::new(v));
        self
    }

    /// Notifies `v` when the session ends. Defaults to a [LoggingObserver].
    pub fn with_observer<T: SessionObserver + 'static>(mut self, v: T) -> Self {
        self.observer = Some(Arc::new(v));
        self
    }

    /// Creates the client.
    pub fn build(self) -> Result<AuthenticatedClient> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(self.config.request_timeout())
                .build()
                .map_err(Error::io)?,
        };
        let api = AuthApi::new(http.clone(), self.config.clone());
        let refresher = self
            .refresher
            .unwrap_or_else(|| Arc::new(api.clone()) as Arc<dyn TokenRefresher>);
        let store = self.store.unwrap_or_else(|| {
            Arc::new(MemoryCredentialStore::new(self.config.namespace())) as Arc<dyn CredentialStore>
        });
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(LoggingObserver) as Arc<dyn SessionObserver>);
        Ok(AuthenticatedClient {
            inner: Arc::new(Inner {
                config: self.config,
                http,
                api,
                refresher,
                store,
                observer,
                coordinator: RefreshCoordinator::new(),
            }),
        })
    }
}

impl AuthenticatedClient {
    /// Returns a builder using `config`.
    pub fn builder(config: ClientConfig) -> Builder {
        Builder::new(config)
    }

    /// The credential store backing this client.
    pub fn store(&self) -> &dyn CredentialStore {
        self.inner.store.as_ref()
    }

    /// The configuration of this client.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Signs in with a username and password.
    ///
    /// Stores both tokens and, if present, the user profile. A failed login
    /// is returned to the caller. It never triggers a refresh or a logout.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let response = self.inner.api.login(username, password).await?;
        let store = self.store();
        store.set_access_token(&response.tokens.access_token)?;
        store.set_refresh_token(&response.tokens.refresh_token)?;
        if let Some(user) = &response.user {
            store.set_user_profile(user)?;
        }
        tracing::debug!(username, "signed in");
        Ok(response)
    }

    /// Signs out of this session.
    ///
    /// The server is asked to revoke the refresh token, but the local session
    /// ends even if that request fails.
    pub async fn logout(&self) -> Result<()> {
        let refresh_token = self.store().refresh_token().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cannot read the refresh token during logout");
            None
        });
        if let Err(e) = self.inner.api.logout(refresh_token.as_ref()).await {
            tracing::warn!(error = %e, "cannot revoke the refresh token during logout");
        }
        self.end_session(LogoutReason::UserRequested)
    }

    /// Signs out of every session of the current user.
    ///
    /// Unlike [logout][Self::logout], the local session survives if the
    /// server rejects the request.
    pub async fn logout_all(&self) -> Result<()> {
        let request = self.request(Method::POST, LOGOUT_ALL_PATH);
        self.execute(request).await?;
        self.end_session(LogoutReason::UserRequested)
    }

    /// Lists the active sessions of the current user.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let list = self.get_json::<SessionList>(SESSIONS_PATH).await?;
        Ok(list.sessions)
    }

    /// Revokes one session of the current user.
    pub async fn revoke_session(&self, id: &str) -> Result<()> {
        let id = utf8_percent_encode(id, NON_ALPHANUMERIC);
        self.delete(&format!("{SESSIONS_PATH}/{id}")).await
    }

    /// The profile stored by the last successful login.
    pub fn current_user(&self) -> Result<Option<UserProfile>> {
        self.store().user_profile()
    }

    /// Returns `true` if requests can be authorized without signing in.
    pub fn is_authenticated(&self) -> Result<bool> {
        if self.store().refresh_token()?.is_some() {
            return Ok(true);
        }
        Ok(self.valid_access_token()?.is_some())
    }

    /// Starts a request to `path`, which is relative to the API prefix.
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.inner
            .http
            .request(method, self.inner.config.api_url(path))
    }

    /// Sends a `GET` request and decodes the JSON response.
    pub async fn get_json<O: DeserializeOwned>(&self, path: &str) -> Result<O> {
        let response = self.execute(self.request(Method::GET, path)).await?;
        response.json::<O>().await.map_err(body_error)
    }

    /// Sends `body` with a `POST` request and decodes the JSON response.
    pub async fn post_json<I: Serialize + ?Sized, O: DeserializeOwned>(
        &self,
        path: &str,
        body: &I,
    ) -> Result<O> {
        let request = self.request(Method::POST, path).json(body);
        let response = self.execute(request).await?;
        response.json::<O>().await.map_err(body_error)
    }

    /// Sends `body` with a `PUT` request and decodes the JSON response.
    pub async fn put_json<I: Serialize + ?Sized, O: DeserializeOwned>(
        &self,
        path: &str,
        body: &I,
    ) -> Result<O> {
        let request = self.request(Method::PUT, path).json(body);
        let response = self.execute(request).await?;
        response.json::<O>().await.map_err(body_error)
    }

    /// Sends a `DELETE` request, ignoring the response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    /// Sends a request with a valid access token.
    ///
    /// Any existing `Authorization` header is replaced. Unsuccessful
    /// responses are returned as errors. A `401` response is retried once,
    /// after refreshing the token, if the request body can be cloned.
    pub async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = request.build().map_err(Error::io)?;
        let token = self.authorize().await?;
        let retry = request.try_clone();
        let response = self.send(request, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return finish(response).await;
        }
        let Some(retry) = retry else {
            tracing::warn!(url = %response.url(), "request rejected with 401, the body cannot be replayed");
            return finish(response).await;
        };
        tracing::debug!(url = %response.url(), "request rejected with 401, retrying with a new token");
        let token = self.refresh(Some(&token)).await?;
        let response = self.send(retry, &token).await?;
        finish(response).await
    }

    /// Returns an access token that is valid for at least the expiry margin.
    ///
    /// The stored token is returned if it is still valid. Otherwise this
    /// starts a refresh, or waits for the refresh in flight.
    pub async fn authorize(&self) -> Result<AccessToken> {
        if let Some(token) = self.valid_access_token()? {
            return Ok(token);
        }
        self.refresh(None).await
    }

    /// Calls the refresh endpoint and stores the new access token.
    ///
    /// This performs the call unconditionally. Most applications should use
    /// [authorize][Self::authorize], which reuses valid tokens and joins
    /// refreshes already in flight.
    pub async fn refresh_access_token(&self) -> Result<AccessToken> {
        let Some(refresh_token) = self.store().refresh_token()? else {
            return Err(Error::missing_credential(MISSING_REFRESH_TOKEN));
        };
        let token = self.inner.refresher.refresh(&refresh_token).await?;
        self.store().set_access_token(&token)?;
        Ok(token)
    }

    // Leads a refresh cycle, or joins the one in flight. `rejected` is a
    // token the server already refused, it never ends a cycle early.
    async fn refresh(&self, rejected: Option<&AccessToken>) -> Result<AccessToken> {
        let guard = match self.inner.coordinator.try_enter() {
            Entry::Leader(guard) => guard,
            Entry::Follower(waiter) => {
                tracing::debug!("waiting for the access token refresh in flight");
                return waiter.wait().await;
            }
        };
        // A cycle may have settled between the caller's expiry check and
        // `try_enter`.
        match self.valid_access_token() {
            Ok(Some(token)) if Some(&token) != rejected => {
                tracing::debug!("access token refreshed by a previous cycle");
                guard.settle(Ok(token.clone()));
                return Ok(token);
            }
            Ok(_) => {}
            Err(e) => {
                guard.settle(Err(e.clone()));
                return Err(e);
            }
        }
        tracing::debug!("refreshing the access token");
        let outcome = self.refresh_access_token().await;
        let released = guard.settle(outcome.clone());
        match &outcome {
            Ok(_) => tracing::debug!(released, "access token refreshed"),
            Err(e) => {
                tracing::error!(error = %e, released, "cannot refresh the access token, ending the session");
                if let Err(e) = self.end_session(LogoutReason::RefreshFailed(e.clone())) {
                    tracing::warn!(error = %e, "cannot clear the credential store");
                }
            }
        }
        outcome
    }

    fn valid_access_token(&self) -> Result<Option<AccessToken>> {
        let margin = self.inner.config.expiry_margin();
        let token = self.store().access_token()?;
        Ok(token.filter(|t| !is_token_expired_at(t, Utc::now(), margin)))
    }

    // The observer runs even if the store cannot be cleared.
    fn end_session(&self, reason: LogoutReason) -> Result<()> {
        let cleared = self.store().clear();
        self.inner.observer.on_logout(&reason);
        cleared
    }

    async fn send(
        &self,
        mut request: reqwest::Request,
        token: &AccessToken,
    ) -> Result<reqwest::Response> {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {}", token.secret())).map_err(Error::decode)?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        self.inner.http.execute(request).await.map_err(send_error)
    }
}

async fn finish(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status() == StatusCode::FORBIDDEN {
        tracing::warn!(url = %response.url(), "permission denied");
    }
    check_status(response).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::MockTokenRefresher;
    use crate::observer::tests::MockSessionObserver;
    use crate::token::RefreshToken;
    use crate::token::tests::jwt_with_expiry;
    use httptest::matchers::{all_of, contains, request};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    type TestResult = anyhow::Result<()>;

    fn valid_jwt() -> String {
        jwt_with_expiry(Utc::now().timestamp() + 3600)
    }

    fn expired_jwt() -> String {
        jwt_with_expiry(Utc::now().timestamp() - 60)
    }

    fn test_config(base_url: &str) -> ClientConfig {
        ClientConfig::builder()
            .with_base_url(base_url)
            .build()
            .unwrap()
    }

    fn seeded_store(access: Option<&str>, refresh: Option<&str>) -> MemoryCredentialStore {
        let store = MemoryCredentialStore::default();
        if let Some(access) = access {
            store.set_access_token(&AccessToken::new(access)).unwrap();
        }
        if let Some(refresh) = refresh {
            store.set_refresh_token(&RefreshToken::new(refresh)).unwrap();
        }
        store
    }

    fn quiet_observer() -> MockSessionObserver {
        let mut observer = MockSessionObserver::new();
        observer.expect_on_logout().never();
        observer
    }

    fn refresher_never() -> MockTokenRefresher {
        let mut refresher = MockTokenRefresher::new();
        refresher.expect_refresh().never();
        refresher
    }

    fn refresher_once(token: &str) -> MockTokenRefresher {
        let token = AccessToken::new(token);
        let mut refresher = MockTokenRefresher::new();
        refresher
            .expect_refresh()
            .times(1)
            .returning(move |_| Ok(token.clone()));
        refresher
    }

    // Counts calls and sleeps, so concurrent callers pile up behind the
    // refresh in flight.
    #[derive(Debug)]
    struct SlowRefresher {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        outcome: Result<AccessToken>,
    }

    #[async_trait::async_trait]
    impl TokenRefresher for SlowRefresher {
        async fn refresh(&self, _refresh_token: &RefreshToken) -> Result<AccessToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }
    }

    #[tokio::test]
    async fn authorize_reuses_valid_token() -> TestResult {
        let access = valid_jwt();
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(seeded_store(Some(&access), Some("r")))
            .with_refresher(refresher_never())
            .with_observer(quiet_observer())
            .build()?;
        assert_eq!(client.authorize().await?, AccessToken::new(access));
        Ok(())
    }

    #[tokio::test]
    async fn authorize_refreshes_expired_token() -> TestResult {
        let fresh = valid_jwt();
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(seeded_store(Some(&expired_jwt()), Some("r")))
            .with_refresher(refresher_once(&fresh))
            .with_observer(quiet_observer())
            .build()?;
        assert_eq!(client.authorize().await?, AccessToken::new(&fresh));
        assert_eq!(client.store().access_token()?, Some(AccessToken::new(&fresh)));
        // The stored token is now valid, no second refresh.
        assert_eq!(client.authorize().await?, AccessToken::new(&fresh));
        Ok(())
    }

    #[tokio::test]
    async fn authorize_refreshes_undecodable_token() -> TestResult {
        let fresh = valid_jwt();
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(seeded_store(Some("opaque"), Some("r")))
            .with_refresher(refresher_once(&fresh))
            .with_observer(quiet_observer())
            .build()?;
        assert_eq!(client.authorize().await?, AccessToken::new(fresh));
        Ok(())
    }

    #[tokio::test]
    async fn authorize_inside_margin_refreshes() -> TestResult {
        let fresh = valid_jwt();
        let almost = jwt_with_expiry(Utc::now().timestamp() + 20);
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(seeded_store(Some(&almost), Some("r")))
            .with_refresher(refresher_once(&fresh))
            .with_observer(quiet_observer())
            .build()?;
        assert_eq!(client.authorize().await?, AccessToken::new(fresh));
        Ok(())
    }

    #[tokio::test]
    async fn missing_refresh_token_ends_session() -> TestResult {
        let mut observer = MockSessionObserver::new();
        observer
            .expect_on_logout()
            .withf(|r| matches!(r, LogoutReason::RefreshFailed(e) if e.is_missing_credential()))
            .times(1)
            .return_const(());
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(seeded_store(Some(&expired_jwt()), None))
            .with_refresher(refresher_never())
            .with_observer(observer)
            .build()?;

        let err = client.authorize().await.unwrap_err();
        assert!(err.is_missing_credential(), "{err:?}");
        assert!(err.to_string().contains("No refresh token found"), "{err}");
        assert!(client.store().access_token()?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_failure_ends_session() -> TestResult {
        let mut refresher = MockTokenRefresher::new();
        refresher
            .expect_refresh()
            .times(1)
            .returning(|_| Err(Error::authentication("refresh token revoked")));
        let mut observer = MockSessionObserver::new();
        observer
            .expect_on_logout()
            .withf(|r| matches!(r, LogoutReason::RefreshFailed(e) if e.is_authentication()))
            .times(1)
            .return_const(());
        let store = seeded_store(Some(&expired_jwt()), Some("r"));
        store.set_user_profile(&serde_json::from_value(serde_json::json!({
            "id": 1, "username": "jdoe"
        }))?)?;
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(store)
            .with_refresher(refresher)
            .with_observer(observer)
            .build()?;

        let err = client.authorize().await.unwrap_err();
        assert!(err.is_authentication(), "{err:?}");
        assert!(client.store().access_token()?.is_none());
        assert!(client.store().refresh_token()?.is_none());
        assert!(client.current_user()?.is_none());
        assert!(!client.is_authenticated()?);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_authorize_single_refresh() -> TestResult {
        let fresh = valid_jwt();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(seeded_store(Some(&expired_jwt()), Some("r")))
            .with_refresher(SlowRefresher {
                calls: calls.clone(),
                delay: Duration::from_millis(200),
                outcome: Ok(AccessToken::new(&fresh)),
            })
            .with_observer(quiet_observer())
            .build()?;

        let tasks = (0..10)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.authorize().await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            assert_eq!(task.await??, AccessToken::new(&fresh));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    // Reads the access token, then stalls the reader when `slow_next` is
    // set, so the value it returns is stale by the time the caller sees it.
    #[derive(Debug)]
    struct SlowReadStore {
        inner: MemoryCredentialStore,
        slow_next: Arc<AtomicBool>,
    }

    impl CredentialStore for SlowReadStore {
        fn access_token(&self) -> Result<Option<AccessToken>> {
            let token = self.inner.access_token();
            if self.slow_next.swap(false, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(400));
            }
            token
        }
        fn set_access_token(&self, token: &AccessToken) -> Result<()> {
            self.inner.set_access_token(token)
        }
        fn refresh_token(&self) -> Result<Option<RefreshToken>> {
            self.inner.refresh_token()
        }
        fn set_refresh_token(&self, token: &RefreshToken) -> Result<()> {
            self.inner.set_refresh_token(token)
        }
        fn user_profile(&self) -> Result<Option<UserProfile>> {
            self.inner.user_profile()
        }
        fn set_user_profile(&self, profile: &UserProfile) -> Result<()> {
            self.inner.set_user_profile(profile)
        }
        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stale_expiry_check_does_not_refresh_twice() -> TestResult {
        let fresh = valid_jwt();
        let calls = Arc::new(AtomicUsize::new(0));
        let slow_next = Arc::new(AtomicBool::new(false));
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(SlowReadStore {
                inner: seeded_store(Some(&expired_jwt()), Some("r")),
                slow_next: slow_next.clone(),
            })
            .with_refresher(SlowRefresher {
                calls: calls.clone(),
                delay: Duration::from_millis(100),
                outcome: Ok(AccessToken::new(&fresh)),
            })
            .with_observer(quiet_observer())
            .build()?;

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.authorize().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The second caller sees the expired token, and only reaches
        // `try_enter` after the first cycle has settled.
        slow_next.store(true, Ordering::SeqCst);
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.authorize().await }
        });

        assert_eq!(first.await??, AccessToken::new(&fresh));
        assert_eq!(second.await??, AccessToken::new(&fresh));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn followers_wait_for_slow_refresh() -> TestResult {
        let fresh = valid_jwt();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(seeded_store(None, Some("r")))
            .with_refresher(SlowRefresher {
                calls: calls.clone(),
                delay: Duration::from_secs(9),
                outcome: Ok(AccessToken::new(&fresh)),
            })
            .with_observer(quiet_observer())
            .build()?;

        let (a, b, c) = tokio::join!(client.authorize(), client.authorize(), client.authorize());
        for got in [a, b, c] {
            assert_eq!(got?, AccessToken::new(&fresh));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!client.inner.coordinator.is_refreshing());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refresh_failure_single_logout() -> TestResult {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut observer = MockSessionObserver::new();
        observer.expect_on_logout().times(1).return_const(());
        let client = AuthenticatedClient::builder(test_config("https://unused.example.com"))
            .with_store(seeded_store(Some(&expired_jwt()), Some("r")))
            .with_refresher(SlowRefresher {
                calls: calls.clone(),
                delay: Duration::from_millis(200),
                outcome: Err(Error::timeout("refresh timed out")),
            })
            .with_observer(observer)
            .build()?;

        let tasks = (0..5)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.authorize().await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            let err = task.await?.unwrap_err();
            assert!(err.is_timeout(), "{err:?}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.store().refresh_token()?.is_none());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execute_attaches_bearer_token() -> TestResult {
        let access = valid_jwt();
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/api/v1/tickets"),
                request::headers(contains(("authorization", format!("Bearer {access}")))),
            ])
            .respond_with(json_encoded(serde_json::json!({"tickets": []}))),
        );

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_store(seeded_store(Some(&access), Some("r")))
            .with_refresher(refresher_never())
            .with_observer(quiet_observer())
            .build()?;
        let got: serde_json::Value = client.get_json("/tickets").await?;
        assert_eq!(got, serde_json::json!({"tickets": []}));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execute_retries_once_after_401() -> TestResult {
        let stale = valid_jwt();
        let fresh = jwt_with_expiry(Utc::now().timestamp() + 7200);
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/v1/tickets"),
                request::headers(contains(("authorization", format!("Bearer {stale}")))),
            ])
            .respond_with(status_code(401)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/v1/tickets"),
                request::headers(contains(("authorization", format!("Bearer {fresh}")))),
            ])
            .respond_with(json_encoded(serde_json::json!({"id": 17}))),
        );

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_store(seeded_store(Some(&stale), Some("r")))
            .with_refresher(refresher_once(&fresh))
            .with_observer(quiet_observer())
            .build()?;
        let got: serde_json::Value = client
            .post_json("/tickets", &serde_json::json!({"title": "printer on fire"}))
            .await?;
        assert_eq!(got, serde_json::json!({"id": 17}));
        assert_eq!(client.store().access_token()?, Some(AccessToken::new(fresh)));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execute_second_401_is_returned() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/v1/tickets"))
                .times(2)
                .respond_with(status_code(401)),
        );

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_store(seeded_store(Some(&valid_jwt()), Some("r")))
            .with_refresher(refresher_once(&valid_jwt()))
            .with_observer(quiet_observer())
            .build()?;
        let err = client
            .get_json::<serde_json::Value>("/tickets")
            .await
            .unwrap_err();
        assert!(err.is_authentication(), "{err:?}");
        // The retried 401 does not end the session.
        assert!(client.store().refresh_token()?.is_some());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execute_403_does_not_refresh() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/api/v1/tickets/9"))
                .respond_with(status_code(403).body("admins only")),
        );

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_store(seeded_store(Some(&valid_jwt()), Some("r")))
            .with_refresher(refresher_never())
            .with_observer(quiet_observer())
            .build()?;
        let err = client.delete("/tickets/9").await.unwrap_err();
        assert!(err.is_authorization(), "{err:?}");
        assert!(err.to_string().contains("admins only"), "{err}");
        assert!(client.is_authenticated()?);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execute_401_refresh_failure_ends_session() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/v1/tickets"))
                .respond_with(status_code(401)),
        );
        let mut refresher = MockTokenRefresher::new();
        refresher
            .expect_refresh()
            .times(1)
            .returning(|_| Err(Error::authentication("expired")));
        let mut observer = MockSessionObserver::new();
        observer.expect_on_logout().times(1).return_const(());

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_store(seeded_store(Some(&valid_jwt()), Some("r")))
            .with_refresher(refresher)
            .with_observer(observer)
            .build()?;
        let err = client
            .get_json::<serde_json::Value>("/tickets")
            .await
            .unwrap_err();
        assert!(err.is_authentication(), "{err:?}");
        assert!(!client.is_authenticated()?);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execute_other_errors_keep_category() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/v1/tickets/404"))
                .respond_with(status_code(404)),
        );

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_store(seeded_store(Some(&valid_jwt()), Some("r")))
            .with_refresher(refresher_never())
            .with_observer(quiet_observer())
            .build()?;
        let err = client
            .get_json::<serde_json::Value>("/tickets/404")
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::errors::ErrorCategory::NotFound);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn login_stores_credentials() -> TestResult {
        let access = valid_jwt();
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/v1/auth/login"))
                .respond_with(json_encoded(serde_json::json!({
                    "tokens": {"accessToken": access, "refreshToken": "r-1"},
                    "user": {"id": 3, "username": "jdoe", "fullName": "Jane Doe"},
                }))),
        );

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_refresher(refresher_never())
            .with_observer(quiet_observer())
            .build()?;
        assert!(!client.is_authenticated()?);
        client.login("jdoe", "secret").await?;
        assert_eq!(client.store().access_token()?, Some(AccessToken::new(access)));
        assert_eq!(client.store().refresh_token()?, Some(RefreshToken::new("r-1")));
        let user = client.current_user()?.expect("profile is stored");
        assert_eq!(user.full_name.as_deref(), Some("Jane Doe"));
        assert!(client.is_authenticated()?);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn login_failure_does_not_end_session() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/v1/auth/login"))
                .respond_with(status_code(401)),
        );

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_refresher(refresher_never())
            .with_observer(quiet_observer())
            .build()?;
        let err = client.login("jdoe", "wrong").await.unwrap_err();
        assert!(err.is_authentication(), "{err:?}");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn logout_clears_store_even_if_server_fails() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/v1/auth/logout"))
                .respond_with(status_code(500)),
        );
        let mut observer = MockSessionObserver::new();
        observer
            .expect_on_logout()
            .withf(|r| matches!(r, LogoutReason::UserRequested))
            .times(1)
            .return_const(());

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_store(seeded_store(Some(&valid_jwt()), Some("r")))
            .with_refresher(refresher_never())
            .with_observer(observer)
            .build()?;
        client.logout().await?;
        assert!(client.store().access_token()?.is_none());
        assert!(client.store().refresh_token()?.is_none());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn logout_all_ends_session() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/v1/auth/logout-all"))
                .respond_with(status_code(204)),
        );
        let mut observer = MockSessionObserver::new();
        observer.expect_on_logout().times(1).return_const(());

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_store(seeded_store(Some(&valid_jwt()), Some("r")))
            .with_refresher(refresher_never())
            .with_observer(observer)
            .build()?;
        client.logout_all().await?;
        assert!(!client.is_authenticated()?);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sessions() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/v1/auth/sessions"))
                .respond_with(json_encoded(serde_json::json!({
                    "sessions": [
                        {"id": "s-1", "userAgent": "Firefox", "current": true},
                        {"id": 2, "ipAddress": "10.0.0.2"},
                    ]
                }))),
        );
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/api/v1/auth/sessions/s%2F2"))
                .respond_with(status_code(204)),
        );

        let client = AuthenticatedClient::builder(test_config(&server.url_str("")))
            .with_store(seeded_store(Some(&valid_jwt()), Some("r")))
            .with_refresher(refresher_never())
            .with_observer(quiet_observer())
            .build()?;
        let sessions = client.list_sessions().await?;
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].current);
        assert_eq!(sessions[0].user_agent.as_deref(), Some("Firefox"));
        assert_eq!(sessions[1].id, "2");
        assert!(!sessions[1].current);

        client.revoke_session("s/2").await?;
        Ok(())
    }
}
