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

//! Notifications about the end of a session.

use crate::errors::Error;

/// Why the session ended.
#[derive(Clone, Debug)]
pub enum LogoutReason {
    /// The application called [logout][crate::client::AuthenticatedClient::logout]
    /// or [logout_all][crate::client::AuthenticatedClient::logout_all].
    UserRequested,
    /// The access token could not be refreshed. The credential store has
    /// already been cleared.
    RefreshFailed(Error),
}

/// Receives session lifecycle events.
///
/// Applications implement this to navigate to the sign-in screen when the
/// session ends. The callback runs on the task that ended the session and
/// must not block.
pub trait SessionObserver: std::fmt::Debug + Send + Sync {
    /// Called after the credential store is cleared.
    fn on_logout(&self, reason: &LogoutReason);
}

/// The default observer, it only logs.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl SessionObserver for LoggingObserver {
    fn on_logout(&self, reason: &LogoutReason) {
        match reason {
            LogoutReason::UserRequested => tracing::info!("signed out"),
            LogoutReason::RefreshFailed(e) => {
                tracing::warn!(error = %e, "session ended, sign in again")
            }
        }
    }
}
