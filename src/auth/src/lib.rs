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

//! Helpdesk Client Libraries for Rust - Authentication Components
//!
//! This crate keeps a helpdesk user signed in. Applications send their
//! requests through [client::AuthenticatedClient], which attaches a bearer
//! access token to each request and transparently refreshes it when it is
//! about to expire, or when the server rejects it.
//!
//! The tokens live in a [store::CredentialStore]. Refreshes are coordinated
//! so that any number of concurrent requests trigger at most one call to the
//! refresh endpoint, see [refresh]. When the session cannot be renewed the
//! store is cleared and the application is notified through an
//! [observer::SessionObserver].

pub mod api;
pub mod client;
pub mod errors;
pub mod observer;
pub mod options;
pub mod refresh;
pub mod store;
pub mod token;

pub(crate) mod constants;

/// A `Result` alias where the `Err` case is `helpdesk_auth::errors::Error`.
pub type Result<T> = std::result::Result<T, crate::errors::Error>;
