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

use std::time::Duration;

/// All backend routes live under this prefix.
pub(crate) const API_PREFIX: &str = "/api/v1";

pub(crate) const LOGIN_PATH: &str = "/auth/login";
pub(crate) const REFRESH_PATH: &str = "/auth/refresh";
pub(crate) const LOGOUT_PATH: &str = "/auth/logout";
pub(crate) const LOGOUT_ALL_PATH: &str = "/auth/logout-all";
pub(crate) const SESSIONS_PATH: &str = "/auth/sessions";

pub(crate) const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const API_URL_VAR: &str = "HELPDESK_API_URL";
pub(crate) const REQUEST_TIMEOUT_VAR: &str = "HELPDESK_REQUEST_TIMEOUT";

pub(crate) const MISSING_REFRESH_TOKEN: &str = "No refresh token found";
