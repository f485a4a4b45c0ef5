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

//! Single-flight coordination for access token refreshes.
//!
//! When many requests observe an expired token at once, only the first one
//! (the *leader*) calls the refresh endpoint. The rest (the *followers*) are
//! queued, in arrival order, and receive a clone of whatever the leader
//! obtained: the new token or the error.
//!
//! ```
//! # use helpdesk_auth::refresh::{Entry, RefreshCoordinator};
//! # use helpdesk_auth::token::AccessToken;
//! # tokio_test::block_on(async {
//! let coordinator = RefreshCoordinator::new();
//! let Entry::Leader(guard) = coordinator.try_enter() else { unreachable!() };
//! let Entry::Follower(waiter) = coordinator.try_enter() else { unreachable!() };
//! guard.settle(Ok(AccessToken::new("new-token")));
//! assert_eq!(waiter.wait().await?, AccessToken::new("new-token"));
//! # Ok::<(), helpdesk_auth::errors::Error>(())
//! # });
//! ```
//!
//! Ordering holds only within one refresh cycle. A follower released by
//! cycle N may reach the network after a request that already started cycle
//! N+1, as both are just tasks scheduled by the runtime.

use crate::Result;
use crate::errors::Error;
use crate::token::AccessToken;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

type Outcome = Result<AccessToken>;

// There is no `Settled` variant: settling drains the queue and moves back to
// `Idle` under the same lock, so no caller can ever observe it.
#[derive(Debug, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        queue: Vec<oneshot::Sender<Outcome>>,
    },
}

/// Tracks whether a refresh is in flight and who is waiting for it.
///
/// Cloning the coordinator returns a handle to the same state.
#[derive(Clone, Debug, Default)]
pub struct RefreshCoordinator {
    state: Arc<Mutex<RefreshState>>,
}

/// The result of [RefreshCoordinator::try_enter].
#[derive(Debug)]
pub enum Entry {
    /// No refresh was in flight. The caller must perform the refresh and
    /// [settle][RefreshGuard::settle] the outcome.
    Leader(RefreshGuard),
    /// A refresh is in flight. The caller must [wait][Waiter::wait] for it.
    Follower(Waiter),
}

impl RefreshCoordinator {
    /// Creates a coordinator in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a refresh cycle, or joins the one in flight.
    pub fn try_enter(&self) -> Entry {
        let mut state = self.lock();
        match &mut *state {
            RefreshState::Idle => {
                *state = RefreshState::Refreshing { queue: Vec::new() };
                Entry::Leader(RefreshGuard {
                    coordinator: self.clone(),
                    settled: false,
                })
            }
            RefreshState::Refreshing { queue } => {
                let (tx, rx) = oneshot::channel();
                queue.push(tx);
                Entry::Follower(Waiter { rx })
            }
        }
    }

    /// Returns `true` if a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing { .. })
    }

    /// The number of requests queued behind the refresh in flight.
    pub fn queued(&self) -> usize {
        match &*self.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { queue } => queue.len(),
        }
    }

    fn settle(&self, outcome: Outcome) -> usize {
        let queue = match std::mem::take(&mut *self.lock()) {
            RefreshState::Idle => Vec::new(),
            RefreshState::Refreshing { queue } => queue,
        };
        let count = queue.len();
        for tx in queue {
            // The receiver is gone if the waiting request was dropped.
            let _ = tx.send(outcome.clone());
        }
        count
    }

    // The critical sections never panic, so a poisoned lock still holds a
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Proof that the holder is the leader of the current refresh cycle.
///
/// Dropping the guard without calling [settle][RefreshGuard::settle], for
/// example because the leading request was cancelled, settles the queue with
/// an error so no follower waits forever.
#[derive(Debug)]
#[must_use = "the refresh cycle ends only when the guard is settled or dropped"]
pub struct RefreshGuard {
    coordinator: RefreshCoordinator,
    settled: bool,
}

impl RefreshGuard {
    /// Delivers `outcome` to every queued follower, in arrival order, and
    /// returns the coordinator to idle.
    ///
    /// Returns the number of followers released.
    pub fn settle(mut self, outcome: Outcome) -> usize {
        self.settled = true;
        self.coordinator.settle(outcome)
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.settle(Err(Error::io(std::io::Error::other(
                "the access token refresh was abandoned",
            ))));
        }
    }
}

/// A follower waiting for the refresh in flight.
#[derive(Debug)]
pub struct Waiter {
    rx: oneshot::Receiver<Outcome>,
}

impl Waiter {
    /// Waits for the leader to settle and returns its outcome.
    pub async fn wait(self) -> Outcome {
        self.rx.await.unwrap_or_else(|_| {
            Err(Error::io(std::io::Error::other(
                "the access token refresh was abandoned",
            )))
        })
    }
}
