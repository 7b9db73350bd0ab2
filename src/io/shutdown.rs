// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Graceful shutdown of the Tokio I/O provider's tasks.

use tokio::sync::{broadcast, mpsc};

/// Controls the shutdown of a server's Tokio tasks.
///
/// This type is returned by
/// [`TokioIoProvider::start`](super::TokioIoProvider::start). Use
/// [`TokioShutdownController::shut_down`] to initiate shutdown and wait
/// for its completion. Dropping the controller also triggers shutdown
/// (but does not wait for it to complete).
#[must_use]
pub struct TokioShutdownController {
    request_sender: broadcast::Sender<()>,
    wait_receiver: mpsc::Receiver<()>,
}

impl TokioShutdownController {
    /// Requests that running server tasks shut down, and then waits for
    /// them to terminate.
    pub async fn shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.recv().await;
    }
}

/// A handle held by tasks to interact with the graceful shutdown
/// mechanism.
///
/// Tasks learn of a shutdown request when every sender attached to
/// `request_receiver` has closed. Holding `wait_sender` keeps shutdown
/// from completing, so every server task owns a `ShutdownHandle` (or at
/// least its `wait_sender`).
pub(super) struct ShutdownHandle {
    request_receiver: broadcast::Receiver<()>,
    wait_sender: mpsc::Sender<()>,
}

impl ShutdownHandle {
    /// Waits until shutdown is requested.
    pub(super) async fn requested(&mut self) {
        // Nothing is ever sent, so this only returns once the
        // controller's sender is dropped.
        let _ = self.request_receiver.recv().await;
    }

    /// Returns whether shutdown has been requested, without waiting.
    pub(super) fn is_requested(&mut self) -> bool {
        matches!(
            self.request_receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        )
    }

    /// Splits off the part of the handle that delays shutdown, for
    /// tasks that do not need to listen for shutdown requests.
    pub(super) fn wait_guard(&self) -> mpsc::Sender<()> {
        self.wait_sender.clone()
    }
}

impl Clone for ShutdownHandle {
    fn clone(&self) -> Self {
        // A resubscribed receiver misses values already queued, but no
        // values are ever sent: the signal is the senders closing.
        Self {
            request_receiver: self.request_receiver.resubscribe(),
            wait_sender: self.wait_sender.clone(),
        }
    }
}

/// Produces a [`TokioShutdownController`] and an initial
/// [`ShutdownHandle`] connected to it.
pub(super) fn channels() -> (TokioShutdownController, ShutdownHandle) {
    let (request_sender, request_receiver) = broadcast::channel(1);
    let (wait_sender, wait_receiver) = mpsc::channel(1);
    let controller = TokioShutdownController {
        request_sender,
        wait_receiver,
    };
    let handle = ShutdownHandle {
        request_receiver,
        wait_sender,
    };
    (controller, handle)
}
