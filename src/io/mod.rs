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

//! The network I/O provider for running a [`Server`](crate::server::Server).
//!
//! The [`Server`](crate::server::Server) structure implements the
//! message processing of the DNS server abstracted from network I/O.
//! The [`TokioIoProvider`] in this module is the intermediary between
//! Tokio's UDP and TCP sockets on one hand and the
//! [`Server`](crate::server::Server) on the other.

use std::time::Duration;

mod shutdown;
mod tokio;

pub use self::shutdown::TokioShutdownController;
pub use self::tokio::TokioIoProvider;

/// How long a TCP client has to send a complete DNS message before its
/// connection is closed.
const READ_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait between respawns of a task. This is to prevent
/// tasks that crash immediately from using up significant CPU time.
const TASK_RESPAWN_DELAY: Duration = Duration::from_secs(1);
