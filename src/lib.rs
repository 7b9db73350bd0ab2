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

//! An authoritative DNS server whose zones are kept in sync with an
//! IP address management (IPAM) system.
//!
//! The crate is organized around three pieces that share a single
//! in-memory [`ZoneSet`](zone::ZoneSet):
//!
//! * the [`zone`] module, which stores records and enforces the
//!   consistency rules of each zone;
//! * the [`sync`] module, whose [`Synchronizer`](sync::Synchronizer)
//!   turns IPAM address events into forward (A/AAAA) and reverse (PTR)
//!   records; and
//! * the [`server`] module, whose [`Resolver`](server::Resolver)
//!   answers queries from the zones.
//!
//! The remaining modules provide the supporting DNS data types, the
//! wire format, and (with the `tokio` feature) a network transport.

pub mod class;
#[cfg(feature = "tokio")]
pub mod io;
pub mod message;
pub mod name;
pub mod rr;
pub mod server;
pub mod sync;
mod util;
pub mod zone;
